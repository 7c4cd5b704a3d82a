//! Interfaces to the collaborators that live outside the connectivity core
//!
//! Persistence, secret storage and monitoring are owned by other services;
//! the core only depends on these narrow lookups.

use crate::{Credentials, DriverDescriptor};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Lookup of stored custom driver descriptors
pub trait DescriptorStore: Send + Sync {
    fn descriptor(&self, id: &str) -> Option<DriverDescriptor>;
}

/// Lookup of credentials for a connection id
pub trait CredentialStore: Send + Sync {
    fn credentials(&self, connection_id: &str) -> Option<Credentials>;
}

/// Sink for connection attempt metrics
pub trait ConnectionMonitor: Send + Sync {
    fn record_connection_attempt(&self, provider: &str, success: bool, duration_ms: u64);
}

/// Monitor that discards every measurement
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMonitor;

impl ConnectionMonitor for NoopMonitor {
    fn record_connection_attempt(&self, provider: &str, success: bool, duration_ms: u64) {
        tracing::trace!(provider, success, duration_ms, "connection attempt");
    }
}

/// Credential store with nothing in it
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCredentials;

impl CredentialStore for NoCredentials {
    fn credentials(&self, _connection_id: &str) -> Option<Credentials> {
        None
    }
}

/// Descriptor store backed by a map, for hosts that keep descriptors in memory
#[derive(Debug, Default)]
pub struct InMemoryDescriptorStore {
    descriptors: RwLock<HashMap<String, DriverDescriptor>>,
}

impl InMemoryDescriptorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, descriptor: DriverDescriptor) {
        self.descriptors
            .write()
            .insert(descriptor.id.clone(), descriptor);
    }

    pub fn remove(&self, id: &str) -> Option<DriverDescriptor> {
        self.descriptors.write().remove(id)
    }

    pub fn len(&self) -> usize {
        self.descriptors.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.read().is_empty()
    }
}

impl DescriptorStore for InMemoryDescriptorStore {
    fn descriptor(&self, id: &str) -> Option<DriverDescriptor> {
        self.descriptors.read().get(id).cloned()
    }
}
