//! Registry of ad-hoc (unpooled) connections

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use dbport_core::Connection;


/// Ad-hoc connections keyed by connection id
#[derive(Default)]
pub struct ConnectionRegistry {
    active: RwLock<HashMap<String, Arc<dyn Connection>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection, returning the one previously stored under `id`.
    ///
    /// The previous connection is not closed; that is up to the caller.
    pub fn put(&self, id: impl Into<String>, connection: Arc<dyn Connection>) -> Option<Arc<dyn Connection>> {
        let id = id.into();
        tracing::debug!(connection_id = %id, driver = %connection.driver_name(), "registering connection");
        self.active.write().insert(id, connection)
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Connection>> {
        let conn = self.active.read().get(id).cloned();
        if conn.is_none() {
            tracing::debug!(connection_id = %id, "connection not found in registry");
        }
        conn
    }

    pub fn has(&self, id: &str) -> bool {
        self.active.read().contains_key(id)
    }

    /// Unregister and close the connection for `id`.
    ///
    /// Close failures are logged; removal always succeeds. Returns whether a
    /// connection was registered.
    #[tracing::instrument(skip(self), fields(connection_id = %id))]
    pub async fn remove(&self, id: &str) -> bool {
        let conn = self.active.write().remove(id);
        match conn {
            Some(conn) => {
                if let Err(e) = conn.close().await {
                    tracing::warn!(error = %e, "failed to close connection");
                } else {
                    tracing::info!("connection closed");
                }
                true
            }
            None => false,
        }
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.active.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.active.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.read().is_empty()
    }

    /// Close and unregister every connection
    pub async fn close_all(&self) {
        let drained: Vec<(String, Arc<dyn Connection>)> = self.active.write().drain().collect();
        for (id, conn) in drained {
            if let Err(e) = conn.close().await {
                tracing::warn!(connection_id = %id, error = %e, "failed to close connection");
            }
        }
    }
}
