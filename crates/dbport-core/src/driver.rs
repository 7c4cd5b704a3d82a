//! Database driver trait definition

use crate::{Connection, ConnectionOptions, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// Capability every driver exposes, whether compiled in or loaded at runtime.
///
/// Drivers receive a fully built connection string and the option set
/// produced for it; they never see the caller's profile.
#[async_trait]
pub trait DatabaseDriver: Send + Sync {
    /// Unique driver name (e.g. "postgres", "sqlite")
    fn name(&self) -> &str;

    /// Driver version
    fn version(&self) -> &str {
        "0.1.0"
    }

    /// Whether this driver understands the given connection string
    fn accepts_url(&self, url: &str) -> bool;

    /// Open a new connection
    async fn connect(&self, url: &str, options: &ConnectionOptions)
    -> Result<Arc<dyn Connection>>;
}
