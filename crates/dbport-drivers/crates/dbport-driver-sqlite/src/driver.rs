//! SQLite driver implementation

use async_trait::async_trait;
use dbport_core::{Connection, ConnectionOptions, DatabaseDriver, DbPortError, Result};
use std::sync::Arc;
use std::time::Duration;

use crate::SqliteConnection;

const URL_PREFIX: &str = "sqlite:";

/// SQLite database driver
pub struct SqliteDriver;

impl SqliteDriver {
    /// Create a new SQLite driver instance
    pub fn new() -> Self {
        tracing::debug!("SQLite driver initialized");
        Self
    }
}

impl Default for SqliteDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DatabaseDriver for SqliteDriver {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn accepts_url(&self, url: &str) -> bool {
        url.starts_with(URL_PREFIX)
    }

    #[tracing::instrument(skip(self, options), fields(url = %url))]
    async fn connect(
        &self,
        url: &str,
        options: &ConnectionOptions,
    ) -> Result<Arc<dyn Connection>> {
        let path = url.strip_prefix(URL_PREFIX).ok_or_else(|| {
            DbPortError::Configuration(format!(
                "SQLite connection strings start with '{}', got '{}'",
                URL_PREFIX, url
            ))
        })?;
        if path.is_empty() {
            return Err(DbPortError::Configuration(
                "SQLite requires a database path. Example: sqlite:/path/to/database.db".into(),
            ));
        }

        // Lock waits are the closest SQLite has to a connect timeout
        let busy_timeout = options.get_u64("connectTimeout").map(Duration::from_millis);

        let conn = SqliteConnection::open(path, busy_timeout).map_err(|e| {
            tracing::error!(error = %e, "failed to connect to SQLite database");
            e
        })?;

        tracing::info!(path = %path, "SQLite connection created");
        Ok(Arc::new(conn))
    }
}
