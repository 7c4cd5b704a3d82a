//! Connection trait and session-level settings

use crate::{DbPortError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Transaction isolation levels understood by every driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IsolationLevel {
    ReadUncommitted,
    #[default]
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    /// Map a user-supplied level name onto an isolation level.
    ///
    /// Accepts `READ_UNCOMMITTED`, `READ_COMMITTED`, `REPEATABLE_READ` and
    /// `SERIALIZABLE` in any case, with `_`, `-` or space as separator.
    /// Anything else resolves to `ReadCommitted`.
    pub fn from_name(name: &str) -> Self {
        let normalized = name.trim().to_uppercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "READ_UNCOMMITTED" => Self::ReadUncommitted,
            "READ_COMMITTED" => Self::ReadCommitted,
            "REPEATABLE_READ" => Self::RepeatableRead,
            "SERIALIZABLE" => Self::Serializable,
            other => {
                tracing::debug!(isolation = %other, "unrecognized isolation level, using READ COMMITTED");
                Self::ReadCommitted
            }
        }
    }

    /// SQL spelling used in `SET ... ISOLATION LEVEL` statements
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::ReadUncommitted => "READ UNCOMMITTED",
            Self::ReadCommitted => "READ COMMITTED",
            Self::RepeatableRead => "REPEATABLE READ",
            Self::Serializable => "SERIALIZABLE",
        }
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Server and driver facts about a live connection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionMetadata {
    pub product_name: String,
    pub product_version: Option<String>,
    pub driver_name: String,
    pub driver_version: Option<String>,
    /// Connection string with credentials left out
    pub url: Option<String>,
    pub user: Option<String>,
    pub supports_transactions: bool,
    pub supports_stored_procedures: bool,
    /// Server-wide connection limit, when the server reports one
    pub max_connections: Option<u64>,
}

impl ConnectionMetadata {
    /// Metadata naming only the driver; product and versions unknown
    pub fn new(driver_name: impl Into<String>) -> Self {
        let driver_name = driver_name.into();
        Self {
            product_name: driver_name.clone(),
            driver_name,
            supports_transactions: true,
            ..Default::default()
        }
    }
}

/// A live database connection produced by a driver
#[async_trait]
pub trait Connection: Send + Sync {
    /// Name of the driver that produced this connection
    fn driver_name(&self) -> &str;

    /// Execute a statement, returning the number of affected rows
    async fn execute(&self, sql: &str) -> Result<u64>;

    /// Run a lightweight query to confirm the connection is usable
    async fn validate(&self, query: &str) -> Result<()> {
        self.execute(query).await.map(|_| ())
    }

    /// Enable or disable auto-commit for the session
    async fn set_auto_commit(&self, enabled: bool) -> Result<()>;

    /// Mark the session read-only (or read-write)
    async fn set_read_only(&self, read_only: bool) -> Result<()>;

    /// Set the session's default transaction isolation level
    async fn set_isolation_level(&self, level: IsolationLevel) -> Result<()>;

    /// Select the default schema through the driver's native API.
    ///
    /// Drivers without a direct schema-selection call keep the default,
    /// which makes callers fall back to a `USE <schema>` statement.
    async fn set_schema(&self, schema: &str) -> Result<()> {
        Err(DbPortError::NotSupported(format!(
            "{} has no direct schema selection (requested '{}')",
            self.driver_name(),
            schema
        )))
    }

    /// Describe the server and driver behind this connection
    async fn metadata(&self) -> Result<ConnectionMetadata> {
        if self.is_closed() {
            return Err(DbPortError::AlreadyClosed(format!("{} connection", self.driver_name())));
        }
        Ok(ConnectionMetadata::new(self.driver_name()))
    }

    /// Close the connection
    async fn close(&self) -> Result<()>;

    /// Check if the connection is closed
    fn is_closed(&self) -> bool;
}
