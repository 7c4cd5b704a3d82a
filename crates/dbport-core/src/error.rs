//! Error types for dbport

use thiserror::Error;

/// Boxed error used as the cause of a driver load failure
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Core error type for connectivity operations
#[derive(Error, Debug)]
pub enum DbPortError {
    #[error("Unsupported engine: {0}")]
    UnsupportedEngine(String),

    #[error("Failed to load driver '{driver_id}': {source}")]
    DriverLoad {
        driver_id: String,
        #[source]
        source: BoxError,
    },

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Connection timeout: {0}")]
    ConnectionTimeout(String),

    #[error("Pool exhausted: {0}")]
    PoolExhausted(String),

    #[error("Already closed: {0}")]
    AlreadyClosed(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl DbPortError {
    /// Build a `DriverLoad` error for the given driver id
    pub fn driver_load(driver_id: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::DriverLoad {
            driver_id: driver_id.into(),
            source: source.into(),
        }
    }

    /// Returns true for errors raised because a deadline elapsed
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::ConnectionTimeout(_))
    }

    /// Returns true for errors raised against a torn-down pool or connection
    pub fn is_already_closed(&self) -> bool {
        matches!(self, Self::AlreadyClosed(_))
    }
}

/// Result type alias for dbport operations
pub type Result<T> = std::result::Result<T, DbPortError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_driver_load_keeps_cause() {
        let cause = std::io::Error::new(std::io::ErrorKind::NotFound, "libfoo.so missing");
        let err = DbPortError::driver_load("foo", cause);

        assert!(err.to_string().contains("'foo'"));
        assert!(err.to_string().contains("libfoo.so missing"));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_driver_load_from_message() {
        let err = DbPortError::driver_load("bar", "entry point not found");
        assert_eq!(
            err.to_string(),
            "Failed to load driver 'bar': entry point not found"
        );
    }

    #[test]
    fn test_predicates() {
        assert!(DbPortError::ConnectionTimeout("50ms".into()).is_timeout());
        assert!(!DbPortError::PoolExhausted("x".into()).is_timeout());
        assert!(DbPortError::AlreadyClosed("pool".into()).is_already_closed());
    }
}
