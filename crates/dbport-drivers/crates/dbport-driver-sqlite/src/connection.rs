//! SQLite connection implementation

use async_trait::async_trait;
use dbport_core::{Connection, ConnectionMetadata, DbPortError, IsolationLevel, Result};
use parking_lot::Mutex;
use rusqlite::{Connection as RusqliteConnection, OpenFlags};
use std::path::PathBuf;
use std::time::Duration;

/// SQLite connection wrapper
pub struct SqliteConnection {
    /// `None` once closed
    conn: Mutex<Option<RusqliteConnection>>,
    path: String,
}

impl SqliteConnection {
    /// Open a SQLite database
    pub fn open(path: &str, busy_timeout: Option<Duration>) -> Result<Self> {
        tracing::info!(path = %path, "opening SQLite database");
        let expanded_path = Self::expand_path(path)?;

        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let conn = if path == ":memory:" {
            RusqliteConnection::open_in_memory().map_err(|e| {
                DbPortError::Connection(format!("Failed to open in-memory database: {}", e))
            })?
        } else {
            if !expanded_path.starts_with("file:") {
                let file_path = std::path::Path::new(&expanded_path);
                if let Some(parent) = file_path.parent()
                    && !parent.exists()
                {
                    return Err(DbPortError::Connection(format!(
                        "Parent directory does not exist: {}",
                        parent.display()
                    )));
                }
            }

            RusqliteConnection::open_with_flags(&expanded_path, flags).map_err(|e| {
                DbPortError::Connection(format!(
                    "Failed to open SQLite database at '{}': {}",
                    expanded_path, e
                ))
            })?
        };

        conn.pragma_update(None, "foreign_keys", "ON").map_err(|e| {
            DbPortError::Connection(format!("Failed to enable foreign keys: {}", e))
        })?;

        if let Some(timeout) = busy_timeout {
            conn.busy_timeout(timeout).map_err(|e| {
                DbPortError::Connection(format!("Failed to set busy timeout: {}", e))
            })?;
        }

        tracing::info!(path = %expanded_path, "SQLite database connection established");
        Ok(Self {
            conn: Mutex::new(Some(conn)),
            path: expanded_path,
        })
    }

    /// Path the connection was opened with, after expansion
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Expand `~` and make relative paths absolute
    fn expand_path(path: &str) -> Result<String> {
        if path == ":memory:" || path.starts_with("file:") {
            return Ok(path.to_string());
        }

        let expanded = if let Some(rest) = path.strip_prefix("~/") {
            let home = dirs::home_dir().ok_or_else(|| {
                DbPortError::Configuration("Unable to determine home directory".into())
            })?;
            home.join(rest)
        } else if path.starts_with('~') {
            return Err(DbPortError::Configuration(
                "User-specific home directories (~user) are not supported".into(),
            ));
        } else {
            PathBuf::from(path)
        };

        let absolute = if expanded.is_relative() {
            std::env::current_dir()?.join(expanded)
        } else {
            expanded
        };

        Ok(absolute.to_string_lossy().to_string())
    }

    fn with_conn<T>(&self, f: impl FnOnce(&RusqliteConnection) -> rusqlite::Result<T>) -> Result<T> {
        let guard = self.conn.lock();
        let conn = guard
            .as_ref()
            .ok_or_else(|| DbPortError::AlreadyClosed(format!("SQLite connection to {}", self.path)))?;
        f(conn).map_err(|e| DbPortError::Query(e.to_string()))
    }
}

#[async_trait]
impl Connection for SqliteConnection {
    fn driver_name(&self) -> &str {
        "sqlite"
    }

    #[tracing::instrument(skip(self, sql), fields(sql = %sql.chars().take(100).collect::<String>()))]
    async fn execute(&self, sql: &str) -> Result<u64> {
        self.with_conn(|conn| {
            conn.execute_batch(sql)?;
            Ok(conn.changes())
        })
    }

    async fn set_auto_commit(&self, enabled: bool) -> Result<()> {
        // SQLite commits implicitly unless a transaction is open
        self.with_conn(|conn| {
            match (enabled, conn.is_autocommit()) {
                (false, true) => conn.execute_batch("BEGIN DEFERRED"),
                (true, false) => conn.execute_batch("COMMIT"),
                _ => Ok(()),
            }
        })
    }

    async fn set_read_only(&self, read_only: bool) -> Result<()> {
        self.with_conn(|conn| conn.pragma_update(None, "query_only", read_only))
    }

    async fn set_isolation_level(&self, level: IsolationLevel) -> Result<()> {
        // Transactions are always serializable; only dirty reads can be toggled
        let read_uncommitted = level == IsolationLevel::ReadUncommitted;
        self.with_conn(|conn| conn.pragma_update(None, "read_uncommitted", read_uncommitted))
    }

    async fn metadata(&self) -> Result<ConnectionMetadata> {
        let version = self.with_conn(|conn| {
            conn.query_row("SELECT sqlite_version()", [], |row| row.get::<_, String>(0))
        })?;
        Ok(ConnectionMetadata {
            product_name: "SQLite".to_string(),
            product_version: Some(version),
            driver_name: "dbport-driver-sqlite".to_string(),
            driver_version: Some(env!("CARGO_PKG_VERSION").to_string()),
            url: Some(format!("sqlite:{}", self.path)),
            user: None,
            supports_transactions: true,
            supports_stored_procedures: false,
            max_connections: None,
        })
    }

    async fn close(&self) -> Result<()> {
        let Some(conn) = self.conn.lock().take() else {
            return Ok(());
        };
        conn.close().map_err(|(_, e)| {
            DbPortError::Connection(format!("Failed to close SQLite database: {}", e))
        })?;
        tracing::debug!(path = %self.path, "SQLite connection closed");
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.conn.lock().is_none()
    }
}
