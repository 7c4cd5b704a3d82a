//! MySQL connection implementation

use async_trait::async_trait;
use dbport_core::{
    Connection, ConnectionMetadata, ConnectionOptions, DbPortError, IsolationLevel, Result,
};
use mysql_async::{Conn, Opts, OptsBuilder, prelude::*};
use std::sync::Arc;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

use crate::tls::client_key_store;
use crate::{MySqlTarget, MysqlTlsConnector, tls_config_from_options};

/// ER_ACCESS_DENIED_ERROR
const ACCESS_DENIED: u16 = 1045;

/// Dedicated Tokio runtime for MySQL operations.
///
/// mysql_async binds its sockets to the runtime that opened them, so every
/// operation on a connection is spawned here.
fn mysql_runtime() -> Result<&'static tokio::runtime::Runtime> {
    static RUNTIME: OnceLock<std::result::Result<tokio::runtime::Runtime, String>> =
        OnceLock::new();
    RUNTIME
        .get_or_init(|| {
            tokio::runtime::Builder::new_multi_thread()
                .worker_threads(2)
                .enable_all()
                .thread_name("dbport-mysql-runtime")
                .build()
                .map_err(|e| e.to_string())
        })
        .as_ref()
        .map_err(|e| DbPortError::Connection(format!("Failed to start MySQL runtime: {}", e)))
}

fn connect_error(error: mysql_async::Error) -> DbPortError {
    match &error {
        mysql_async::Error::Server(server) if server.code == ACCESS_DENIED => {
            DbPortError::Authentication(server.message.clone())
        }
        _ => DbPortError::Connection(format!("Failed to connect to MySQL: {}", error)),
    }
}

fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

fn millis(options: &ConnectionOptions, key: &str) -> Option<Duration> {
    options
        .get_u64(key)
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis)
}

/// Await `fut`, failing with `ConnectionTimeout` once `limit` elapses
async fn bounded<T>(
    limit: Option<Duration>,
    what: &str,
    fut: impl Future<Output = T>,
) -> Result<T> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|_| {
            DbPortError::ConnectionTimeout(format!(
                "{} exceeded {}ms",
                what,
                limit.as_millis()
            ))
        }),
        None => Ok(fut.await),
    }
}

/// MySQL connection wrapper
pub struct MySqlConnection {
    driver_name: &'static str,
    /// `None` once closed
    conn: Arc<Mutex<Option<Conn>>>,
    closed: AtomicBool,
    socket_timeout: Option<Duration>,
    url: String,
    user: Option<String>,
}

impl MySqlConnection {
    /// Connect using a parsed target and the option set built for it
    pub async fn connect(
        driver_name: &'static str,
        target: &MySqlTarget,
        options: &ConnectionOptions,
    ) -> Result<Self> {
        tracing::info!(
            host = %target.host,
            port = %target.port,
            database = ?target.database,
            "connecting to MySQL database"
        );

        let opts = Self::build_opts(target, options)?;
        let runtime = mysql_runtime()?;

        let task = runtime.spawn(async move { Conn::new(opts).await });
        let conn = bounded(millis(options, "connectTimeout"), "MySQL connect", task)
            .await?
            .map_err(|e| DbPortError::Connection(format!("MySQL connection task failed: {}", e)))?
            .map_err(connect_error)?;

        tracing::info!(
            host = %target.host,
            port = %target.port,
            server_version = ?conn.server_version(),
            "MySQL connection established"
        );

        Ok(Self {
            driver_name,
            conn: Arc::new(Mutex::new(Some(conn))),
            closed: AtomicBool::new(false),
            socket_timeout: millis(options, "socketTimeout"),
            url: format!(
                "{}://{}:{}/{}",
                driver_name,
                target.host,
                target.port,
                target.database.as_deref().unwrap_or_default()
            ),
            user: options.get("user").map(str::to_string),
        })
    }

    fn build_opts(target: &MySqlTarget, options: &ConnectionOptions) -> Result<Opts> {
        let mut builder = OptsBuilder::default()
            .ip_or_hostname(target.host.as_str())
            .tcp_port(target.port)
            .db_name(target.database.as_deref())
            .user(options.get("user"))
            .pass(options.get("password"));

        if options.get_bool("cachePrepStmts") == Some(false) {
            builder = builder.stmt_cache_size(0);
        } else if let Some(size) = options.get_u64("prepStmtCacheSize") {
            builder = builder.stmt_cache_size(size as usize);
        }

        let tls = tls_config_from_options(options);
        let key_store = client_key_store(options);
        let ssl_opts = MysqlTlsConnector::build(
            &tls,
            key_store
                .as_ref()
                .map(|(path, password)| (path.as_path(), password.as_deref())),
        )?;

        Ok(builder.ssl_opts(ssl_opts).into())
    }

    /// Run a statement on the dedicated runtime, returning affected rows
    async fn query_drop(&self, sql: String) -> Result<u64> {
        let conn = Arc::clone(&self.conn);
        let task = mysql_runtime()?.spawn(async move {
            let mut guard = conn.lock().await;
            let conn = guard
                .as_mut()
                .ok_or_else(|| DbPortError::AlreadyClosed("MySQL connection".into()))?;
            conn.query_drop(sql)
                .await
                .map_err(|e| DbPortError::Query(format!("Failed to execute statement: {}", e)))?;
            Ok::<u64, DbPortError>(conn.affected_rows())
        });

        bounded(self.socket_timeout, "MySQL statement", task)
            .await?
            .map_err(|e| DbPortError::Query(format!("MySQL execute task failed: {}", e)))?
    }
}

impl MySqlConnection {
    /// Server version string and connection limit
    async fn server_facts(&self) -> Result<(Option<String>, Option<u64>)> {
        let conn = Arc::clone(&self.conn);
        let task = mysql_runtime()?.spawn(async move {
            let mut guard = conn.lock().await;
            let conn = guard
                .as_mut()
                .ok_or_else(|| DbPortError::AlreadyClosed("MySQL connection".into()))?;
            let row: Option<(String, u64)> = conn
                .query_first("SELECT VERSION(), @@max_connections")
                .await
                .map_err(|e| DbPortError::Query(format!("Failed to read server metadata: {}", e)))?;
            Ok::<_, DbPortError>(row)
        });
        let row = bounded(self.socket_timeout, "MySQL metadata query", task)
            .await?
            .map_err(|e| DbPortError::Query(format!("MySQL metadata task failed: {}", e)))??;
        Ok(match row {
            Some((version, max_connections)) => (Some(version), Some(max_connections)),
            None => (None, None),
        })
    }
}

#[async_trait]
impl Connection for MySqlConnection {
    fn driver_name(&self) -> &str {
        self.driver_name
    }

    #[tracing::instrument(skip(self, sql), fields(sql = %sql.chars().take(100).collect::<String>()))]
    async fn execute(&self, sql: &str) -> Result<u64> {
        let affected_rows = self.query_drop(sql.to_string()).await?;
        tracing::debug!(affected_rows, "statement executed");
        Ok(affected_rows)
    }

    async fn set_auto_commit(&self, enabled: bool) -> Result<()> {
        self.query_drop(format!("SET autocommit = {}", u8::from(enabled)))
            .await?;
        Ok(())
    }

    async fn set_read_only(&self, read_only: bool) -> Result<()> {
        let mode = if read_only { "READ ONLY" } else { "READ WRITE" };
        self.query_drop(format!("SET SESSION TRANSACTION {}", mode))
            .await?;
        Ok(())
    }

    async fn set_isolation_level(&self, level: IsolationLevel) -> Result<()> {
        self.query_drop(format!(
            "SET SESSION TRANSACTION ISOLATION LEVEL {}",
            level.as_sql()
        ))
        .await?;
        Ok(())
    }

    async fn set_schema(&self, schema: &str) -> Result<()> {
        self.query_drop(format!("USE {}", quote_identifier(schema)))
            .await?;
        Ok(())
    }

    async fn metadata(&self) -> Result<ConnectionMetadata> {
        let (product_version, max_connections) = self.server_facts().await?;
        let is_mariadb = product_version
            .as_deref()
            .is_some_and(|v| v.to_lowercase().contains("mariadb"));

        Ok(ConnectionMetadata {
            product_name: if is_mariadb { "MariaDB" } else { "MySQL" }.to_string(),
            product_version,
            driver_name: format!("dbport-driver-{}", self.driver_name),
            driver_version: Some(env!("CARGO_PKG_VERSION").to_string()),
            url: Some(self.url.clone()),
            user: self.user.clone(),
            supports_transactions: true,
            supports_stored_procedures: true,
            max_connections,
        })
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        tracing::info!("closing MySQL connection");

        let conn = Arc::clone(&self.conn);
        mysql_runtime()?
            .spawn(async move {
                match conn.lock().await.take() {
                    Some(conn) => conn.disconnect().await,
                    None => Ok(()),
                }
            })
            .await
            .map_err(|e| DbPortError::Connection(format!("MySQL close task failed: {}", e)))?
            .map_err(|e| {
                DbPortError::Connection(format!("Failed to close MySQL connection: {}", e))
            })
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
