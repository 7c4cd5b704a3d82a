//! PostgreSQL connection implementation

use async_trait::async_trait;
use dbport_core::security::TlsMode;
use dbport_core::{
    Connection, ConnectionMetadata, ConnectionOptions, DbPortError, IsolationLevel, Result,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio_postgres::config::SslMode;
use tokio_postgres::{Client, NoTls, SimpleQueryMessage};

use crate::{PostgresTarget, PostgresTlsConnector, tls_config_from_options};

/// Dedicated Tokio runtime that drives PostgreSQL socket tasks.
///
/// Connections outlive the runtime of whichever caller opened them, and
/// drivers loaded from a library cannot rely on the host's runtime.
fn postgres_runtime() -> Result<&'static tokio::runtime::Runtime> {
    static RUNTIME: OnceLock<std::result::Result<tokio::runtime::Runtime, String>> =
        OnceLock::new();
    RUNTIME
        .get_or_init(|| {
            tokio::runtime::Builder::new_multi_thread()
                .worker_threads(2)
                .enable_all()
                .thread_name("dbport-postgres-runtime")
                .build()
                .map_err(|e| e.to_string())
        })
        .as_ref()
        .map_err(|e| {
            DbPortError::Connection(format!("Failed to start PostgreSQL runtime: {}", e))
        })
}

fn format_postgres_error(error: &tokio_postgres::Error) -> String {
    let Some(db_error) = error.as_db_error() else {
        return error.to_string();
    };

    let mut message = db_error.message().to_string();
    if let Some(detail) = db_error.detail()
        && !detail.trim().is_empty()
    {
        message.push_str(&format!(" (detail: {})", detail));
    }
    if let Some(hint) = db_error.hint()
        && !hint.trim().is_empty()
    {
        message.push_str(&format!(" (hint: {})", hint));
    }
    format!("{} (code: {})", message, db_error.code().code())
}

fn connect_error(error: tokio_postgres::Error) -> DbPortError {
    let message = format_postgres_error(&error);
    match error.as_db_error().map(|db| db.code().code()) {
        // invalid_authorization_specification, invalid_password
        Some("28000") | Some("28P01") => DbPortError::Authentication(message),
        _ => DbPortError::Connection(format!("Failed to connect to PostgreSQL: {}", message)),
    }
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// PostgreSQL connection wrapper
pub struct PostgresConnection {
    /// `None` once closed
    client: Mutex<Option<Arc<Client>>>,
    socket_timeout: Option<Duration>,
    /// Set while auto-commit is off and an explicit transaction is open
    in_transaction: AtomicBool,
    url: String,
    user: Option<String>,
}

impl PostgresConnection {
    /// Connect using a parsed target and the option set built for it
    pub async fn connect(target: &PostgresTarget, options: &ConnectionOptions) -> Result<Self> {
        let tls = tls_config_from_options(options)?;

        tracing::info!(
            host = %target.host,
            port = %target.port,
            database = %target.database,
            ssl_mode = %tls.mode,
            "connecting to PostgreSQL database"
        );

        let mut config = tokio_postgres::Config::new();
        config
            .host(&target.host)
            .port(target.port)
            .dbname(&target.database);

        if let Some(user) = options.get("user") {
            config.user(user);
        }
        if let Some(password) = options.get("password") {
            config.password(password);
        }
        if let Some(name) = options.get("ApplicationName") {
            config.application_name(name);
        }
        if let Some(ms) = options.get_u64("connectTimeout").filter(|ms| *ms > 0) {
            config.connect_timeout(Duration::from_millis(ms));
        }

        config.ssl_mode(match tls.mode {
            TlsMode::Disable => SslMode::Disable,
            TlsMode::Allow | TlsMode::Prefer => SslMode::Prefer,
            TlsMode::Require | TlsMode::VerifyCa | TlsMode::VerifyFull => SslMode::Require,
        });

        let runtime = postgres_runtime()?;

        let client = if tls.mode == TlsMode::Disable {
            let (client, connection) = runtime
                .spawn({
                    let config = config.clone();
                    async move { config.connect(NoTls).await }
                })
                .await
                .map_err(|e| {
                    DbPortError::Connection(format!("PostgreSQL connection task failed: {}", e))
                })?
                .map_err(connect_error)?;

            runtime.spawn(async move {
                if let Err(e) = connection.await {
                    tracing::error!(error = %e, "PostgreSQL connection error");
                }
            });
            client
        } else {
            let connector = PostgresTlsConnector::build(&tls)?;
            let (client, connection) = runtime
                .spawn({
                    let config = config.clone();
                    async move { config.connect(connector).await }
                })
                .await
                .map_err(|e| {
                    DbPortError::Connection(format!("PostgreSQL connection task failed: {}", e))
                })?
                .map_err(connect_error)?;

            runtime.spawn(async move {
                if let Err(e) = connection.await {
                    tracing::error!(error = %e, "PostgreSQL connection error");
                }
            });
            client
        };

        let socket_timeout = options
            .get_u64("socketTimeout")
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis);

        Ok(Self {
            client: Mutex::new(Some(Arc::new(client))),
            socket_timeout,
            in_transaction: AtomicBool::new(false),
            url: format!("postgresql://{}:{}/{}", target.host, target.port, target.database),
            user: options.get("user").map(str::to_string),
        })
    }

    fn client(&self) -> Result<Arc<Client>> {
        self.client
            .lock()
            .clone()
            .ok_or_else(|| DbPortError::AlreadyClosed("PostgreSQL connection".into()))
    }

    /// Run one or more statements with the simple query protocol
    async fn simple_query(&self, sql: &str) -> Result<u64> {
        let messages = self.simple_messages(sql).await?;
        Ok(messages
            .iter()
            .filter_map(|message| match message {
                SimpleQueryMessage::CommandComplete(rows) => Some(*rows),
                _ => None,
            })
            .sum())
    }

    /// Text columns of the first row returned by `sql`
    async fn first_row(&self, sql: &str) -> Result<Vec<Option<String>>> {
        let messages = self.simple_messages(sql).await?;
        messages
            .iter()
            .find_map(|message| match message {
                SimpleQueryMessage::Row(row) => Some(
                    (0..row.len())
                        .map(|i| row.get(i).map(str::to_string))
                        .collect(),
                ),
                _ => None,
            })
            .ok_or_else(|| DbPortError::Query(format!("no row returned by: {}", sql)))
    }

    async fn simple_messages(&self, sql: &str) -> Result<Vec<SimpleQueryMessage>> {
        let client = self.client()?;
        let query = client.simple_query(sql);

        match self.socket_timeout {
            Some(limit) => tokio::time::timeout(limit, query).await.map_err(|_| {
                DbPortError::ConnectionTimeout(format!(
                    "statement exceeded socket timeout of {}ms",
                    limit.as_millis()
                ))
            })?,
            None => query.await,
        }
        .map_err(|e| DbPortError::Query(format_postgres_error(&e)))
    }
}

#[async_trait]
impl Connection for PostgresConnection {
    fn driver_name(&self) -> &str {
        "postgres"
    }

    #[tracing::instrument(skip(self, sql), fields(sql = %sql.chars().take(100).collect::<String>()))]
    async fn execute(&self, sql: &str) -> Result<u64> {
        self.simple_query(sql).await
    }

    async fn set_auto_commit(&self, enabled: bool) -> Result<()> {
        // The server auto-commits unless a transaction block is open
        let open = self.in_transaction.load(Ordering::SeqCst);
        match (enabled, open) {
            (false, false) => {
                self.simple_query("BEGIN").await?;
                self.in_transaction.store(true, Ordering::SeqCst);
            }
            (true, true) => {
                self.simple_query("COMMIT").await?;
                self.in_transaction.store(false, Ordering::SeqCst);
            }
            _ => {}
        }
        Ok(())
    }

    async fn set_read_only(&self, read_only: bool) -> Result<()> {
        let mode = if read_only { "READ ONLY" } else { "READ WRITE" };
        self.simple_query(&format!(
            "SET SESSION CHARACTERISTICS AS TRANSACTION {}",
            mode
        ))
        .await?;
        Ok(())
    }

    async fn set_isolation_level(&self, level: IsolationLevel) -> Result<()> {
        self.simple_query(&format!(
            "SET SESSION CHARACTERISTICS AS TRANSACTION ISOLATION LEVEL {}",
            level.as_sql()
        ))
        .await?;
        Ok(())
    }

    async fn set_schema(&self, schema: &str) -> Result<()> {
        self.simple_query(&format!("SET search_path TO {}", quote_identifier(schema)))
            .await?;
        Ok(())
    }

    async fn metadata(&self) -> Result<ConnectionMetadata> {
        let row = self
            .first_row("SELECT current_setting('server_version'), current_setting('max_connections')")
            .await?;
        let mut columns = row.into_iter();
        let product_version = columns.next().flatten();
        let max_connections = columns.next().flatten().and_then(|v| v.parse().ok());

        Ok(ConnectionMetadata {
            product_name: "PostgreSQL".to_string(),
            product_version,
            driver_name: "dbport-driver-postgres".to_string(),
            driver_version: Some(env!("CARGO_PKG_VERSION").to_string()),
            url: Some(self.url.clone()),
            user: self.user.clone(),
            supports_transactions: true,
            supports_stored_procedures: true,
            max_connections,
        })
    }

    async fn close(&self) -> Result<()> {
        // Dropping the last client handle terminates the socket task
        if self.client.lock().take().is_some() {
            tracing::info!("closing PostgreSQL connection");
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.client
            .lock()
            .as_ref()
            .is_none_or(|client| client.is_closed())
    }
}
