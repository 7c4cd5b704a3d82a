//! MySQL and MariaDB driver implementation

use async_trait::async_trait;
use dbport_core::{Connection, ConnectionOptions, DatabaseDriver, DbPortError, Result};
use std::sync::Arc;

use crate::MySqlConnection;

const DEFAULT_PORT: u16 = 3306;
const URL_SCHEMES: [&str; 2] = ["mysql://", "mariadb://"];

/// Where a `mysql://host:port/database?k=v` connection string points
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MySqlTarget {
    pub host: String,
    pub port: u16,
    /// Empty path means no default database
    pub database: Option<String>,
    pub params: Vec<(String, String)>,
}

impl MySqlTarget {
    pub fn parse(url: &str) -> Result<Self> {
        let rest = URL_SCHEMES
            .iter()
            .find_map(|scheme| url.strip_prefix(scheme))
            .ok_or_else(|| {
                DbPortError::Configuration(format!("not a MySQL connection string: {}", url))
            })?;

        let (location, query) = rest.split_once('?').unwrap_or((rest, ""));
        let (authority, database) = location.split_once('/').unwrap_or((location, ""));
        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => (
                host,
                port.parse::<u16>().map_err(|_| {
                    DbPortError::Configuration(format!("invalid port '{}' in {}", port, url))
                })?,
            ),
            None => (authority, DEFAULT_PORT),
        };

        Ok(Self {
            host: if host.is_empty() { "localhost" } else { host }.to_string(),
            port,
            database: (!database.is_empty()).then(|| database.to_string()),
            params: query
                .split('&')
                .filter(|pair| !pair.is_empty())
                .map(|pair| {
                    let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
                    (key.to_string(), value.to_string())
                })
                .collect(),
        })
    }
}

/// MySQL-protocol database driver, registered once per engine flavour
pub struct MySqlDriver {
    name: &'static str,
}

impl MySqlDriver {
    /// Create a new MySQL driver instance
    pub fn new() -> Self {
        tracing::debug!("MySQL driver initialized");
        Self { name: "mysql" }
    }

    /// Same protocol, registered under the MariaDB name
    pub fn mariadb() -> Self {
        tracing::debug!("MariaDB driver initialized");
        Self { name: "mariadb" }
    }
}

impl Default for MySqlDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DatabaseDriver for MySqlDriver {
    fn name(&self) -> &str {
        self.name
    }

    fn accepts_url(&self, url: &str) -> bool {
        URL_SCHEMES.iter().any(|scheme| url.starts_with(scheme))
    }

    #[tracing::instrument(skip(self, options), fields(driver = %self.name, url = %url))]
    async fn connect(
        &self,
        url: &str,
        options: &ConnectionOptions,
    ) -> Result<Arc<dyn Connection>> {
        let target = MySqlTarget::parse(url)?;

        let mut effective = options.clone();
        for (key, value) in &target.params {
            effective.set_default(key.as_str(), value.as_str());
        }

        let conn = MySqlConnection::connect(self.name, &target, &effective)
            .await
            .inspect_err(|e| {
                tracing::error!(error = %e, "failed to connect to MySQL database");
            })?;

        tracing::info!(
            host = %target.host,
            port = %target.port,
            database = ?target.database,
            "MySQL connection created"
        );
        Ok(Arc::new(conn))
    }
}
