//! PostgreSQL driver implementation

use async_trait::async_trait;
use dbport_core::{Connection, ConnectionOptions, DatabaseDriver, DbPortError, Result};
use std::sync::Arc;

use crate::PostgresConnection;

const DEFAULT_PORT: u16 = 5432;
const URL_SCHEMES: [&str; 2] = ["postgresql://", "postgres://"];

/// Where a `postgresql://host:port/database?k=v` connection string points
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostgresTarget {
    pub host: String,
    pub port: u16,
    pub database: String,
    /// Query parameters, in order
    pub params: Vec<(String, String)>,
}

impl PostgresTarget {
    pub fn parse(url: &str) -> Result<Self> {
        let rest = URL_SCHEMES
            .iter()
            .find_map(|scheme| url.strip_prefix(scheme))
            .ok_or_else(|| {
                DbPortError::Configuration(format!("not a PostgreSQL connection string: {}", url))
            })?;

        let (location, query) = rest.split_once('?').unwrap_or((rest, ""));
        let (authority, database) = location.split_once('/').unwrap_or((location, ""));

        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => {
                let port = port.parse::<u16>().map_err(|_| {
                    DbPortError::Configuration(format!("invalid port '{}' in {}", port, url))
                })?;
                (host, port)
            }
            None => (authority, DEFAULT_PORT),
        };

        let params = query
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| {
                let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
                (key.to_string(), value.to_string())
            })
            .collect();

        Ok(Self {
            host: if host.is_empty() { "localhost" } else { host }.to_string(),
            port,
            database: if database.is_empty() { "postgres" } else { database }.to_string(),
            params,
        })
    }
}

/// PostgreSQL database driver
pub struct PostgresDriver;

impl PostgresDriver {
    /// Create a new PostgreSQL driver instance
    pub fn new() -> Self {
        tracing::debug!("PostgreSQL driver initialized");
        Self
    }
}

impl Default for PostgresDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DatabaseDriver for PostgresDriver {
    fn name(&self) -> &str {
        "postgres"
    }

    fn accepts_url(&self, url: &str) -> bool {
        URL_SCHEMES.iter().any(|scheme| url.starts_with(scheme))
    }

    #[tracing::instrument(skip(self, options), fields(url = %url))]
    async fn connect(
        &self,
        url: &str,
        options: &ConnectionOptions,
    ) -> Result<Arc<dyn Connection>> {
        let target = PostgresTarget::parse(url)?;

        // Query parameters fill in whatever the option set leaves out
        let mut effective = options.clone();
        for (key, value) in &target.params {
            effective.set_default(key.as_str(), value.as_str());
        }

        let conn = PostgresConnection::connect(&target, &effective)
            .await
            .inspect_err(|e| {
                tracing::error!(error = %e, "failed to connect to PostgreSQL database");
            })?;

        tracing::info!(
            host = %target.host,
            port = %target.port,
            database = %target.database,
            "PostgreSQL connection created"
        );
        Ok(Arc::new(conn))
    }
}
