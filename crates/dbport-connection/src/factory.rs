//! Opens connections through a resolved driver

use std::sync::Arc;

use async_trait::async_trait;
use dbport_core::{Connection, ConnectionOptions, DatabaseDriver, Result, SessionSettings};

use crate::params::apply_session_settings;
use crate::pool::ConnectionFactory;

/// Connection factory bound to one driver, connection string and option set.
///
/// Every connection it opens has the session settings applied before it is
/// handed out; a connection whose settings fail is closed again.
pub struct DriverConnectionFactory {
    driver: Arc<dyn DatabaseDriver>,
    url: String,
    options: ConnectionOptions,
    session: SessionSettings,
}

impl DriverConnectionFactory {
    pub fn new(
        driver: Arc<dyn DatabaseDriver>,
        url: impl Into<String>,
        options: ConnectionOptions,
        session: SessionSettings,
    ) -> Self {
        Self {
            driver,
            url: url.into(),
            options,
            session,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn options(&self) -> &ConnectionOptions {
        &self.options
    }
}

#[async_trait]
impl ConnectionFactory for DriverConnectionFactory {
    async fn create(&self) -> Result<Arc<dyn Connection>> {
        let connection = self.driver.connect(&self.url, &self.options).await?;

        if let Err(e) = apply_session_settings(connection.as_ref(), &self.session).await {
            if let Err(close_err) = connection.close().await {
                tracing::warn!(error = %close_err, "failed to close connection after session setup error");
            }
            return Err(e);
        }

        Ok(connection)
    }
}

impl std::fmt::Debug for DriverConnectionFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverConnectionFactory")
            .field("driver", &self.driver.name())
            .field("url", &self.url)
            .field("options", &self.options)
            .finish()
    }
}
