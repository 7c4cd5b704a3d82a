//! Adapter placing dynamically loaded drivers behind the common driver interface

use async_trait::async_trait;
use dbport_core::{
    Connection, ConnectionMetadata, ConnectionOptions, DatabaseDriver, IsolationLevel, Result,
};
use libloading::Library;
use std::sync::Arc;

/// A driver instantiated from a shared library.
///
/// Holds the library open for as long as the driver, or any connection it
/// produced, is alive.
pub struct DriverAdapter {
    // Dropped before `library`
    driver: Box<dyn DatabaseDriver>,
    library: Arc<Library>,
}

impl DriverAdapter {
    pub fn new(driver: Box<dyn DatabaseDriver>, library: Arc<Library>) -> Self {
        Self { driver, library }
    }
}

#[async_trait]
impl DatabaseDriver for DriverAdapter {
    fn name(&self) -> &str {
        self.driver.name()
    }

    fn version(&self) -> &str {
        self.driver.version()
    }

    fn accepts_url(&self, url: &str) -> bool {
        self.driver.accepts_url(url)
    }

    async fn connect(
        &self,
        url: &str,
        options: &ConnectionOptions,
    ) -> Result<Arc<dyn Connection>> {
        let inner = self.driver.connect(url, options).await?;
        Ok(Arc::new(AdaptedConnection {
            inner,
            _library: Arc::clone(&self.library),
        }))
    }
}

/// Connection produced by a library driver; keeps the library mapped
pub struct AdaptedConnection {
    inner: Arc<dyn Connection>,
    _library: Arc<Library>,
}

#[async_trait]
impl Connection for AdaptedConnection {
    fn driver_name(&self) -> &str {
        self.inner.driver_name()
    }

    async fn execute(&self, sql: &str) -> Result<u64> {
        self.inner.execute(sql).await
    }

    async fn validate(&self, query: &str) -> Result<()> {
        self.inner.validate(query).await
    }

    async fn set_auto_commit(&self, enabled: bool) -> Result<()> {
        self.inner.set_auto_commit(enabled).await
    }

    async fn set_read_only(&self, read_only: bool) -> Result<()> {
        self.inner.set_read_only(read_only).await
    }

    async fn set_isolation_level(&self, level: IsolationLevel) -> Result<()> {
        self.inner.set_isolation_level(level).await
    }

    async fn set_schema(&self, schema: &str) -> Result<()> {
        self.inner.set_schema(schema).await
    }

    async fn metadata(&self) -> Result<ConnectionMetadata> {
        self.inner.metadata().await
    }

    async fn close(&self) -> Result<()> {
        self.inner.close().await
    }

    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}
