//! Connectivity engine: the entry point used by request handlers

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use dbport_core::{
    Connection, ConnectionMetadata, ConnectionMonitor, ConnectionOptions, ConnectionProfile,
    CredentialStore, Credentials, DbPortError, DescriptorStore, DriverDescriptor,
    InMemoryDescriptorStore, NoCredentials, NoopMonitor, Result,
};
use dbport_drivers::{BuiltinEngine, DriverHandle, DriverRegistry};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::factory::DriverConnectionFactory;
use crate::params::{build_connection_options_with_credentials, build_connection_string};
use crate::pool::{ConnectionFactory, PoolManager, PoolRequest, PoolStats, PooledConnection, ProviderProfile};
use crate::registry::ConnectionRegistry;
use crate::settings::EngineSettings;

#[cfg(test)]
mod tests;

/// Query used by [`ConnectivityEngine::test_connection`]
const TEST_QUERY: &str = "SELECT 1";

/// How a connection id is managed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectMode {
    /// A single connection kept in the connection registry
    AdHoc,
    /// A pool owned by the pool manager
    #[default]
    Pooled,
}

/// Owns the driver registry, the pools and the ad-hoc connections.
///
/// An id is managed by exactly one strategy at a time: connecting an id in
/// one mode tears down whatever the other mode held under it.
pub struct ConnectivityEngine {
    drivers: DriverRegistry,
    descriptors: Arc<dyn DescriptorStore>,
    credentials: Arc<dyn CredentialStore>,
    pools: PoolManager,
    connections: ConnectionRegistry,
    settings: EngineSettings,
    /// Serializes connect/disconnect per connection id
    id_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

/// Builder for [`ConnectivityEngine`]
pub struct ConnectivityEngineBuilder {
    drivers: Option<DriverRegistry>,
    descriptors: Arc<dyn DescriptorStore>,
    credentials: Arc<dyn CredentialStore>,
    monitor: Arc<dyn ConnectionMonitor>,
    settings: EngineSettings,
}

impl Default for ConnectivityEngineBuilder {
    fn default() -> Self {
        Self {
            drivers: None,
            descriptors: Arc::new(InMemoryDescriptorStore::new()),
            credentials: Arc::new(NoCredentials),
            monitor: Arc::new(NoopMonitor),
            settings: EngineSettings::default(),
        }
    }
}

impl ConnectivityEngineBuilder {
    pub fn drivers(mut self, drivers: DriverRegistry) -> Self {
        self.drivers = Some(drivers);
        self
    }

    pub fn descriptor_store(mut self, store: Arc<dyn DescriptorStore>) -> Self {
        self.descriptors = store;
        self
    }

    pub fn credential_store(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.credentials = store;
        self
    }

    pub fn monitor(mut self, monitor: Arc<dyn ConnectionMonitor>) -> Self {
        self.monitor = monitor;
        self
    }

    pub fn settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn build(self) -> ConnectivityEngine {
        ConnectivityEngine {
            drivers: self.drivers.unwrap_or_else(DriverRegistry::with_defaults),
            descriptors: self.descriptors,
            credentials: self.credentials,
            pools: PoolManager::new(self.monitor),
            connections: ConnectionRegistry::new(),
            settings: self.settings,
            id_locks: Mutex::new(HashMap::new()),
        }
    }
}

impl ConnectivityEngine {
    /// Engine with every built-in driver of this build and no collaborators
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> ConnectivityEngineBuilder {
        ConnectivityEngineBuilder::default()
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn drivers(&self) -> &DriverRegistry {
        &self.drivers
    }

    fn id_lock(&self, id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.id_locks
            .lock()
            .entry(id.to_string())
            .or_default()
            .clone()
    }

    /// Forget the lock for `id` unless another caller is holding or
    /// waiting on it. `lock` is the caller's own, already unlocked, handle.
    fn release_id_lock(&self, id: &str, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self.id_locks.lock();
        if let Some(existing) = locks.get(id)
            && Arc::ptr_eq(existing, &lock)
            && Arc::strong_count(existing) == 2
        {
            locks.remove(id);
        }
    }

    /// Connect using `profile`, returning the connection id.
    ///
    /// The id is taken from the profile or generated. Connecting an id that
    /// is already connected replaces the previous connection or pool.
    #[tracing::instrument(skip(self, profile, mode), fields(engine = %profile.engine, mode = ?mode))]
    pub async fn connect(&self, profile: &ConnectionProfile, mode: ConnectMode) -> Result<String> {
        let id = profile
            .id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let handle = self.resolve_driver(profile).await?;
        let url = build_connection_string(profile, &handle);
        let credentials = self.credentials_for(&id, profile);
        let options = build_connection_options_with_credentials(profile, credentials.as_ref());

        tracing::debug!(
            connection_id = %id,
            driver = %handle.id(),
            url = %url,
            options = ?options,
            "prepared connection parameters"
        );

        let lock = self.id_lock(&id);
        let result = {
            let _guard = lock.lock().await;
            self.install(&id, profile, mode, &handle, url, options).await
        };
        self.release_id_lock(&id, lock);
        result?;

        tracing::info!(connection_id = %id, driver = %handle.id(), "connected");
        Ok(id)
    }

    /// Register a connection or pool under `id`, replacing what the id held.
    /// The caller holds the id lock.
    async fn install(
        &self,
        id: &str,
        profile: &ConnectionProfile,
        mode: ConnectMode,
        handle: &DriverHandle,
        url: String,
        options: ConnectionOptions,
    ) -> Result<()> {
        match mode {
            ConnectMode::AdHoc => {
                if self.pools.contains(id) {
                    tracing::info!(connection_id = %id, "closing pool before ad-hoc connect");
                    self.pools.close_pool(id).await;
                }

                let factory = DriverConnectionFactory::new(
                    handle.driver().clone(),
                    url,
                    options,
                    profile.session.clone(),
                );
                let connection = bounded_connect(profile, factory.create()).await?;

                if let Some(previous) = self.connections.put(id.to_string(), connection) {
                    if let Err(e) = previous.close().await {
                        tracing::warn!(connection_id = %id, error = %e, "failed to close replaced connection");
                    }
                }
            }
            ConnectMode::Pooled => {
                if self.connections.has(id) {
                    tracing::info!(connection_id = %id, "closing ad-hoc connection before pooling");
                    self.connections.remove(id).await;
                }

                let provider = profile
                    .provider
                    .as_deref()
                    .map(ProviderProfile::from_name)
                    .unwrap_or(self.settings.default_provider);
                let mut hints = profile.pool;
                if hints.acquire_timeout_ms.is_none() {
                    hints.acquire_timeout_ms = self.settings.acquire_timeout_ms;
                }

                // Credentials are already in `options`, under any custom properties
                let request = PoolRequest::new(handle.driver().clone(), url)
                    .with_provider(provider)
                    .with_hints(hints)
                    .with_options(options)
                    .with_session(profile.session.clone())
                    .with_connect_timeout(profile.timeouts.connect());
                self.pools.create_pool(id, request).await?;
            }
        }
        Ok(())
    }

    /// Tear down whatever is registered under `id`. Never fails.
    #[tracing::instrument(skip(self))]
    pub async fn disconnect(&self, id: &str) {
        let lock = self.id_lock(id);
        {
            let _guard = lock.lock().await;

            let closed_adhoc = self.connections.remove(id).await;
            let had_pool = self.pools.contains(id);
            self.pools.close_pool(id).await;

            if !closed_adhoc && !had_pool {
                tracing::debug!("nothing connected under id");
            }
        }
        self.release_id_lock(id, lock);
    }

    /// Lease a connection from the pool registered under `id`
    pub async fn acquire(&self, id: &str) -> Result<PooledConnection> {
        self.pools.acquire(id).await
    }

    /// The ad-hoc connection registered under `id`
    pub fn connection(&self, id: &str) -> Option<Arc<dyn Connection>> {
        self.connections.get(id)
    }

    /// Server and driver metadata for the connection registered under `id`.
    ///
    /// A pooled id is answered through a lease held for the duration of
    /// the call.
    #[tracing::instrument(skip(self))]
    pub async fn connection_metadata(&self, id: &str) -> Result<ConnectionMetadata> {
        if let Some(connection) = self.connections.get(id) {
            return connection.metadata().await;
        }
        if self.pools.contains(id) {
            let lease = self.pools.acquire(id).await?;
            return lease.metadata().await;
        }
        Err(DbPortError::NotFound(format!(
            "no connection registered under '{}'",
            id
        )))
    }

    pub fn pool_statistics(&self, id: &str) -> Option<PoolStats> {
        self.pools.statistics(id)
    }

    pub fn all_pool_statistics(&self) -> HashMap<String, PoolStats> {
        self.pools.all_statistics()
    }

    /// Load a custom driver; relative artifact paths resolve under the
    /// configured drivers directory
    #[tracing::instrument(skip(self, descriptor), fields(driver_id = %descriptor.id))]
    pub async fn register_custom_driver(&self, descriptor: &DriverDescriptor) -> Result<DriverHandle> {
        let mut descriptor = descriptor.clone();
        descriptor.artifact_path = self.settings.resolve_artifact(&descriptor.artifact_path);
        self.drivers.resolve_custom(&descriptor).await
    }

    /// Drop a loaded custom driver; open connections keep working
    pub fn forget_custom_driver(&self, id: &str) -> bool {
        self.drivers.forget(id)
    }

    /// Open a connection, run a trivial query and close it again
    #[tracing::instrument(skip(self, profile), fields(engine = %profile.engine))]
    pub async fn test_connection(&self, profile: &ConnectionProfile) -> Result<()> {
        let handle = self.resolve_driver(profile).await?;
        let url = build_connection_string(profile, &handle);
        let id = profile.id.as_deref().unwrap_or_default();
        let credentials = self.credentials_for(id, profile);
        let options = build_connection_options_with_credentials(profile, credentials.as_ref());

        let connection = bounded_connect(profile, handle.driver().connect(&url, &options)).await?;
        let result = connection.validate(TEST_QUERY).await;

        if let Err(e) = connection.close().await {
            tracing::warn!(error = %e, "failed to close test connection");
        }
        match &result {
            Ok(()) => tracing::info!("connection test succeeded"),
            Err(e) => tracing::warn!(error = %e, "connection test failed"),
        }
        result
    }

    /// Built-in engines with a driver in this build
    pub fn supported_engines(&self) -> Vec<BuiltinEngine> {
        self.drivers.supported_engines()
    }

    /// Close every pool and ad-hoc connection
    #[tracing::instrument(skip(self))]
    pub async fn shutdown(&self) {
        self.connections.close_all().await;
        self.pools.close_all().await;
        tracing::info!("connectivity engine shut down");
    }

    async fn resolve_driver(&self, profile: &ConnectionProfile) -> Result<DriverHandle> {
        match &profile.custom_driver_id {
            Some(driver_id) => {
                let descriptor = self.descriptors.descriptor(driver_id).ok_or_else(|| {
                    DbPortError::driver_load(
                        driver_id.as_str(),
                        format!("no descriptor stored for driver '{}'", driver_id),
                    )
                })?;
                self.register_custom_driver(&descriptor).await
            }
            None => self.drivers.resolve_builtin(&profile.engine),
        }
    }

    /// Profile credentials, or the credential store's when the profile has none
    fn credentials_for(&self, id: &str, profile: &ConnectionProfile) -> Option<Credentials> {
        profile
            .credentials
            .clone()
            .filter(|c| !c.is_empty())
            .or_else(|| self.credentials.credentials(id))
    }
}

impl Default for ConnectivityEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Bound `fut` by the profile's connect timeout, if it has one
async fn bounded_connect<T>(
    profile: &ConnectionProfile,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match profile.timeouts.connect() {
        Some(limit) => tokio::time::timeout(limit, fut).await.unwrap_or_else(|_| {
            Err(DbPortError::ConnectionTimeout(format!(
                "connecting to {} at {} timed out after {:?}",
                profile.engine, profile.host, limit
            )))
        }),
        None => fut.await,
    }
}
