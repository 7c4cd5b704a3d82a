//! Pool lifecycle per connection id

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dbport_core::{
    ConnectionMonitor, ConnectionOptions, Credentials, DatabaseDriver, DbPortError, PoolHints,
    Result, SessionSettings,
};
use parking_lot::{Mutex, RwLock};

use super::config::ProviderProfile;
use super::pool::{ConnectionPool, PooledConnection};
use super::stats::PoolStats;
use crate::factory::DriverConnectionFactory;

/// Everything needed to build a pool for one id
pub struct PoolRequest {
    pub driver: Arc<dyn DatabaseDriver>,
    pub connection_string: String,
    pub credentials: Option<Credentials>,
    pub provider: ProviderProfile,
    pub hints: PoolHints,
    pub options: ConnectionOptions,
    pub session: SessionSettings,
    /// Limit on opening the new pool's warm-up connections
    pub connect_timeout: Option<Duration>,
}

impl PoolRequest {
    pub fn new(driver: Arc<dyn DatabaseDriver>, connection_string: impl Into<String>) -> Self {
        Self {
            driver,
            connection_string: connection_string.into(),
            credentials: None,
            provider: ProviderProfile::Default,
            hints: PoolHints::default(),
            options: ConnectionOptions::new(),
            session: SessionSettings::default(),
            connect_timeout: None,
        }
    }

    pub fn with_credentials(mut self, credentials: Option<Credentials>) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_provider(mut self, provider: ProviderProfile) -> Self {
        self.provider = provider;
        self
    }

    pub fn with_hints(mut self, hints: PoolHints) -> Self {
        self.hints = hints;
        self
    }

    pub fn with_options(mut self, options: ConnectionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_session(mut self, session: SessionSettings) -> Self {
        self.session = session;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Provider properties, then credentials, then the caller's options
    fn effective_options(&self) -> ConnectionOptions {
        let mut options = self.provider.connection_properties(&self.options);
        if let Some(credentials) = &self.credentials {
            if let Some(user) = &credentials.username {
                options.set("user", user.as_str());
            }
            if let Some(password) = &credentials.password {
                options.set("password", password.as_str());
            }
        }
        options.merge(&self.options);
        options
    }
}

#[derive(Clone)]
struct PoolEntry {
    pool: Arc<ConnectionPool>,
    provider: ProviderProfile,
}

/// Owns at most one pool per connection id.
///
/// Creating and closing a pool are serialized per id; acquires and
/// statistics only take a short read lock on the pool map.
pub struct PoolManager {
    pools: RwLock<HashMap<String, PoolEntry>>,
    lifecycle: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    monitor: Arc<dyn ConnectionMonitor>,
}

impl PoolManager {
    pub fn new(monitor: Arc<dyn ConnectionMonitor>) -> Self {
        Self {
            pools: RwLock::new(HashMap::new()),
            lifecycle: Mutex::new(HashMap::new()),
            monitor,
        }
    }

    fn lifecycle_lock(&self, id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.lifecycle
            .lock()
            .entry(id.to_string())
            .or_default()
            .clone()
    }

    /// Forget the lifecycle lock for `id` unless another caller holds or
    /// waits on it. `lock` is the caller's own handle, already unlocked.
    fn release_lifecycle_lock(&self, id: &str, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut lifecycle = self.lifecycle.lock();
        if let Some(existing) = lifecycle.get(id)
            && Arc::ptr_eq(existing, &lock)
            && Arc::strong_count(existing) == 2
        {
            lifecycle.remove(id);
        }
    }

    #[cfg(test)]
    pub(super) fn lifecycle_lock_count(&self) -> usize {
        self.lifecycle.lock().len()
    }

    /// Create the pool for `id`, closing any pool already registered under it.
    ///
    /// The previous pool is closed completely before the request's connect
    /// timeout starts; the timeout only bounds the new pool's warm-up.
    #[tracing::instrument(skip(self, request), fields(provider = %request.provider))]
    pub async fn create_pool(&self, id: &str, request: PoolRequest) -> Result<()> {
        let lock = self.lifecycle_lock(id);
        let result = {
            let _guard = lock.lock().await;
            self.replace_pool(id, request).await
        };
        self.release_lifecycle_lock(id, lock);
        result
    }

    async fn replace_pool(&self, id: &str, request: PoolRequest) -> Result<()> {
        let existing = self.pools.write().remove(id);
        if let Some(existing) = existing {
            tracing::info!(pool = %existing.pool.name(), "replacing existing pool");
            existing.pool.close().await;
        }

        let config = request.provider.preset().with_hints(&request.hints);
        let options = request.effective_options();
        let factory = DriverConnectionFactory::new(
            request.driver.clone(),
            request.connection_string.clone(),
            options,
            request.session.clone(),
        );
        let pool = ConnectionPool::new(format!("CloudPool-{}", id), config, factory)?;

        match request.connect_timeout {
            Some(limit) => {
                if tokio::time::timeout(limit, pool.warm_up()).await.is_err() {
                    pool.close().await;
                    return Err(DbPortError::ConnectionTimeout(format!(
                        "opening pool '{}' timed out after {:?}",
                        pool.name(),
                        limit
                    )));
                }
            }
            None => {
                pool.warm_up().await;
            }
        }

        tracing::info!(
            pool = %pool.name(),
            max_size = pool.config().max_size(),
            min_idle = pool.config().min_idle(),
            "pool created"
        );

        self.pools.write().insert(
            id.to_string(),
            PoolEntry {
                pool,
                provider: request.provider,
            },
        );
        Ok(())
    }

    /// Lease a connection from the pool for `id`
    #[tracing::instrument(skip(self))]
    pub async fn acquire(&self, id: &str) -> Result<PooledConnection> {
        let entry = self
            .pools
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| DbPortError::NotFound(format!("no pool for connection '{}'", id)))?;

        let started = Instant::now();
        let result = entry.pool.get().await;
        let duration_ms = started.elapsed().as_millis() as u64;

        self.monitor
            .record_connection_attempt(entry.provider.name(), result.is_ok(), duration_ms);
        if let Err(e) = &result {
            tracing::warn!(error = %e, duration_ms, "pool acquire failed");
        }
        result
    }

    pub fn contains(&self, id: &str) -> bool {
        self.pools.read().contains_key(id)
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.pools.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn statistics(&self, id: &str) -> Option<PoolStats> {
        self.pools.read().get(id).map(|entry| entry.pool.stats())
    }

    pub fn all_statistics(&self) -> HashMap<String, PoolStats> {
        self.pools
            .read()
            .iter()
            .map(|(id, entry)| (id.clone(), entry.pool.stats()))
            .collect()
    }

    /// Close and forget the pool for `id`. Absent ids are a no-op.
    #[tracing::instrument(skip(self))]
    pub async fn close_pool(&self, id: &str) {
        let lock = self.lifecycle_lock(id);
        {
            let _guard = lock.lock().await;

            let entry = self.pools.write().remove(id);
            match entry {
                Some(entry) => {
                    entry.pool.close().await;
                    tracing::info!(pool = %entry.pool.name(), "pool closed");
                }
                None => tracing::debug!("no pool to close"),
            }
        }
        self.release_lifecycle_lock(id, lock);
    }

    pub async fn close_all(&self) {
        for id in self.ids() {
            self.close_pool(&id).await;
        }
    }
}

impl Default for PoolManager {
    fn default() -> Self {
        Self::new(Arc::new(dbport_core::NoopMonitor))
    }
}
