//! Connection pool implementation

use std::collections::{HashMap, VecDeque};
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;

use async_trait::async_trait;
use dbport_core::{Connection, DbPortError, Result};
use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;

use super::config::PoolConfig;
use super::stats::PoolStats;

/// Factory trait for creating new connections
#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    /// Create a new connection
    async fn create(&self) -> Result<Arc<dyn Connection>>;

    /// Validate that a connection is still usable
    ///
    /// Default implementation only checks that it is not closed.
    async fn validate(&self, conn: &dyn Connection) -> bool {
        !conn.is_closed()
    }
}

#[async_trait]
impl<T: ConnectionFactory> ConnectionFactory for Arc<T> {
    async fn create(&self) -> Result<Arc<dyn Connection>> {
        (**self).create().await
    }

    async fn validate(&self, conn: &dyn Connection) -> bool {
        (**self).validate(conn).await
    }
}

/// Internal wrapper for pooled connections with metadata
struct PooledConnectionInner {
    connection: Arc<dyn Connection>,
    created_at: Instant,
    last_used_at: Instant,
}

impl PooledConnectionInner {
    fn new(connection: Arc<dyn Connection>) -> Self {
        let now = Instant::now();
        Self {
            connection,
            created_at: now,
            last_used_at: now,
        }
    }
}

/// A connection pool that manages a set of database connections
///
/// Leases are handed out as [`PooledConnection`]s and return to the idle
/// queue on drop. Closing the pool closes idle connections and every
/// connection still leased; those leases are discarded when dropped.
pub struct ConnectionPool {
    name: String,
    config: PoolConfig,
    factory: Arc<dyn ConnectionFactory>,
    /// Available idle connections
    idle: Mutex<VecDeque<PooledConnectionInner>>,
    /// Connections currently leased, by lease id
    leased: Mutex<HashMap<u64, Arc<dyn Connection>>>,
    next_lease: AtomicU64,
    /// Limits concurrent leases to `max_size`
    semaphore: Arc<Semaphore>,
    active_count: AtomicUsize,
    waiting_count: AtomicUsize,
    closed: AtomicBool,
}

impl ConnectionPool {
    /// Create a new connection pool with the given configuration and factory
    pub fn new<F: ConnectionFactory>(
        name: impl Into<String>,
        config: PoolConfig,
        factory: F,
    ) -> Result<Arc<Self>> {
        config.validate()?;
        let semaphore = Arc::new(Semaphore::new(config.max_size()));
        Ok(Arc::new(Self {
            name: name.into(),
            config,
            factory: Arc::new(factory),
            idle: Mutex::new(VecDeque::new()),
            leased: Mutex::new(HashMap::new()),
            next_lease: AtomicU64::new(1),
            semaphore,
            active_count: AtomicUsize::new(0),
            waiting_count: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Open `min_idle` connections up front. Failures are logged and the
    /// pool starts with whatever could be opened.
    pub async fn warm_up(&self) -> usize {
        let target = self.config.min_idle();
        let mut opened = 0;
        for _ in 0..target {
            match self.factory.create().await {
                Ok(connection) => {
                    self.idle
                        .lock()
                        .push_back(PooledConnectionInner::new(connection));
                    opened += 1;
                }
                Err(e) => {
                    tracing::warn!(pool = %self.name, error = %e, "pool warm-up stopped early");
                    break;
                }
            }
        }
        tracing::debug!(pool = %self.name, opened, target, "pool warmed up");
        opened
    }

    /// Get a connection from the pool
    ///
    /// This will:
    /// 1. Wait for a lease slot (at most `max_size` leases exist at once)
    /// 2. Hand out a valid idle connection if there is one
    /// 3. Otherwise open a new connection
    ///
    /// The whole sequence is bounded by the acquire timeout.
    pub async fn get(self: &Arc<Self>) -> Result<PooledConnection> {
        if self.is_closed() {
            return Err(DbPortError::AlreadyClosed(format!("pool '{}'", self.name)));
        }

        self.waiting_count.fetch_add(1, Ordering::SeqCst);

        let result = tokio::time::timeout(self.config.acquire_timeout(), async {
            let permit = self
                .semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| {
                    DbPortError::PoolExhausted(format!("pool '{}' is closing", self.name))
                })?;

            let inner = match self.try_get_idle().await {
                Some(inner) => inner,
                None => PooledConnectionInner::new(self.factory.create().await?),
            };

            Ok::<_, DbPortError>((permit, inner))
        })
        .await;

        self.waiting_count.fetch_sub(1, Ordering::SeqCst);

        let (permit, inner) = match result {
            Ok(acquired) => acquired?,
            Err(_) => {
                return Err(DbPortError::ConnectionTimeout(format!(
                    "timed out waiting for a connection from pool '{}' ({:?})",
                    self.name,
                    self.config.acquire_timeout()
                )));
            }
        };

        let lease_id = self.next_lease.fetch_add(1, Ordering::SeqCst);
        {
            let mut leased = self.leased.lock();
            if self.is_closed() {
                drop(leased);
                discard(inner.connection);
                return Err(DbPortError::PoolExhausted(format!(
                    "pool '{}' closed during acquire",
                    self.name
                )));
            }
            leased.insert(lease_id, inner.connection.clone());
            self.active_count.fetch_add(1, Ordering::SeqCst);
        }

        let leak_watch = self.config.leak_detection_threshold().map(|threshold| {
            let pool = self.name.clone();
            tokio::spawn(async move {
                tokio::time::sleep(threshold).await;
                tracing::warn!(
                    pool = %pool,
                    lease_id,
                    threshold_ms = threshold.as_millis() as u64,
                    "connection held past leak detection threshold"
                );
            })
        });

        Ok(PooledConnection {
            connection: inner.connection,
            created_at: inner.created_at,
            lease_id,
            pool: self.clone(),
            leak_watch,
            _permit: permit,
        })
    }

    /// Pop idle connections until one passes the lifetime, idle and
    /// validation checks
    async fn try_get_idle(&self) -> Option<PooledConnectionInner> {
        loop {
            let mut inner = { self.idle.lock().pop_front() }?;

            if let Some(max_lifetime) = self.config.max_lifetime()
                && inner.created_at.elapsed() > max_lifetime
            {
                self.retire(inner.connection, "max lifetime exceeded").await;
                continue;
            }

            if inner.last_used_at.elapsed() > self.config.idle_timeout() {
                self.retire(inner.connection, "idle timeout exceeded").await;
                continue;
            }

            if !self.is_valid(&*inner.connection).await {
                self.retire(inner.connection, "validation failed").await;
                continue;
            }

            inner.last_used_at = Instant::now();
            return Some(inner);
        }
    }

    /// Close an idle connection that will not be handed out again
    async fn retire(&self, connection: Arc<dyn Connection>, reason: &'static str) {
        tracing::debug!(pool = %self.name, reason, "retiring idle connection");
        if let Err(e) = connection.close().await {
            tracing::warn!(pool = %self.name, reason, error = %e, "failed to close retired connection");
        }
    }

    async fn is_valid(&self, conn: &dyn Connection) -> bool {
        if !self.factory.validate(conn).await {
            return false;
        }
        let Some(query) = self.config.validation_query() else {
            return true;
        };
        matches!(
            tokio::time::timeout(self.config.validation_timeout(), conn.validate(query)).await,
            Ok(Ok(()))
        )
    }

    /// Return a connection to the pool, or discard it if the pool closed
    fn return_connection(&self, lease_id: u64, inner: PooledConnectionInner) {
        let mut leased = self.leased.lock();
        leased.remove(&lease_id);
        self.active_count.fetch_sub(1, Ordering::SeqCst);

        if self.is_closed() || inner.connection.is_closed() {
            drop(leased);
            discard(inner.connection);
            return;
        }

        self.idle.lock().push_back(inner);
    }

    /// Get current pool statistics
    pub fn stats(&self) -> PoolStats {
        let idle = self.idle.lock().len();
        let active = self.active_count.load(Ordering::SeqCst);
        let waiting = self.waiting_count.load(Ordering::SeqCst);
        PoolStats::new(idle + active, idle, active, waiting)
    }

    /// Get the pool configuration
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Close the pool, including connections that are still leased.
    ///
    /// Waiters fail with `PoolExhausted`; later acquires fail with
    /// `AlreadyClosed`. Calling this more than once is a no-op.
    pub async fn close(&self) {
        let connections: Vec<Arc<dyn Connection>> = {
            let mut leased = self.leased.lock();
            if self.closed.swap(true, Ordering::SeqCst) {
                return;
            }
            self.semaphore.close();

            let mut all: Vec<_> = leased.drain().map(|(_, conn)| conn).collect();
            all.extend(self.idle.lock().drain(..).map(|inner| inner.connection));
            all
        };

        tracing::debug!(pool = %self.name, connections = connections.len(), "closing pool");
        for connection in connections {
            if let Err(e) = connection.close().await {
                tracing::warn!(pool = %self.name, error = %e, "failed to close pooled connection");
            }
        }
    }
}

/// Close a connection that is not going back to the pool
fn discard(connection: Arc<dyn Connection>) {
    if connection.is_closed() {
        return;
    }
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move {
                if let Err(e) = connection.close().await {
                    tracing::warn!(error = %e, "failed to close discarded connection");
                }
            });
        }
        Err(_) => tracing::debug!("no runtime to close discarded connection, dropping it"),
    }
}

/// A connection leased from the pool
///
/// When dropped, the connection is returned to the pool.
pub struct PooledConnection {
    connection: Arc<dyn Connection>,
    created_at: Instant,
    lease_id: u64,
    pool: Arc<ConnectionPool>,
    leak_watch: Option<JoinHandle<()>>,
    _permit: OwnedSemaphorePermit,
}

impl Deref for PooledConnection {
    type Target = dyn Connection;

    fn deref(&self) -> &Self::Target {
        self.connection.as_ref()
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(watch) = self.leak_watch.take() {
            watch.abort();
        }
        self.pool.return_connection(
            self.lease_id,
            PooledConnectionInner {
                connection: self.connection.clone(),
                created_at: self.created_at,
                last_used_at: Instant::now(),
            },
        );
    }
}

impl PooledConnection {
    /// Get the underlying connection as an Arc
    pub fn inner(&self) -> &Arc<dyn Connection> {
        &self.connection
    }

    /// Name of the pool this lease belongs to
    pub fn pool_name(&self) -> &str {
        self.pool.name()
    }
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("pool", &self.pool.name())
            .field("lease_id", &self.lease_id)
            .field("driver", &self.connection.driver_name())
            .finish()
    }
}
