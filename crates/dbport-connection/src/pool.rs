//! Connection pooling
//!
//! One [`ConnectionPool`] per connection id, owned by the [`PoolManager`].
//! Pools are tuned from a [`ProviderProfile`] preset with per-connection
//! overrides, and connections go back to the pool when a lease is dropped.
//!
//! # Example
//!
//! ```ignore
//! use dbport_connection::pool::{PoolManager, PoolRequest, ProviderProfile};
//!
//! let manager = PoolManager::new(monitor);
//! manager.create_pool("orders", request).await?;
//! let conn = manager.acquire("orders").await?;
//! conn.execute("UPDATE orders SET state = 'sent'").await?;
//! // returned to the pool on drop
//! ```

mod config;
mod manager;
mod pool;
mod stats;


pub use config::{PoolConfig, ProviderProfile};
pub use manager::{PoolManager, PoolRequest};
pub use pool::{ConnectionFactory, ConnectionPool, PooledConnection};
pub use stats::PoolStats;
