//! dbport connection - connection management and pooling
//!
//! This crate turns connection profiles into live connections:
//!
//! - [`params`] builds connection strings and driver option sets
//! - [`pool`] owns one connection pool per connection id
//! - [`registry`] tracks ad-hoc (unpooled) connections
//! - [`ConnectivityEngine`] ties them to the driver registry
//!
//! Settings are read from TOML and [`logging`] installs a `tracing`
//! subscriber for hosts that do not bring their own.

mod engine;
mod factory;
pub mod logging;
pub mod params;
pub mod pool;
pub mod registry;
mod settings;

pub use engine::{ConnectMode, ConnectivityEngine, ConnectivityEngineBuilder};
pub use factory::DriverConnectionFactory;
pub use params::{
    UrlTarget, apply_session_settings, build_connection_options,
    build_connection_options_with_credentials, build_connection_string,
};
pub use pool::{
    ConnectionFactory, ConnectionPool, PoolConfig, PoolManager, PoolRequest, PoolStats,
    PooledConnection, ProviderProfile,
};
pub use registry::ConnectionRegistry;
pub use settings::{EngineSettings, default_drivers_dir, default_settings_path};
