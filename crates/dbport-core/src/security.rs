//! Security-related configuration for database connections

mod tls_config;

pub use tls_config::*;
