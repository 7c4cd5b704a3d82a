//! PostgreSQL driver implementation

mod connection;
mod driver;
mod tls;

pub use connection::PostgresConnection;
pub use driver::{PostgresDriver, PostgresTarget};
pub use tls::{PostgresTlsConnector, TlsError, tls_config_from_options};
