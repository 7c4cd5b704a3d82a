//! MySQL/MariaDB driver implementation

mod connection;
mod driver;
mod tls;

pub use connection::MySqlConnection;
pub use driver::{MySqlDriver, MySqlTarget};
pub use tls::{MysqlTlsConnector, MysqlTlsError, tls_config_from_options};
