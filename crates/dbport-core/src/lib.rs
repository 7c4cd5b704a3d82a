//! dbport core - shared abstractions for the connectivity layer
//!
//! This crate defines the types every other dbport crate depends on:
//!
//! - `DatabaseDriver` - capability implemented by built-in and plugin drivers
//! - `Connection` - a live connection handed out by a driver
//! - `ConnectionProfile` / `DriverDescriptor` - the inputs to a connect request
//! - `ConnectionOptions` - the property set a driver receives alongside its URL
//! - collaborator traits for descriptor lookup, credentials and monitoring
//! - the plugin ABI used by dynamically loaded driver libraries

mod collaborators;
mod connection;
mod descriptor;
mod driver;
mod error;
mod options;
pub mod plugin;
mod profile;
pub mod security;

pub use collaborators::*;
pub use connection::*;
pub use descriptor::*;
pub use driver::*;
pub use error::*;
pub use options::*;
pub use plugin::DRIVER_ABI_VERSION;
pub use profile::*;
pub use security::*;

#[doc(hidden)]
pub mod __private {
    pub use paste::paste;
}
