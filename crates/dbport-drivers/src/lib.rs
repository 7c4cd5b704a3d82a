//! dbport drivers - driver resolution and loading
//!
//! Resolves engine ids and custom driver descriptors to a [`DriverHandle`].
//! Built-in engines are compiled in behind cargo features; custom drivers are
//! shared libraries opened at runtime, each in its own library namespace.

#[cfg(feature = "mysql")]
pub use dbport_driver_mysql as mysql;
#[cfg(feature = "postgres")]
pub use dbport_driver_postgres as postgres;
#[cfg(feature = "sqlite")]
pub use dbport_driver_sqlite as sqlite;

mod adapter;
mod builtin;
mod handle;
mod loader;
mod registry;

pub use adapter::{AdaptedConnection, DriverAdapter};
pub use builtin::{BuiltinEngine, EngineFamily};
pub use handle::{DriverHandle, DriverOrigin};
pub use loader::{DriverLoader, NativeLibraryLoader};
pub use registry::DriverRegistry;

/// Re-export commonly used types from dbport-core
pub use dbport_core::{
    Connection, ConnectionOptions, DatabaseDriver, DbPortError, DriverDescriptor, Result,
};
