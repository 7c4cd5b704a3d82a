//! ABI shared between the driver registry and dynamically loaded drivers
//!
//! A driver library exports two C symbols per driver:
//!
//! - `<entry>`: constructor returning a `Box<Box<dyn DatabaseDriver>>` as an
//!   opaque pointer
//! - `<entry>_abi_version`: returns the `DRIVER_ABI_VERSION` the library was
//!   built against
//!
//! Both are generated by [`export_driver!`](crate::export_driver). The library
//! must be built with the same compiler and `dbport-core` version as the host;
//! the version check rejects libraries built against another interface.
//!
//! Driver libraries do not share the host's async runtime state. Drivers that
//! need Tokio should own a runtime, as the built-in network drivers do.
//!
//! ```ignore
//! struct AcmeDriver;
//! // impl DatabaseDriver for AcmeDriver { ... }
//!
//! dbport_core::export_driver!(acme_driver, AcmeDriver);
//! ```

use std::ffi::c_void;

/// Version of the driver interface. Bump on any change to `DatabaseDriver`,
/// `Connection` or the types they exchange.
pub const DRIVER_ABI_VERSION: u32 = 1;

/// Suffix appended to the entry point to name the version symbol
pub const ABI_VERSION_SUFFIX: &str = "_abi_version";

/// Signature of the exported driver constructor
pub type DriverConstructor = unsafe extern "C" fn() -> *mut c_void;

/// Signature of the exported ABI version function
pub type AbiVersionFn = unsafe extern "C" fn() -> u32;

/// Name of the version symbol for an entry point
pub fn abi_version_symbol(entry_point: &str) -> String {
    format!("{}{}", entry_point, ABI_VERSION_SUFFIX)
}

/// Export a driver from a `cdylib` under the given entry point name.
#[macro_export]
macro_rules! export_driver {
    ($entry:ident, $ctor:expr) => {
        $crate::__private::paste! {
            #[unsafe(no_mangle)]
            pub extern "C" fn $entry() -> *mut ::std::ffi::c_void {
                let driver: ::std::boxed::Box<dyn $crate::DatabaseDriver> =
                    ::std::boxed::Box::new($ctor);
                ::std::boxed::Box::into_raw(::std::boxed::Box::new(driver)) as *mut ::std::ffi::c_void
            }

            #[unsafe(no_mangle)]
            pub extern "C" fn [<$entry _abi_version>]() -> u32 {
                $crate::DRIVER_ABI_VERSION
            }
        }
    };
}
