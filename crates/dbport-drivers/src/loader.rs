//! Loading driver implementations from artifacts

use crate::adapter::DriverAdapter;
use dbport_core::plugin::{AbiVersionFn, DriverConstructor, abi_version_symbol};
use dbport_core::{DRIVER_ABI_VERSION, DatabaseDriver, DbPortError, DriverDescriptor, Result};
use libloading::Library;
use std::sync::Arc;

/// Turns a descriptor into a driver instance.
///
/// Loading is blocking; the registry runs it on the blocking thread pool.
pub trait DriverLoader: Send + Sync {
    fn load(&self, descriptor: &DriverDescriptor) -> Result<Arc<dyn DatabaseDriver>>;
}

/// Loads drivers from native shared libraries exporting the dbport driver ABI.
///
/// Each library is opened with local symbol binding, so two driver libraries
/// exporting the same symbols never resolve against each other.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeLibraryLoader;

impl NativeLibraryLoader {
    pub fn new() -> Self {
        Self
    }
}

impl DriverLoader for NativeLibraryLoader {
    fn load(&self, descriptor: &DriverDescriptor) -> Result<Arc<dyn DatabaseDriver>> {
        let id = descriptor.id.as_str();
        let path = &descriptor.artifact_path;

        if !path.is_file() {
            return Err(DbPortError::driver_load(
                id,
                std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("driver artifact not found: {}", path.display()),
                ),
            ));
        }

        tracing::debug!(driver_id = %id, path = %path.display(), "opening driver library");

        // SAFETY: opening a library runs its initialisers. Artifacts are
        // supplied by the operator and trusted to the same degree as the host.
        let library = unsafe { Library::new(path) }.map_err(|e| DbPortError::driver_load(id, e))?;

        let version_symbol = abi_version_symbol(&descriptor.entry_point);
        // SAFETY: the symbol type matches what `export_driver!` generates
        let version = unsafe {
            let version_fn = library
                .get::<AbiVersionFn>(version_symbol.as_bytes())
                .map_err(|e| DbPortError::driver_load(id, e))?;
            version_fn()
        };
        if version != DRIVER_ABI_VERSION {
            return Err(DbPortError::driver_load(
                id,
                format!(
                    "incompatible driver interface: library built for version {}, host expects {}",
                    version, DRIVER_ABI_VERSION
                ),
            ));
        }

        // SAFETY: the version check above guarantees the constructor was
        // generated by `export_driver!` against this interface
        let raw = unsafe {
            let constructor = library
                .get::<DriverConstructor>(descriptor.entry_point.as_bytes())
                .map_err(|e| DbPortError::driver_load(id, e))?;
            constructor()
        };
        if raw.is_null() {
            return Err(DbPortError::driver_load(
                id,
                format!("entry point '{}' returned no driver", descriptor.entry_point),
            ));
        }

        // SAFETY: `export_driver!` returns a leaked `Box<Box<dyn DatabaseDriver>>`
        let driver = unsafe { Box::from_raw(raw as *mut Box<dyn DatabaseDriver>) };

        tracing::info!(
            driver_id = %id,
            driver = %driver.name(),
            version = %driver.version(),
            "loaded driver library"
        );

        Ok(Arc::new(DriverAdapter::new(*driver, Arc::new(library))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn descriptor(path: std::path::PathBuf) -> DriverDescriptor {
        DriverDescriptor::new("acme", "Acme", path, "acme_driver", "acme://{host}")
    }

    #[test]
    fn test_missing_artifact_is_a_load_failure() {
        let dir = tempfile::tempdir().unwrap();
        let err = NativeLibraryLoader::new()
            .load(&descriptor(dir.path().join("absent.so")))
            .err()
            .unwrap();

        match err {
            DbPortError::DriverLoad { driver_id, source } => {
                assert_eq!(driver_id, "acme");
                assert!(source.to_string().contains("absent.so"));
            }
            other => panic!("expected DriverLoad, got {:?}", other),
        }
    }

    #[test]
    fn test_corrupt_artifact_is_a_load_failure() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"definitely not a shared library").unwrap();

        let err = NativeLibraryLoader::new()
            .load(&descriptor(file.path().to_path_buf()))
            .err()
            .unwrap();
        assert!(matches!(err, DbPortError::DriverLoad { .. }));
    }
}
