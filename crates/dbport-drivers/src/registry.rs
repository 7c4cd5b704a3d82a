//! Driver registry resolving engine ids and custom descriptors to drivers

use crate::{BuiltinEngine, DriverHandle, DriverLoader, NativeLibraryLoader};
use dbport_core::{DatabaseDriver, DbPortError, DriverDescriptor, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;


/// Registry of built-in and dynamically loaded drivers.
///
/// Built-in drivers are registered up front. Custom drivers are loaded on
/// first resolution and cached by descriptor id; concurrent resolutions of
/// the same id share one load, while different ids load in parallel.
pub struct DriverRegistry {
    builtins: HashMap<BuiltinEngine, DriverHandle>,
    /// One slot per custom driver id. The map lock is only held to find the
    /// slot, never across a load.
    custom: Mutex<HashMap<String, Arc<OnceCell<DriverHandle>>>>,
    loader: Arc<dyn DriverLoader>,
}

impl DriverRegistry {
    /// Create a registry with no built-in drivers
    pub fn new(loader: Arc<dyn DriverLoader>) -> Self {
        Self {
            builtins: HashMap::new(),
            custom: Mutex::new(HashMap::new()),
            loader,
        }
    }

    /// Create a registry with all built-in drivers of this build registered
    pub fn with_defaults() -> Self {
        #[allow(unused_mut)]
        let mut registry = Self::new(Arc::new(NativeLibraryLoader::new()));

        #[cfg(feature = "sqlite")]
        registry.register_builtin(
            BuiltinEngine::Sqlite,
            Arc::new(crate::sqlite::SqliteDriver::new()),
        );
        #[cfg(feature = "postgres")]
        registry.register_builtin(
            BuiltinEngine::Postgres,
            Arc::new(crate::postgres::PostgresDriver::new()),
        );
        #[cfg(feature = "mysql")]
        {
            registry.register_builtin(
                BuiltinEngine::MySql,
                Arc::new(crate::mysql::MySqlDriver::new()),
            );
            registry.register_builtin(
                BuiltinEngine::MariaDb,
                Arc::new(crate::mysql::MySqlDriver::mariadb()),
            );
        }

        registry
    }

    /// Link a driver implementation to a built-in engine
    pub fn register_builtin(&mut self, engine: BuiltinEngine, driver: Arc<dyn DatabaseDriver>) {
        tracing::info!(engine = %engine, driver = %driver.name(), "registering built-in driver");
        self.builtins
            .insert(engine, DriverHandle::builtin(engine, driver));
    }

    /// Resolve a built-in engine id
    pub fn resolve_builtin(&self, engine_id: &str) -> Result<DriverHandle> {
        let engine = BuiltinEngine::from_id(engine_id)?;
        self.builtins.get(&engine).cloned().ok_or_else(|| {
            tracing::warn!(engine = %engine, "engine has no driver linked into this build");
            DbPortError::driver_load(
                engine.id(),
                format!(
                    "no driver for engine '{}' is linked into this build (entry point '{}')",
                    engine,
                    engine.entry_point()
                ),
            )
        })
    }

    /// Resolve a custom driver, loading it on first use.
    ///
    /// A cached handle is returned unchanged, even if `descriptor` differs from
    /// the one it was loaded from; call [`forget`](Self::forget) first to reload.
    /// A failed load caches nothing.
    #[tracing::instrument(skip(self, descriptor), fields(driver_id = %descriptor.id))]
    pub async fn resolve_custom(&self, descriptor: &DriverDescriptor) -> Result<DriverHandle> {
        let slot = {
            let mut custom = self.custom.lock();
            Arc::clone(custom.entry(descriptor.id.clone()).or_default())
        };

        let handle = slot
            .get_or_try_init(|| self.load(descriptor.clone()))
            .await?;
        Ok(handle.clone())
    }

    async fn load(&self, descriptor: DriverDescriptor) -> Result<DriverHandle> {
        let id = descriptor.id.clone();
        let loader = Arc::clone(&self.loader);

        tracing::info!(
            driver_id = %id,
            artifact = %descriptor.artifact_path.display(),
            entry_point = %descriptor.entry_point,
            "loading custom driver"
        );

        let (descriptor, loaded) = tokio::task::spawn_blocking(move || {
            let loaded = loader.load(&descriptor);
            (descriptor, loaded)
        })
        .await
        .map_err(|e| DbPortError::driver_load(id.as_str(), e.to_string()))?;

        let driver = loaded.inspect_err(|e| {
            tracing::error!(driver_id = %id, error = %e, "custom driver load failed");
        })?;

        Ok(DriverHandle::custom(
            descriptor.id,
            descriptor.entry_point,
            driver,
            descriptor.artifact_path,
            descriptor.url_template,
        ))
    }

    /// Drop the cached handle for a custom driver.
    ///
    /// Connections already opened through it keep working. Returns whether a
    /// loaded driver was cached under `id`.
    pub fn forget(&self, id: &str) -> bool {
        let removed = self.custom.lock().remove(id);
        let was_loaded = removed.is_some_and(|slot| slot.initialized());
        if was_loaded {
            tracing::info!(driver_id = %id, "forgot custom driver");
        }
        was_loaded
    }

    /// Whether a custom driver is loaded under `id`
    pub fn is_loaded(&self, id: &str) -> bool {
        self.custom
            .lock()
            .get(id)
            .is_some_and(|slot| slot.initialized())
    }

    /// Ids of all loaded custom drivers
    pub fn loaded_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .custom
            .lock()
            .iter()
            .filter(|(_, slot)| slot.initialized())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Built-in engines with a driver linked into this build
    pub fn supported_engines(&self) -> Vec<BuiltinEngine> {
        BuiltinEngine::ALL
            .into_iter()
            .filter(|engine| self.builtins.contains_key(engine))
            .collect()
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
