//! Resolved driver handles

use crate::BuiltinEngine;
use dbport_core::DatabaseDriver;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Where a resolved driver came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverOrigin {
    /// Linked into this build
    Builtin(BuiltinEngine),
    /// Opened from a shared library at runtime
    Custom {
        artifact_path: PathBuf,
        url_template: String,
    },
}

struct HandleInner {
    id: String,
    entry_point: String,
    driver: Arc<dyn DatabaseDriver>,
    origin: DriverOrigin,
}

/// A driver ready to open connections.
///
/// Cloning is cheap; clones share identity, which [`DriverHandle::same_as`]
/// compares.
#[derive(Clone)]
pub struct DriverHandle {
    inner: Arc<HandleInner>,
}

impl DriverHandle {
    pub(crate) fn builtin(engine: BuiltinEngine, driver: Arc<dyn DatabaseDriver>) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                id: engine.id().to_string(),
                entry_point: engine.entry_point().to_string(),
                driver,
                origin: DriverOrigin::Builtin(engine),
            }),
        }
    }

    pub(crate) fn custom(
        id: impl Into<String>,
        entry_point: impl Into<String>,
        driver: Arc<dyn DatabaseDriver>,
        artifact_path: PathBuf,
        url_template: impl Into<String>,
    ) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                id: id.into(),
                entry_point: entry_point.into(),
                driver,
                origin: DriverOrigin::Custom {
                    artifact_path,
                    url_template: url_template.into(),
                },
            }),
        }
    }

    /// Engine id for built-ins, descriptor id for custom drivers
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn entry_point(&self) -> &str {
        &self.inner.entry_point
    }

    pub fn driver(&self) -> &Arc<dyn DatabaseDriver> {
        &self.inner.driver
    }

    pub fn origin(&self) -> &DriverOrigin {
        &self.inner.origin
    }

    /// The built-in engine, if this is not a custom driver
    pub fn builtin_engine(&self) -> Option<BuiltinEngine> {
        match self.inner.origin {
            DriverOrigin::Builtin(engine) => Some(engine),
            DriverOrigin::Custom { .. } => None,
        }
    }

    /// The descriptor's connection string template, for custom drivers
    pub fn url_template(&self) -> Option<&str> {
        match &self.inner.origin {
            DriverOrigin::Builtin(_) => None,
            DriverOrigin::Custom { url_template, .. } => Some(url_template),
        }
    }

    pub fn is_custom(&self) -> bool {
        matches!(self.inner.origin, DriverOrigin::Custom { .. })
    }

    /// True when both handles come from the same resolution
    pub fn same_as(&self, other: &DriverHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for DriverHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverHandle")
            .field("id", &self.inner.id)
            .field("entry_point", &self.inner.entry_point)
            .field("driver", &self.inner.driver.name())
            .field("origin", &self.inner.origin)
            .finish()
    }
}
