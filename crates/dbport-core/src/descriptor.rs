//! Custom driver descriptors

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Description of a user-supplied driver library.
///
/// Created when an operator uploads a driver and stored by the persistence
/// layer. The registry only reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverDescriptor {
    /// Unique identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Path to the shared library implementing the driver
    pub artifact_path: PathBuf,
    /// Exported constructor symbol inside the library
    pub entry_point: String,
    /// Connection string template with `{placeholder}` tokens
    pub url_template: String,
}

impl DriverDescriptor {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        artifact_path: impl Into<PathBuf>,
        entry_point: impl Into<String>,
        url_template: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            artifact_path: artifact_path.into(),
            entry_point: entry_point.into(),
            url_template: url_template.into(),
        }
    }
}
