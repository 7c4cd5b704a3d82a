//! Engine settings loaded from TOML

use std::path::{Path, PathBuf};

use dbport_core::{DbPortError, Result};
use serde::{Deserialize, Serialize};

use crate::pool::ProviderProfile;


/// Settings for a [`ConnectivityEngine`](crate::ConnectivityEngine)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Directory that relative driver artifact paths are resolved against
    pub drivers_dir: PathBuf,
    /// Provider preset used when a profile names none
    pub default_provider: ProviderProfile,
    /// Acquire timeout applied to pools whose profile sets none
    pub acquire_timeout_ms: Option<u64>,
    /// `tracing` filter used when `RUST_LOG` is unset
    pub log_filter: String,
    /// Emit JSON log lines instead of human readable ones
    pub log_json: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            drivers_dir: default_drivers_dir(),
            default_provider: ProviderProfile::Default,
            acquire_timeout_ms: None,
            log_filter: "info,dbport_core=info,dbport_drivers=info,dbport_connection=info"
                .to_string(),
            log_json: false,
        }
    }
}

/// `<data dir>/dbport/drivers`, or `./drivers` when the platform has no data dir
pub fn default_drivers_dir() -> PathBuf {
    dirs::data_dir()
        .map(|p| p.join("dbport"))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("drivers")
}

/// `<config dir>/dbport/settings.toml`
pub fn default_settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("dbport").join("settings.toml"))
}

impl EngineSettings {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| DbPortError::Configuration(format!("invalid settings: {}", e)))
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| DbPortError::Configuration(format!("cannot serialize settings: {}", e)))
    }

    /// Load settings from `path`; a missing file yields the defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "settings file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let settings = Self::from_toml_str(&content)?;
        tracing::info!(path = %path.display(), "settings loaded");
        Ok(settings)
    }

    /// Resolve a driver artifact path; relative paths live under `drivers_dir`
    pub fn resolve_artifact(&self, artifact: &Path) -> PathBuf {
        if artifact.is_absolute() {
            artifact.to_path_buf()
        } else {
            self.drivers_dir.join(artifact)
        }
    }
}
