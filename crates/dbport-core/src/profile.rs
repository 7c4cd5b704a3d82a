//! Connection profiles supplied with each connect request

use crate::TlsConfig;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Username/password pair
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            password: Some(password.into()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.username.is_none() && self.password.is_none()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

/// TLS request attached to a profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsSettings {
    /// Whether TLS was requested at all
    pub enabled: bool,
    #[serde(flatten)]
    pub config: TlsConfig,
}

impl Default for TlsSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            config: TlsConfig::default(),
        }
    }
}

impl TlsSettings {
    /// TLS enabled with the given configuration
    pub fn enabled(config: TlsConfig) -> Self {
        Self {
            enabled: true,
            config,
        }
    }
}

/// Network timeouts, in seconds. Zero disables the timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub connect_secs: u64,
    pub socket_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect_secs: 30,
            socket_secs: 0,
        }
    }
}

impl Timeouts {
    pub fn connect(&self) -> Option<Duration> {
        (self.connect_secs > 0).then(|| Duration::from_secs(self.connect_secs))
    }

    pub fn socket(&self) -> Option<Duration> {
        (self.socket_secs > 0).then(|| Duration::from_secs(self.socket_secs))
    }
}

/// Pool sizing hints. Each field that is set overrides the matching field of
/// the provider preset; unset fields keep the preset value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolHints {
    pub max_size: Option<usize>,
    pub min_idle: Option<usize>,
    pub acquire_timeout_ms: Option<u64>,
    pub idle_timeout_secs: Option<u64>,
    pub max_lifetime_secs: Option<u64>,
}

/// Settings applied to a raw connection right after it is opened
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub auto_commit: bool,
    pub read_only: bool,
    /// Isolation level name; see `IsolationLevel::from_name`
    pub isolation: Option<String>,
    pub default_schema: Option<String>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            auto_commit: true,
            read_only: false,
            isolation: Some("READ_COMMITTED".to_string()),
            default_schema: None,
        }
    }
}

/// Everything needed to open a connection to one target.
///
/// Profiles are supplied per request and never retained by the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionProfile {
    /// Connection identifier; generated when absent
    pub id: Option<String>,
    /// Engine id (e.g. "postgresql", "sqlite")
    pub engine: String,
    /// Custom driver to use instead of the built-in engine driver
    pub custom_driver_id: Option<String>,
    pub host: String,
    pub port: u16,
    /// Database name, or file path for embedded engines
    pub database: String,
    pub credentials: Option<Credentials>,
    pub tls: TlsSettings,
    pub timeouts: Timeouts,
    pub pool: PoolHints,
    pub session: SessionSettings,
    /// Provider preset name used when pooling ("aws", "azure", "gcp", ...)
    pub provider: Option<String>,
    pub auto_reconnect: bool,
    /// Extra URL parameters; also used to fill custom template placeholders
    pub params: IndexMap<String, String>,
    /// Driver properties merged last into the option set
    pub custom_properties: IndexMap<String, String>,
}

impl Default for ConnectionProfile {
    fn default() -> Self {
        Self {
            id: None,
            engine: String::new(),
            custom_driver_id: None,
            host: "localhost".to_string(),
            port: 0,
            database: String::new(),
            credentials: None,
            tls: TlsSettings::default(),
            timeouts: Timeouts::default(),
            pool: PoolHints::default(),
            session: SessionSettings::default(),
            provider: None,
            auto_reconnect: true,
            params: IndexMap::new(),
            custom_properties: IndexMap::new(),
        }
    }
}

impl ConnectionProfile {
    /// Profile for a server engine
    pub fn new(engine: &str, host: &str, port: u16, database: &str) -> Self {
        Self {
            engine: engine.to_string(),
            host: host.to_string(),
            port,
            database: database.to_string(),
            ..Self::default()
        }
    }

    /// Profile for a file-based engine
    pub fn embedded(engine: &str, path: &str) -> Self {
        Self {
            engine: engine.to_string(),
            host: String::new(),
            database: path.to_string(),
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_custom_driver(mut self, driver_id: impl Into<String>) -> Self {
        self.custom_driver_id = Some(driver_id.into());
        self
    }

    pub fn with_credentials(mut self, username: &str, password: &str) -> Self {
        self.credentials = Some(Credentials::new(username, password));
        self
    }

    pub fn with_tls(mut self, config: TlsConfig) -> Self {
        self.tls = TlsSettings::enabled(config);
        self
    }

    pub fn with_param(mut self, key: &str, value: &str) -> Self {
        self.params.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_property(mut self, key: &str, value: &str) -> Self {
        self.custom_properties
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_provider(mut self, provider: &str) -> Self {
        self.provider = Some(provider.to_string());
        self
    }

    pub fn with_pool_hints(mut self, hints: PoolHints) -> Self {
        self.pool = hints;
        self
    }

    pub fn with_session(mut self, session: SessionSettings) -> Self {
        self.session = session;
        self
    }

    /// Normalized engine id
    pub fn engine_id(&self) -> String {
        self.engine.trim().to_lowercase()
    }
}
