//! Pool configuration and provider presets

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use dbport_core::{ConnectionOptions, DbPortError, PoolHints, Result};
use serde::{Deserialize, Serialize};

/// Configuration for a connection pool
///
/// Controls pool sizing, timeouts, validation and connection lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Connections opened when the pool is created
    min_idle: usize,
    /// Maximum number of connections leased at once
    max_size: usize,
    /// Timeout in milliseconds when acquiring a connection from the pool
    acquire_timeout_ms: u64,
    /// Timeout in milliseconds before an idle connection is closed
    idle_timeout_ms: u64,
    /// Maximum lifetime of a connection in milliseconds before it's recycled
    max_lifetime_ms: Option<u64>,
    /// Query run against idle connections before they are handed out
    validation_query: Option<String>,
    validation_timeout_ms: u64,
    /// Leases held longer than this are reported
    leak_detection_threshold_ms: Option<u64>,
}

impl PoolConfig {
    /// Create a new pool configuration with the given sizes.
    ///
    /// `min_idle` is capped at `max_size`; a zero `max_size` is rejected by
    /// [`PoolConfig::validate`].
    pub fn new(min_idle: usize, max_size: usize) -> Self {
        Self {
            min_idle: min_idle.min(max_size),
            max_size,
            acquire_timeout_ms: 30_000,
            idle_timeout_ms: 600_000,
            max_lifetime_ms: Some(1_800_000),
            validation_query: Some("SELECT 1".to_string()),
            validation_timeout_ms: 5_000,
            leak_detection_threshold_ms: Some(60_000),
        }
    }

    pub fn with_acquire_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.acquire_timeout_ms = timeout_ms;
        self
    }

    pub fn with_idle_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.idle_timeout_ms = timeout_ms;
        self
    }

    pub fn with_max_lifetime_ms(mut self, lifetime_ms: Option<u64>) -> Self {
        self.max_lifetime_ms = lifetime_ms;
        self
    }

    pub fn with_validation_query(mut self, query: Option<&str>) -> Self {
        self.validation_query = query.map(str::to_string);
        self
    }

    pub fn with_validation_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.validation_timeout_ms = timeout_ms;
        self
    }

    pub fn with_leak_detection_threshold_ms(mut self, threshold_ms: Option<u64>) -> Self {
        self.leak_detection_threshold_ms = threshold_ms;
        self
    }

    /// Override preset fields with the caller's hints; unset hints keep the
    /// preset. A preset `min_idle` above a smaller hinted `max_size` is
    /// lowered to it.
    pub fn with_hints(mut self, hints: &PoolHints) -> Self {
        if let Some(max_size) = hints.max_size {
            self.max_size = max_size;
        }
        if let Some(min_idle) = hints.min_idle {
            self.min_idle = min_idle;
        }
        if let Some(ms) = hints.acquire_timeout_ms {
            self.acquire_timeout_ms = ms;
        }
        if let Some(secs) = hints.idle_timeout_secs {
            self.idle_timeout_ms = secs * 1000;
        }
        if let Some(secs) = hints.max_lifetime_secs {
            self.max_lifetime_ms = (secs > 0).then_some(secs * 1000);
        }
        self.min_idle = self.min_idle.min(self.max_size);
        self
    }

    /// Reject configurations a pool cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.max_size == 0 {
            return Err(DbPortError::Configuration(
                "max_size must be greater than 0".into(),
            ));
        }
        if self.acquire_timeout_ms == 0 {
            return Err(DbPortError::Configuration(
                "acquire timeout must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Connections kept open at creation, never more than `max_size`
    pub fn min_idle(&self) -> usize {
        self.min_idle.min(self.max_size)
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn max_lifetime(&self) -> Option<Duration> {
        self.max_lifetime_ms.map(Duration::from_millis)
    }

    pub fn validation_query(&self) -> Option<&str> {
        self.validation_query.as_deref()
    }

    pub fn validation_timeout(&self) -> Duration {
        Duration::from_millis(self.validation_timeout_ms)
    }

    pub fn leak_detection_threshold(&self) -> Option<Duration> {
        self.leak_detection_threshold_ms.map(Duration::from_millis)
    }
}

impl Default for PoolConfig {
    /// 2 idle / 10 max, 30 s acquire, 10 min idle, 30 min lifetime
    fn default() -> Self {
        Self::new(2, 10)
    }
}

/// Hosting provider whose pool tuning and connection properties apply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderProfile {
    Aws,
    Azure,
    Gcp,
    #[default]
    Default,
}

impl ProviderProfile {
    /// Map a provider name onto a profile; unknown names use the default preset
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "aws" => Self::Aws,
            "azure" => Self::Azure,
            "gcp" => Self::Gcp,
            _ => Self::Default,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Aws => "aws",
            Self::Azure => "azure",
            Self::Gcp => "gcp",
            Self::Default => "default",
        }
    }

    /// Pool tuning for this provider
    pub fn preset(&self) -> PoolConfig {
        match self {
            Self::Aws => PoolConfig::new(5, 20),
            Self::Azure => PoolConfig::new(3, 15)
                .with_idle_timeout_ms(300_000)
                .with_max_lifetime_ms(Some(1_200_000)),
            Self::Gcp => PoolConfig::new(5, 25),
            Self::Default => PoolConfig::new(2, 10),
        }
    }

    /// Provider connection properties.
    ///
    /// `caller` is consulted for the provider auth switches (`useIAM`,
    /// `useAzureAD`); the caller's options are merged on top afterwards.
    pub fn connection_properties(&self, caller: &ConnectionOptions) -> ConnectionOptions {
        let mut props = ConnectionOptions::new();
        match self {
            Self::Aws => {
                props
                    .set("useSSL", "true")
                    .set("requireSSL", "true")
                    .set("verifyServerCertificate", "true");
                if caller.get_bool("useIAM").unwrap_or(false) {
                    props.set("useAWSIAM", "true");
                }
            }
            Self::Azure => {
                props
                    .set("encrypt", "true")
                    .set("trustServerCertificate", "false")
                    .set("hostNameInCertificate", "*.database.windows.net")
                    .set("loginTimeout", "30");
                if caller.get_bool("useAzureAD").unwrap_or(false) {
                    props.set("authentication", "ActiveDirectoryPassword");
                }
            }
            Self::Gcp => {
                props.set("sslmode", "require");
            }
            Self::Default => {}
        }
        props
    }
}

impl fmt::Display for ProviderProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ProviderProfile {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self::from_name(s))
    }
}
