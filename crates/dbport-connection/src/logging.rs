//! Logging bootstrap for hosts embedding the connectivity engine
//!
//! Every crate logs through `tracing`; this only installs a subscriber.
//! `RUST_LOG` takes precedence over the configured filter.

use dbport_core::{DbPortError, Result};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::EngineSettings;

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is unset
    pub default_filter: String,
    /// JSON lines instead of human readable output
    pub json: bool,
    /// Whether to include file/line information in logs
    pub include_location: bool,
    /// Log span open/close events (async operation timing)
    pub enable_spans: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default_filter: "info,dbport_core=debug,dbport_drivers=debug,dbport_connection=debug"
                .to_string(),
            json: false,
            include_location: cfg!(debug_assertions),
            enable_spans: false,
        }
    }
}

impl LoggingConfig {
    /// Production configuration: JSON output, no locations
    pub fn production() -> Self {
        Self {
            default_filter: "warn,dbport_drivers=info,dbport_connection=info".to_string(),
            json: true,
            include_location: false,
            enable_spans: false,
        }
    }

    pub fn from_settings(settings: &EngineSettings) -> Self {
        Self {
            default_filter: settings.log_filter.clone(),
            json: settings.log_json,
            ..Self::default()
        }
    }
}

/// Install the global subscriber.
///
/// Fails if a global subscriber is already installed.
pub fn init(config: LoggingConfig) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.default_filter))
        .map_err(|e| DbPortError::Configuration(format!("invalid log filter: {}", e)))?;

    // NEW/CLOSE only; ENTER fires on every poll of an instrumented future
    let span_events = if config.enable_spans {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let layer = if config.json {
        fmt::layer()
            .with_target(true)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_span_events(span_events)
            .with_ansi(false)
            .json()
            .with_current_span(true)
            .with_filter(env_filter)
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_span_events(span_events)
            .with_filter(env_filter)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(layer)
        .try_init()
        .map_err(|e| DbPortError::Configuration(format!("logging already initialized: {}", e)))?;

    tracing::debug!(json = config.json, "logging initialized");
    Ok(())
}
