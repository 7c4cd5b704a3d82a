//! PostgreSQL TLS support
//!
//! Turns the `ssl*` connection options into a [`TlsConfig`] and builds the
//! native-tls connector tokio-postgres uses.

use dbport_core::security::{TlsConfig, TlsMode};
use dbport_core::{ConnectionOptions, DbPortError};
use native_tls::{Certificate, Identity, TlsConnector as NativeTlsConnector, TlsConnectorBuilder};
use postgres_native_tls::MakeTlsConnector;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Error types for TLS operations
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("Failed to load CA certificate from {path}: {source}")]
    CaCertLoadFailed {
        path: String,
        source: std::io::Error,
    },

    #[error("Invalid CA certificate format: {0}")]
    InvalidCaCert(String),

    #[error("Failed to load client certificate from {path}: {source}")]
    ClientCertLoadFailed {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to load client key from {path}: {source}")]
    ClientKeyLoadFailed {
        path: String,
        source: std::io::Error,
    },

    #[error("Invalid client identity (cert + key): {0}")]
    InvalidClientIdentity(String),

    #[error("TLS configuration error: {0}")]
    ConfigurationError(String),

    #[error("TLS mode {mode:?} is not supported for this operation")]
    UnsupportedMode { mode: TlsMode },
}

impl From<TlsError> for DbPortError {
    fn from(err: TlsError) -> Self {
        DbPortError::Connection(err.to_string())
    }
}

/// Read the TLS settings out of a connection option set.
///
/// `sslmode` wins over the `ssl` flag. Without either, TLS is disabled.
/// As with libpq, only the verify modes or an explicit `sslrootcert` turn on
/// certificate verification.
pub fn tls_config_from_options(options: &ConnectionOptions) -> dbport_core::Result<TlsConfig> {
    let mode = match options.get("sslmode") {
        Some(mode) => mode.parse::<TlsMode>()?,
        None if options.get_bool("ssl") == Some(true) => TlsMode::Prefer,
        None => TlsMode::Disable,
    };

    let mut config = TlsConfig::new(mode);
    if let Some(root) = options.get("sslrootcert") {
        config = config.ca_cert(root);
    }
    if let (Some(cert), Some(key)) = (options.get("sslcert"), options.get("sslkey")) {
        config = config.client_cert(cert, key);
    }
    let verify = mode.requires_ca_verification() || config.ca_cert.is_some();
    Ok(config.verify_server(verify))
}

/// Builds TLS connectors for tokio-postgres from a [`TlsConfig`]
#[derive(Debug, Clone)]
pub struct PostgresTlsConnector;

impl PostgresTlsConnector {
    /// Build a TLS connector from configuration.
    ///
    /// Fails for `Disable`; connect with `NoTls` instead.
    pub fn build(config: &TlsConfig) -> Result<MakeTlsConnector, TlsError> {
        config
            .validate()
            .map_err(|e| TlsError::ConfigurationError(e.to_string()))?;

        if config.mode == TlsMode::Disable {
            return Err(TlsError::UnsupportedMode { mode: config.mode });
        }

        info!(mode = %config.mode, "building PostgreSQL TLS connector");

        let mut builder = NativeTlsConnector::builder();

        configure_verification(&mut builder, config)?;

        if let Some(ca_cert_path) = &config.ca_cert {
            apply_ca_cert(&mut builder, ca_cert_path)?;
        }

        if let (Some(cert_path), Some(key_path)) = (&config.client_cert, &config.client_key) {
            apply_client_cert(&mut builder, cert_path, key_path)?;
        }

        let connector = builder
            .build()
            .map_err(|e| TlsError::ConfigurationError(e.to_string()))?;

        Ok(MakeTlsConnector::new(connector))
    }
}

fn configure_verification(
    builder: &mut TlsConnectorBuilder,
    config: &TlsConfig,
) -> Result<(), TlsError> {
    match config.mode {
        TlsMode::Disable => {
            return Err(TlsError::UnsupportedMode { mode: config.mode });
        }
        TlsMode::Allow | TlsMode::Prefer | TlsMode::Require => {
            if !config.verify_server {
                debug!("certificate verification disabled");
                builder.danger_accept_invalid_certs(true);
                builder.danger_accept_invalid_hostnames(true);
            }
        }
        TlsMode::VerifyCa => {
            builder.danger_accept_invalid_hostnames(true);
        }
        TlsMode::VerifyFull => {}
    }

    Ok(())
}

fn apply_ca_cert(builder: &mut TlsConnectorBuilder, path: &Path) -> Result<(), TlsError> {
    debug!(path = %path.display(), "loading CA certificate");

    let pem_data = fs::read(path).map_err(|e| TlsError::CaCertLoadFailed {
        path: path.display().to_string(),
        source: e,
    })?;

    let cert =
        Certificate::from_pem(&pem_data).map_err(|e| TlsError::InvalidCaCert(e.to_string()))?;

    builder.add_root_certificate(cert);
    Ok(())
}

fn apply_client_cert(
    builder: &mut TlsConnectorBuilder,
    cert_path: &Path,
    key_path: &Path,
) -> Result<(), TlsError> {
    debug!(
        cert_path = %cert_path.display(),
        key_path = %key_path.display(),
        "loading client certificate and key"
    );

    let cert_pem = fs::read(cert_path).map_err(|e| TlsError::ClientCertLoadFailed {
        path: cert_path.display().to_string(),
        source: e,
    })?;

    let key_pem = fs::read(key_path).map_err(|e| TlsError::ClientKeyLoadFailed {
        path: key_path.display().to_string(),
        source: e,
    })?;

    let identity = Identity::from_pkcs8(&cert_pem, &key_pem)
        .map_err(|e| TlsError::InvalidClientIdentity(e.to_string()))?;

    builder.identity(identity);
    Ok(())
}

#[cfg(test)]
mod tests;
