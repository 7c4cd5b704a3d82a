//! MySQL TLS support
//!
//! Maps the `useSSL` family of connection options onto mysql_async
//! [`SslOpts`].

use dbport_core::security::{TlsConfig, TlsMode};
use dbport_core::{ConnectionOptions, DbPortError};
use mysql_async::{ClientIdentity, SslOpts};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum MysqlTlsError {
    #[error("Failed to load CA certificate from {path}: {source}")]
    CaCertLoadFailed {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to load client key store from {path}: {source}")]
    KeyStoreLoadFailed {
        path: String,
        source: std::io::Error,
    },

    #[error("TLS configuration error: {0}")]
    ConfigurationError(String),
}

impl From<MysqlTlsError> for DbPortError {
    fn from(err: MysqlTlsError) -> Self {
        DbPortError::Connection(err.to_string())
    }
}

/// Key store URLs may carry a `file:` scheme
fn key_store_path(url: &str) -> PathBuf {
    PathBuf::from(url.strip_prefix("file:").unwrap_or(url))
}

/// Read the TLS settings out of a connection option set.
///
/// `useSSL` turns TLS on, `requireSSL` makes it mandatory and
/// `verifyServerCertificate` (default true) controls certificate checks.
pub fn tls_config_from_options(options: &ConnectionOptions) -> TlsConfig {
    if options.get_bool("useSSL") != Some(true) {
        return TlsConfig::disabled();
    }

    let mode = if options.get_bool("requireSSL") == Some(true) {
        TlsMode::Require
    } else {
        TlsMode::Prefer
    };

    let mut config =
        TlsConfig::new(mode).verify_server(options.get_bool("verifyServerCertificate") != Some(false));
    if let Some(ca) = options.get("trustCertificateKeyStoreUrl") {
        config = config.ca_cert(key_store_path(ca));
    }
    config
}

/// Builds mysql_async SSL options from a [`TlsConfig`]
#[derive(Debug, Clone)]
pub struct MysqlTlsConnector;

impl MysqlTlsConnector {
    /// Build SSL options; `None` when TLS is disabled.
    ///
    /// `client_key_store` is a PKCS#12 archive holding the client identity.
    pub fn build(
        config: &TlsConfig,
        client_key_store: Option<(&Path, Option<&str>)>,
    ) -> Result<Option<SslOpts>, MysqlTlsError> {
        config
            .validate()
            .map_err(|e| MysqlTlsError::ConfigurationError(e.to_string()))?;

        if config.mode == TlsMode::Disable {
            return Ok(None);
        }

        info!(mode = %config.mode, verify = config.verify_server, "building MySQL SSL options");

        let mut ssl_opts = SslOpts::default();

        if !config.verify_server {
            debug!("certificate verification disabled");
            ssl_opts = ssl_opts
                .with_danger_accept_invalid_certs(true)
                .with_danger_skip_domain_validation(true);
        } else if config.mode == TlsMode::VerifyCa {
            ssl_opts = ssl_opts.with_danger_skip_domain_validation(true);
        }

        if let Some(ca_cert_path) = &config.ca_cert {
            ssl_opts = apply_ca_cert(ssl_opts, ca_cert_path)?;
        }

        if let Some((path, password)) = client_key_store {
            ssl_opts = apply_client_identity(ssl_opts, path, password)?;
        }

        Ok(Some(ssl_opts))
    }
}

fn apply_ca_cert(ssl_opts: SslOpts, path: &Path) -> Result<SslOpts, MysqlTlsError> {
    debug!(path = %path.display(), "adding CA certificate to SSL options");

    if !path.exists() {
        return Err(MysqlTlsError::CaCertLoadFailed {
            path: path.display().to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"),
        });
    }

    Ok(ssl_opts
        .with_root_certs(vec![path.to_path_buf().into()])
        .with_disable_built_in_roots(true))
}

fn apply_client_identity(
    ssl_opts: SslOpts,
    path: &Path,
    password: Option<&str>,
) -> Result<SslOpts, MysqlTlsError> {
    if !path.exists() {
        return Err(MysqlTlsError::KeyStoreLoadFailed {
            path: path.display().to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"),
        });
    }

    let mut identity = ClientIdentity::new(path.to_path_buf().into());
    if let Some(password) = password {
        identity = identity.with_password(password.to_string());
    }
    Ok(ssl_opts.with_client_identity(Some(identity)))
}

/// Client key store path and password from the option set
pub(crate) fn client_key_store(options: &ConnectionOptions) -> Option<(PathBuf, Option<String>)> {
    let path = options.get("clientCertificateKeyStoreUrl")?;
    let password = options
        .get("clientCertificateKeyStorePassword")
        .map(str::to_string);
    Some((key_store_path(path), password))
}

#[cfg(test)]
mod tests;
