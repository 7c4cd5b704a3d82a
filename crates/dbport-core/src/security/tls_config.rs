//! TLS/SSL configuration types
//!
//! The mode names follow PostgreSQL's `sslmode` conventions; the parameter
//! builder maps them onto each engine family's own property names.

use crate::{DbPortError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// TLS/SSL mode for database connections
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum TlsMode {
    /// Never use TLS
    Disable,
    /// Try plaintext first, upgrade if the server insists
    Allow,
    /// Try TLS first, fall back to plaintext
    #[default]
    Prefer,
    /// Require TLS without verifying the server certificate
    Require,
    /// Require TLS and verify the certificate chain
    #[serde(alias = "verify-ca")]
    VerifyCa,
    /// Require TLS, verify the chain and the hostname
    #[serde(alias = "verify-full")]
    VerifyFull,
}

impl TlsMode {
    /// Returns true if this mode requires encryption
    pub fn requires_encryption(&self) -> bool {
        matches!(
            self,
            TlsMode::Require | TlsMode::VerifyCa | TlsMode::VerifyFull
        )
    }

    /// Returns true if this mode requires certificate verification
    pub fn requires_ca_verification(&self) -> bool {
        matches!(self, TlsMode::VerifyCa | TlsMode::VerifyFull)
    }

    /// Returns true if this mode requires hostname verification
    pub fn requires_hostname_verification(&self) -> bool {
        matches!(self, TlsMode::VerifyFull)
    }

    /// PostgreSQL `sslmode` spelling
    pub fn as_sslmode(&self) -> &'static str {
        match self {
            TlsMode::Disable => "disable",
            TlsMode::Allow => "allow",
            TlsMode::Prefer => "prefer",
            TlsMode::Require => "require",
            TlsMode::VerifyCa => "verify-ca",
            TlsMode::VerifyFull => "verify-full",
        }
    }
}

impl fmt::Display for TlsMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sslmode())
    }
}

impl FromStr for TlsMode {
    type Err = DbPortError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "disable" | "disabled" => Ok(TlsMode::Disable),
            "allow" => Ok(TlsMode::Allow),
            "prefer" | "preferred" => Ok(TlsMode::Prefer),
            "require" | "required" => Ok(TlsMode::Require),
            "verify-ca" => Ok(TlsMode::VerifyCa),
            "verify-full" | "verify-identity" => Ok(TlsMode::VerifyFull),
            other => Err(DbPortError::Configuration(format!(
                "unknown TLS mode '{}'",
                other
            ))),
        }
    }
}

/// Certificate paths and verification policy for a TLS connection.
///
/// Paths come from the certificate management collaborator; they are
/// passed through to drivers untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    pub mode: TlsMode,
    /// CA certificate used to verify the server
    pub ca_cert: Option<PathBuf>,
    /// Client certificate for mutual TLS
    pub client_cert: Option<PathBuf>,
    /// Client private key for mutual TLS
    pub client_key: Option<PathBuf>,
    /// Whether to verify the server's certificate
    pub verify_server: bool,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            mode: TlsMode::default(),
            ca_cert: None,
            client_cert: None,
            client_key: None,
            verify_server: true,
        }
    }
}

impl TlsConfig {
    /// Create a new TLS configuration with the specified mode
    pub fn new(mode: TlsMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    pub fn disabled() -> Self {
        Self::new(TlsMode::Disable)
    }

    pub fn require() -> Self {
        Self::new(TlsMode::Require)
    }

    pub fn verify_full() -> Self {
        Self::new(TlsMode::VerifyFull)
    }

    pub fn ca_cert(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_cert = Some(path.into());
        self
    }

    pub fn client_cert(
        mut self,
        cert_path: impl Into<PathBuf>,
        key_path: impl Into<PathBuf>,
    ) -> Self {
        self.client_cert = Some(cert_path.into());
        self.client_key = Some(key_path.into());
        self
    }

    pub fn verify_server(mut self, verify: bool) -> Self {
        self.verify_server = verify;
        self
    }

    /// Check that the certificate paths are consistent with the mode.
    ///
    /// Drivers that build their own TLS connector call this first.
    pub fn validate(&self) -> Result<()> {
        if self.mode.requires_ca_verification() && self.ca_cert.is_none() {
            return Err(DbPortError::Configuration(
                "TLS mode requires CA certificate but none provided".to_string(),
            ));
        }

        for (label, path) in [
            ("CA certificate", &self.ca_cert),
            ("Client certificate", &self.client_cert),
            ("Client key", &self.client_key),
        ] {
            if let Some(path) = path
                && path.as_os_str().is_empty()
            {
                return Err(DbPortError::Configuration(format!(
                    "{} path cannot be empty",
                    label
                )));
            }
        }

        match (&self.client_cert, &self.client_key) {
            (Some(_), None) => Err(DbPortError::Configuration(
                "Client certificate provided but client key is missing".to_string(),
            )),
            (None, Some(_)) => Err(DbPortError::Configuration(
                "Client key provided but client certificate is missing".to_string(),
            )),
            _ => Ok(()),
        }
    }
}
