use super::*;
use tempfile::NamedTempFile;

fn options(pairs: &[(&str, &str)]) -> ConnectionOptions {
    pairs.iter().copied().collect()
}

#[test]
fn test_tls_off_without_use_ssl() {
    let config = tls_config_from_options(&options(&[("requireSSL", "true")]));
    assert_eq!(config.mode, TlsMode::Disable);
}

#[test]
fn test_use_ssl_prefers() {
    let config = tls_config_from_options(&options(&[("useSSL", "true")]));
    assert_eq!(config.mode, TlsMode::Prefer);
    assert!(config.verify_server);
}

#[test]
fn test_require_ssl_without_verification() {
    let config = tls_config_from_options(&options(&[
        ("useSSL", "true"),
        ("requireSSL", "true"),
        ("verifyServerCertificate", "false"),
        ("trustCertificateKeyStoreUrl", "file:/certs/ca.pem"),
    ]));
    assert_eq!(config.mode, TlsMode::Require);
    assert!(!config.verify_server);
    assert_eq!(config.ca_cert.as_deref(), Some(Path::new("/certs/ca.pem")));
}

#[test]
fn test_client_key_store_from_options() {
    let opts = options(&[
        ("clientCertificateKeyStoreUrl", "file:/certs/client.p12"),
        ("clientCertificateKeyStorePassword", "changeit"),
    ]);
    let (path, password) = client_key_store(&opts).unwrap();
    assert_eq!(path, PathBuf::from("/certs/client.p12"));
    assert_eq!(password.as_deref(), Some("changeit"));

    assert!(client_key_store(&ConnectionOptions::new()).is_none());
}

#[test]
fn test_build_disabled_returns_none() {
    let opts = MysqlTlsConnector::build(&TlsConfig::disabled(), None).unwrap();
    assert!(opts.is_none());
}

#[test]
fn test_build_require_without_verification() {
    let config = TlsConfig::require().verify_server(false);
    let opts = MysqlTlsConnector::build(&config, None).unwrap().unwrap();
    assert!(opts.accept_invalid_certs());
    assert!(opts.skip_domain_validation());
}

#[test]
fn test_build_with_ca_cert() {
    let ca = NamedTempFile::new().unwrap();
    let config = TlsConfig::require().ca_cert(ca.path());
    let opts = MysqlTlsConnector::build(&config, None).unwrap().unwrap();
    assert!(!opts.accept_invalid_certs());
    assert!(opts.disable_built_in_roots());
}

#[test]
fn test_build_missing_ca_cert() {
    let config = TlsConfig::require().ca_cert("/nonexistent/ca.pem");
    let result = MysqlTlsConnector::build(&config, None);
    assert!(matches!(result, Err(MysqlTlsError::CaCertLoadFailed { .. })));
}

#[test]
fn test_build_missing_key_store() {
    let config = TlsConfig::require();
    let result = MysqlTlsConnector::build(
        &config,
        Some((Path::new("/nonexistent/client.p12"), None)),
    );
    assert!(matches!(result, Err(MysqlTlsError::KeyStoreLoadFailed { .. })));
}

#[test]
fn test_verify_ca_requires_ca_cert() {
    let config = TlsConfig::new(TlsMode::VerifyCa);
    let result = MysqlTlsConnector::build(&config, None);
    assert!(matches!(result, Err(MysqlTlsError::ConfigurationError(_))));
}
