use super::*;
use std::io::Write;
use tempfile::NamedTempFile;

fn create_temp_file_with_content(content: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content).unwrap();
    file.flush().unwrap();
    file
}

fn options(pairs: &[(&str, &str)]) -> ConnectionOptions {
    pairs.iter().copied().collect()
}

#[test]
fn test_no_ssl_options_disables_tls() {
    let config = tls_config_from_options(&ConnectionOptions::new()).unwrap();
    assert_eq!(config.mode, TlsMode::Disable);
}

#[test]
fn test_ssl_flag_without_mode_prefers_tls() {
    let config = tls_config_from_options(&options(&[("ssl", "true")])).unwrap();
    assert_eq!(config.mode, TlsMode::Prefer);
    assert!(!config.verify_server);
}

#[test]
fn test_sslmode_and_paths() {
    let config = tls_config_from_options(&options(&[
        ("ssl", "true"),
        ("sslmode", "verify-full"),
        ("sslrootcert", "/certs/ca.pem"),
        ("sslcert", "/certs/client.pem"),
        ("sslkey", "/certs/client.key"),
    ]))
    .unwrap();

    assert_eq!(config.mode, TlsMode::VerifyFull);
    assert_eq!(config.ca_cert.as_deref(), Some(Path::new("/certs/ca.pem")));
    assert_eq!(config.client_cert.as_deref(), Some(Path::new("/certs/client.pem")));
    assert_eq!(config.client_key.as_deref(), Some(Path::new("/certs/client.key")));
    assert!(config.verify_server);
}

#[test]
fn test_require_with_root_cert_verifies() {
    let config = tls_config_from_options(&options(&[
        ("sslmode", "require"),
        ("sslrootcert", "/certs/ca.pem"),
    ]))
    .unwrap();
    assert!(config.verify_server);
}

#[test]
fn test_unknown_sslmode_is_rejected() {
    let err = tls_config_from_options(&options(&[("sslmode", "sometimes")])).unwrap_err();
    assert!(matches!(err, DbPortError::Configuration(_)));
}

#[test]
fn test_build_connector_fails_for_disable_mode() {
    let result = PostgresTlsConnector::build(&TlsConfig::disabled());
    assert!(matches!(
        result,
        Err(TlsError::UnsupportedMode {
            mode: TlsMode::Disable
        })
    ));
}

#[test]
fn test_build_connector_require_mode_no_certs() {
    let config = TlsConfig::require().verify_server(false);
    assert!(PostgresTlsConnector::build(&config).is_ok());
}

#[test]
fn test_build_connector_verify_full_requires_ca_cert() {
    let result = PostgresTlsConnector::build(&TlsConfig::verify_full());
    assert!(matches!(result, Err(TlsError::ConfigurationError(_))));
}

#[test]
fn test_ca_cert_file_not_found() {
    let config = TlsConfig::require().ca_cert("/nonexistent/ca.pem");
    let result = PostgresTlsConnector::build(&config);
    assert!(matches!(result, Err(TlsError::CaCertLoadFailed { .. })));
}

#[test]
fn test_ca_cert_invalid_format() {
    let file = create_temp_file_with_content(b"not a certificate");
    let config = TlsConfig::require().ca_cert(file.path());
    let result = PostgresTlsConnector::build(&config);
    assert!(matches!(result, Err(TlsError::InvalidCaCert(_))));
}

#[test]
fn test_client_key_file_not_found() {
    let cert = create_temp_file_with_content(b"-----BEGIN CERTIFICATE-----\n");
    let config = TlsConfig::require()
        .verify_server(false)
        .client_cert(cert.path(), "/nonexistent/client.key");
    let result = PostgresTlsConnector::build(&config);
    assert!(matches!(result, Err(TlsError::ClientKeyLoadFailed { .. })));
}

#[test]
fn test_tls_error_becomes_connection_error() {
    let err: DbPortError = TlsError::InvalidCaCert("bad pem".into()).into();
    assert!(matches!(err, DbPortError::Connection(ref msg) if msg.contains("bad pem")));
}
