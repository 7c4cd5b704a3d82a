use super::*;
use async_trait::async_trait;
use dbport_core::{DbPortError, TlsConfig, TlsMode};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;

fn server(engine: &str, port: u16) -> ConnectionProfile {
    ConnectionProfile::new(engine, "db.internal", port, "sales")
}

#[test]
fn test_engine_urls() {
    let cases = [
        (BuiltinEngine::Postgres, "postgresql://db.internal:5433/sales"),
        (BuiltinEngine::MySql, "mysql://db.internal:5433/sales"),
        (BuiltinEngine::MariaDb, "mariadb://db.internal:5433/sales"),
        (
            BuiltinEngine::SqlServer,
            "sqlserver://db.internal:5433;databaseName=sales",
        ),
        (BuiltinEngine::Oracle, "oracle:thin:@db.internal:5433:sales"),
        (BuiltinEngine::Firebird, "firebirdsql://db.internal:5433/sales"),
    ];

    for (engine, expected) in cases {
        let profile = server(engine.id(), 5433);
        assert_eq!(build_connection_string(&profile, UrlTarget::Engine(engine)), expected);
    }
}

#[test]
fn test_zero_port_uses_engine_default() {
    let profile = server("postgresql", 0);
    assert_eq!(
        build_connection_string(&profile, UrlTarget::Engine(BuiltinEngine::Postgres)),
        "postgresql://db.internal:5432/sales"
    );

    let profile = server("sqlserver", 0);
    assert_eq!(
        build_connection_string(&profile, UrlTarget::Engine(BuiltinEngine::SqlServer)),
        "sqlserver://db.internal:1433;databaseName=sales"
    );
}

#[test]
fn test_embedded_urls() {
    let sqlite = ConnectionProfile::embedded("sqlite", "/var/data/app.db");
    assert_eq!(
        build_connection_string(&sqlite, UrlTarget::Engine(BuiltinEngine::Sqlite)),
        "sqlite:/var/data/app.db"
    );

    let h2_plain = ConnectionProfile::embedded("h2", "/tmp/h2db");
    assert_eq!(
        build_connection_string(&h2_plain, UrlTarget::Engine(BuiltinEngine::H2)),
        "h2:file:/tmp/h2db"
    );

    let h2_mem = ConnectionProfile::embedded("h2", "mem:test");
    assert_eq!(
        build_connection_string(&h2_mem, UrlTarget::Engine(BuiltinEngine::H2)),
        "h2:mem:test"
    );

    let h2_file = ConnectionProfile::embedded("h2", "file:/tmp/h2db");
    assert_eq!(
        build_connection_string(&h2_file, UrlTarget::Engine(BuiltinEngine::H2)),
        "h2:file:/tmp/h2db"
    );

    let hsqldb = ConnectionProfile::embedded("hsqldb", "/tmp/hs");
    assert_eq!(
        build_connection_string(&hsqldb, UrlTarget::Engine(BuiltinEngine::HsqlDb)),
        "hsqldb:file:/tmp/hs"
    );

    let derby = ConnectionProfile::embedded("derby", "/tmp/derby");
    assert_eq!(
        build_connection_string(&derby, UrlTarget::Engine(BuiltinEngine::Derby)),
        "derby:/tmp/derby;create=true"
    );
}

#[test]
fn test_engine_url_appends_params() {
    let profile = server("postgresql", 5432)
        .with_param("application_name", "reports")
        .with_param("options", "-c%20search_path=ops");

    assert_eq!(
        build_connection_string(&profile, UrlTarget::Engine(BuiltinEngine::Postgres)),
        "postgresql://db.internal:5432/sales?application_name=reports&options=-c%20search_path=ops"
    );
}

#[test]
fn test_template_substitution() {
    let profile = ConnectionProfile::new("custom", "h", 9999, "d").with_param("extra", "v");

    assert_eq!(
        build_connection_string(
            &profile,
            UrlTarget::Template("jdbc:custom://{host}:{port}/{database}?opt={extra}")
        ),
        "jdbc:custom://h:9999/d?opt=v"
    );
}

#[test]
fn test_template_keeps_unknown_placeholders() {
    let profile = ConnectionProfile::new("custom", "h", 9999, "d");

    assert_eq!(
        build_connection_string(&profile, UrlTarget::Template("x://{host}/{missing}")),
        "x://h/{missing}"
    );
}

#[test]
fn test_template_appends_unused_params() {
    let profile = ConnectionProfile::new("custom", "h", 1, "d")
        .with_param("extra", "v")
        .with_param("trace", "on")
        .with_param("level", "2");

    assert_eq!(
        build_connection_string(&profile, UrlTarget::Template("c://{host}:{port}/{database}?e={extra}")),
        "c://h:1/d?e=v&trace=on&level=2"
    );
    assert_eq!(
        build_connection_string(&profile, UrlTarget::Template("c://{host}/{database}")),
        "c://h/d?extra=v&trace=on&level=2"
    );
}

fn keys(options: &ConnectionOptions) -> Vec<&str> {
    options.keys().collect()
}

#[test]
fn test_options_postgres() {
    let tls = TlsConfig::new(TlsMode::VerifyFull)
        .ca_cert("/certs/ca.pem")
        .client_cert("/certs/client.pem", "/certs/client.key");
    let profile = server("postgresql", 5432)
        .with_credentials("app", "secret")
        .with_tls(tls);

    let options = build_connection_options(&profile);

    assert_eq!(
        keys(&options),
        vec![
            "user",
            "password",
            "ssl",
            "sslmode",
            "sslcert",
            "sslkey",
            "sslrootcert",
            "connectTimeout",
            "ApplicationName",
            "prepareThreshold",
        ]
    );
    assert_eq!(options.get("user"), Some("app"));
    assert_eq!(options.get("sslmode"), Some("verify-full"));
    assert_eq!(options.get("sslrootcert"), Some("/certs/ca.pem"));
    assert_eq!(options.get("connectTimeout"), Some("30000"));
    assert_eq!(options.get("ApplicationName"), Some(APPLICATION_NAME));
}

#[test]
fn test_options_mysql_family() {
    let tls = TlsConfig::require()
        .verify_server(false)
        .ca_cert("/certs/ca.pem")
        .client_cert("/certs/client.p12", "/certs/unused.key");
    let mut profile = server("mariadb", 3306).with_tls(tls);
    profile.auto_reconnect = false;
    profile.timeouts.socket_secs = 15;

    let options = build_connection_options(&profile);

    assert_eq!(options.get("useSSL"), Some("true"));
    assert_eq!(options.get("requireSSL"), Some("true"));
    assert_eq!(options.get("verifyServerCertificate"), Some("false"));
    assert_eq!(options.get("clientCertificateKeyStoreUrl"), Some("/certs/client.p12"));
    assert_eq!(options.get("trustCertificateKeyStoreUrl"), Some("/certs/ca.pem"));
    assert_eq!(options.get("socketTimeout"), Some("15000"));
    assert_eq!(options.get("autoReconnect"), Some("false"));
    assert_eq!(options.get("prepStmtCacheSize"), Some("250"));
    assert_eq!(options.get("characterEncoding"), Some("UTF-8"));
    assert!(!options.contains("user"));
}

#[test]
fn test_options_sqlserver_and_oracle() {
    let profile = server("mssql", 1433).with_tls(TlsConfig::require().verify_server(false));
    let options = build_connection_options(&profile);
    assert_eq!(options.get("encrypt"), Some("true"));
    assert_eq!(options.get("trustServerCertificate"), Some("true"));
    assert_eq!(options.get("selectMethod"), Some("cursor"));

    let profile = server("oracle", 1521);
    let options = build_connection_options(&profile);
    assert_eq!(options.get("oracle.jdbc.ReadTimeout"), Some("60000"));
    assert_eq!(options.get("oracle.net.CONNECT_TIMEOUT"), Some("30000"));
    assert!(!options.contains("encrypt"));
}

#[test]
fn test_options_tls_disabled_and_zero_timeouts() {
    let mut profile = ConnectionProfile::embedded("sqlite", "/tmp/a.db");
    profile.timeouts.connect_secs = 0;

    let options = build_connection_options(&profile);
    assert!(options.is_empty());
}

#[test]
fn test_custom_properties_override() {
    let profile = server("postgresql", 5432)
        .with_credentials("app", "secret")
        .with_property("ApplicationName", "billing")
        .with_property("connectTimeout", "500")
        .with_property("tcpKeepAlive", "true");

    let options = build_connection_options(&profile);

    assert_eq!(options.get("ApplicationName"), Some("billing"));
    assert_eq!(options.get("connectTimeout"), Some("500"));
    assert_eq!(options.get("tcpKeepAlive"), Some("true"));
}

#[test]
fn test_custom_properties_override_resolved_credentials() {
    let profile = server("postgresql", 5432).with_property("password", "override");
    let stored = Credentials::new("vault-user", "vault-pass");

    let options = build_connection_options_with_credentials(&profile, Some(&stored));

    assert_eq!(options.get("user"), Some("vault-user"));
    assert_eq!(options.get("password"), Some("override"));

    let profile = profile.with_credentials("app", "secret");
    assert_eq!(build_connection_options(&profile).get("password"), Some("override"));
}

#[test]
fn test_unknown_engine_gets_no_family_defaults() {
    let profile = server("vendordb", 7000)
        .with_credentials("u", "p")
        .with_tls(TlsConfig::require());

    let options = build_connection_options(&profile);
    assert_eq!(keys(&options), vec!["user", "password", "connectTimeout"]);
}

/// Records session statements and optionally rejects schema selection
#[derive(Default)]
struct RecordingConnection {
    calls: Mutex<Vec<String>>,
    schema_supported: bool,
    fail_use: bool,
}

impl RecordingConnection {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl Connection for RecordingConnection {
    fn driver_name(&self) -> &str {
        "recording"
    }

    async fn execute(&self, sql: &str) -> dbport_core::Result<u64> {
        self.calls.lock().push(format!("execute {}", sql));
        if self.fail_use && sql.starts_with("USE ") {
            return Err(DbPortError::Query("unknown database".into()));
        }
        Ok(0)
    }

    async fn set_auto_commit(&self, enabled: bool) -> dbport_core::Result<()> {
        self.calls.lock().push(format!("auto_commit {}", enabled));
        Ok(())
    }

    async fn set_read_only(&self, read_only: bool) -> dbport_core::Result<()> {
        self.calls.lock().push(format!("read_only {}", read_only));
        Ok(())
    }

    async fn set_isolation_level(&self, level: IsolationLevel) -> dbport_core::Result<()> {
        self.calls.lock().push(format!("isolation {}", level));
        Ok(())
    }

    async fn set_schema(&self, schema: &str) -> dbport_core::Result<()> {
        if !self.schema_supported {
            return Err(DbPortError::NotSupported("schema".into()));
        }
        self.calls.lock().push(format!("schema {}", schema));
        Ok(())
    }

    async fn close(&self) -> dbport_core::Result<()> {
        Ok(())
    }

    fn is_closed(&self) -> bool {
        false
    }
}

#[tokio::test]
async fn test_session_defaults() {
    let conn = RecordingConnection::default();
    apply_session_settings(&conn, &SessionSettings::default())
        .await
        .expect("apply");

    assert_eq!(
        conn.calls(),
        vec!["auto_commit true".to_string(), "isolation READ COMMITTED".to_string()]
    );
}

#[tokio::test]
async fn test_session_full() {
    let conn = RecordingConnection {
        schema_supported: true,
        ..Default::default()
    };
    let session = SessionSettings {
        auto_commit: false,
        read_only: true,
        isolation: Some("serializable".into()),
        default_schema: Some("reporting".into()),
    };

    apply_session_settings(&conn, &session).await.expect("apply");

    assert_eq!(
        conn.calls(),
        vec![
            "auto_commit false".to_string(),
            "isolation SERIALIZABLE".to_string(),
            "read_only true".to_string(),
            "schema reporting".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_schema_falls_back_to_use() {
    let conn = RecordingConnection::default();
    let session = SessionSettings {
        isolation: None,
        default_schema: Some("legacy".into()),
        ..Default::default()
    };

    apply_session_settings(&conn, &session).await.expect("apply");

    assert_eq!(
        conn.calls(),
        vec!["auto_commit true".to_string(), "execute USE legacy".to_string()]
    );
}

#[tokio::test]
async fn test_schema_fallback_failure_is_swallowed() {
    let conn = RecordingConnection {
        fail_use: true,
        ..Default::default()
    };
    let session = SessionSettings {
        default_schema: Some("missing".into()),
        ..Default::default()
    };

    assert!(apply_session_settings(&conn, &session).await.is_ok());
    assert!(conn.calls().contains(&"execute USE missing".to_string()));
}
