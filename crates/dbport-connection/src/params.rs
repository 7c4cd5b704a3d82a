//! Connection string and option set construction
//!
//! Turns a [`ConnectionProfile`] into what a driver consumes: a connection
//! string composed from a per-engine template (or a custom driver's
//! template), and an option set carrying credentials, TLS properties,
//! timeouts and engine defaults.

use dbport_core::{
    Connection, ConnectionOptions, ConnectionProfile, Credentials, IsolationLevel, Result,
    SessionSettings,
};
use dbport_drivers::{BuiltinEngine, DriverHandle, EngineFamily};

#[cfg(test)]
mod tests;

/// Application name reported to servers that accept one
pub const APPLICATION_NAME: &str = "dbport";

/// What the connection string is built for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlTarget<'a> {
    /// Fixed template of a built-in engine
    Engine(BuiltinEngine),
    /// `{placeholder}` template of a custom driver
    Template(&'a str),
}

impl<'a> From<&'a DriverHandle> for UrlTarget<'a> {
    fn from(handle: &'a DriverHandle) -> Self {
        match (handle.url_template(), handle.builtin_engine()) {
            (Some(template), _) => UrlTarget::Template(template),
            (None, Some(engine)) => UrlTarget::Engine(engine),
            // Custom handles always carry a template
            (None, None) => UrlTarget::Template(""),
        }
    }
}

/// Port from the profile, or the engine default when unset
fn port_for(profile: &ConnectionProfile, engine: BuiltinEngine) -> u16 {
    match (profile.port, engine.default_port()) {
        (0, Some(default)) => default,
        (port, _) => port,
    }
}

fn engine_url(engine: BuiltinEngine, profile: &ConnectionProfile) -> String {
    let host = &profile.host;
    let port = port_for(profile, engine);
    let db = &profile.database;

    match engine {
        BuiltinEngine::Postgres => format!("postgresql://{}:{}/{}", host, port, db),
        BuiltinEngine::MySql => format!("mysql://{}:{}/{}", host, port, db),
        BuiltinEngine::MariaDb => format!("mariadb://{}:{}/{}", host, port, db),
        BuiltinEngine::SqlServer => {
            format!("sqlserver://{}:{};databaseName={}", host, port, db)
        }
        BuiltinEngine::Oracle => format!("oracle:thin:@{}:{}:{}", host, port, db),
        BuiltinEngine::Sqlite => format!("sqlite:{}", db),
        BuiltinEngine::H2 if db.starts_with("file:") || db.starts_with("mem:") => {
            format!("h2:{}", db)
        }
        BuiltinEngine::H2 => format!("h2:file:{}", db),
        BuiltinEngine::HsqlDb => format!("hsqldb:file:{}", db),
        BuiltinEngine::Derby => format!("derby:{};create=true", db),
        BuiltinEngine::Firebird => format!("firebirdsql://{}:{}/{}", host, port, db),
    }
}

/// Substitute `{host}`, `{port}`, `{database}` and `{<param>}` placeholders.
///
/// Returns the URL and the params that were not used as placeholders.
/// Placeholders without a value are left as written.
fn expand_template<'p>(
    template: &str,
    profile: &'p ConnectionProfile,
) -> (String, Vec<(&'p str, &'p str)>) {
    let mut url = template
        .replace("{host}", &profile.host)
        .replace("{port}", &profile.port.to_string())
        .replace("{database}", &profile.database);

    let mut unused = Vec::new();
    for (key, value) in &profile.params {
        let placeholder = format!("{{{}}}", key);
        if url.contains(&placeholder) {
            url = url.replace(&placeholder, value);
        } else {
            unused.push((key.as_str(), value.as_str()));
        }
    }
    (url, unused)
}

/// Append `key=value` pairs, starting with `?` unless the URL already has one
fn append_params<'a>(url: &mut String, params: impl IntoIterator<Item = (&'a str, &'a str)>) {
    let pairs: Vec<String> = params
        .into_iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect();
    if pairs.is_empty() {
        return;
    }
    url.push(if url.contains('?') { '&' } else { '?' });
    url.push_str(&pairs.join("&"));
}

/// Build the connection string for `profile`
pub fn build_connection_string<'a>(
    profile: &ConnectionProfile,
    target: impl Into<UrlTarget<'a>>,
) -> String {
    let (mut url, extra) = match target.into() {
        UrlTarget::Engine(engine) => (
            engine_url(engine, profile),
            profile
                .params
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str()))
                .collect(),
        ),
        UrlTarget::Template(template) => expand_template(template, profile),
    };
    append_params(&mut url, extra);
    url
}

fn tls_properties(options: &mut ConnectionOptions, family: EngineFamily, profile: &ConnectionProfile) {
    let tls = &profile.tls.config;

    match family {
        EngineFamily::Postgres => {
            options.set("ssl", "true").set("sslmode", tls.mode.as_sslmode());
            if let Some(cert) = &tls.client_cert {
                options.set("sslcert", cert.display().to_string());
            }
            if let Some(key) = &tls.client_key {
                options.set("sslkey", key.display().to_string());
            }
            if let Some(root) = &tls.ca_cert {
                options.set("sslrootcert", root.display().to_string());
            }
        }
        EngineFamily::MySql => {
            options
                .set("useSSL", "true")
                .set("requireSSL", "true")
                .set("verifyServerCertificate", tls.verify_server.to_string());
            if let Some(cert) = &tls.client_cert {
                options.set("clientCertificateKeyStoreUrl", cert.display().to_string());
            }
            if let Some(root) = &tls.ca_cert {
                options.set("trustCertificateKeyStoreUrl", root.display().to_string());
            }
        }
        EngineFamily::SqlServer => {
            options
                .set("encrypt", "true")
                .set("trustServerCertificate", (!tls.verify_server).to_string());
        }
        EngineFamily::Oracle | EngineFamily::Embedded | EngineFamily::Other => {
            tracing::debug!(engine = %profile.engine, "no TLS properties for engine family");
        }
    }
}

fn engine_defaults(options: &mut ConnectionOptions, family: EngineFamily, profile: &ConnectionProfile) {
    match family {
        EngineFamily::Postgres => {
            options
                .set("ApplicationName", APPLICATION_NAME)
                .set("prepareThreshold", "5");
        }
        EngineFamily::MySql => {
            options
                .set("useUnicode", "true")
                .set("characterEncoding", "UTF-8")
                .set("autoReconnect", profile.auto_reconnect.to_string())
                .set("cachePrepStmts", "true")
                .set("prepStmtCacheSize", "250")
                .set("prepStmtCacheSqlLimit", "2048");
        }
        EngineFamily::SqlServer => {
            options
                .set("applicationName", APPLICATION_NAME)
                .set("selectMethod", "cursor");
        }
        EngineFamily::Oracle => {
            options
                .set("oracle.jdbc.ReadTimeout", "60000")
                .set("oracle.net.CONNECT_TIMEOUT", "30000");
        }
        EngineFamily::Embedded | EngineFamily::Other => {}
    }
}

/// Build the option set for `profile`.
///
/// The engine family is taken from the profile's engine id, so a custom
/// driver for a known engine receives that engine's property names. Custom
/// properties are applied last and override anything computed here.
pub fn build_connection_options(profile: &ConnectionProfile) -> ConnectionOptions {
    build_connection_options_with_credentials(profile, profile.credentials.as_ref())
}

/// Like [`build_connection_options`], with credentials resolved elsewhere
/// (for example from a credential store) in place of the profile's own.
/// Custom properties still override them.
pub fn build_connection_options_with_credentials(
    profile: &ConnectionProfile,
    credentials: Option<&Credentials>,
) -> ConnectionOptions {
    let family = BuiltinEngine::from_id(&profile.engine)
        .map(|engine| engine.family())
        .unwrap_or(EngineFamily::Other);

    let mut options = ConnectionOptions::new();

    if let Some(credentials) = credentials {
        if let Some(user) = &credentials.username {
            options.set("user", user.as_str());
        }
        if let Some(password) = &credentials.password {
            options.set("password", password.as_str());
        }
    }

    if profile.tls.enabled {
        tls_properties(&mut options, family, profile);
    }

    if profile.timeouts.connect_secs > 0 {
        options.set("connectTimeout", (profile.timeouts.connect_secs * 1000).to_string());
    }
    if profile.timeouts.socket_secs > 0 {
        options.set("socketTimeout", (profile.timeouts.socket_secs * 1000).to_string());
    }

    engine_defaults(&mut options, family, profile);

    for (key, value) in &profile.custom_properties {
        options.set(key.as_str(), value.as_str());
    }

    options
}

/// Apply session settings to a freshly opened connection.
///
/// Auto-commit is always set, isolation when named and read-only only when
/// requested. A default schema that the driver cannot select is retried with
/// `USE <schema>`; if that fails too the error is logged and ignored.
pub async fn apply_session_settings(conn: &dyn Connection, session: &SessionSettings) -> Result<()> {
    conn.set_auto_commit(session.auto_commit).await?;

    if let Some(name) = &session.isolation {
        conn.set_isolation_level(IsolationLevel::from_name(name))
            .await?;
    }

    if session.read_only {
        conn.set_read_only(true).await?;
    }

    if let Some(schema) = &session.default_schema {
        if let Err(e) = conn.set_schema(schema).await {
            tracing::debug!(schema = %schema, error = %e, "schema selection rejected, trying USE");
            if let Err(e) = conn.execute(&format!("USE {}", schema)).await {
                tracing::error!(
                    schema = %schema,
                    driver = %conn.driver_name(),
                    error = %e,
                    "failed to set default schema"
                );
            }
        }
    }

    Ok(())
}
