use super::*;
use async_trait::async_trait;
use dbport_core::{ConnectionOptions, DatabaseDriver, IsolationLevel, PoolHints};
use dbport_drivers::DriverLoader;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

struct ScriptedConnection {
    closed: AtomicBool,
    statements: Mutex<Vec<String>>,
    fail_validate: bool,
}

#[async_trait]
impl Connection for ScriptedConnection {
    fn driver_name(&self) -> &str {
        "scripted"
    }

    async fn execute(&self, sql: &str) -> Result<u64> {
        self.statements.lock().push(sql.to_string());
        if self.fail_validate && sql == TEST_QUERY {
            return Err(DbPortError::Query("relation does not exist".into()));
        }
        Ok(0)
    }

    async fn set_auto_commit(&self, enabled: bool) -> Result<()> {
        self.statements.lock().push(format!("autocommit={}", enabled));
        Ok(())
    }

    async fn set_read_only(&self, read_only: bool) -> Result<()> {
        self.statements.lock().push(format!("read_only={}", read_only));
        Ok(())
    }

    async fn set_isolation_level(&self, level: IsolationLevel) -> Result<()> {
        self.statements.lock().push(format!("isolation={}", level));
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
struct ScriptedDriver {
    urls: Mutex<Vec<String>>,
    options: Mutex<Vec<ConnectionOptions>>,
    opened: Mutex<Vec<Arc<ScriptedConnection>>>,
    delay: Option<Duration>,
    fail_validate: bool,
}

impl ScriptedDriver {
    fn opened(&self) -> Vec<Arc<ScriptedConnection>> {
        self.opened.lock().clone()
    }

    fn last_url(&self) -> Option<String> {
        self.urls.lock().last().cloned()
    }

    fn last_options(&self) -> Option<ConnectionOptions> {
        self.options.lock().last().cloned()
    }
}

#[async_trait]
impl DatabaseDriver for ScriptedDriver {
    fn name(&self) -> &str {
        "scripted"
    }

    fn accepts_url(&self, _url: &str) -> bool {
        true
    }

    async fn connect(&self, url: &str, options: &ConnectionOptions) -> Result<Arc<dyn Connection>> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.urls.lock().push(url.to_string());
        self.options.lock().push(options.clone());
        let conn = Arc::new(ScriptedConnection {
            closed: AtomicBool::new(false),
            statements: Mutex::new(Vec::new()),
            fail_validate: self.fail_validate,
        });
        self.opened.lock().push(conn.clone());
        Ok(conn)
    }
}

/// Loader handing out a fixed driver and remembering requested artifacts
struct FixedLoader {
    driver: Arc<ScriptedDriver>,
    artifacts: Mutex<Vec<PathBuf>>,
    loads: AtomicUsize,
}

impl DriverLoader for FixedLoader {
    fn load(&self, descriptor: &DriverDescriptor) -> Result<Arc<dyn dbport_core::DatabaseDriver>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.artifacts.lock().push(descriptor.artifact_path.clone());
        Ok(self.driver.clone())
    }
}

struct Fixture {
    engine: ConnectivityEngine,
    postgres: Arc<ScriptedDriver>,
    custom: Arc<ScriptedDriver>,
    loader: Arc<FixedLoader>,
    descriptors: Arc<InMemoryDescriptorStore>,
}

fn fixture_with(postgres: ScriptedDriver, credentials: Arc<dyn CredentialStore>) -> Fixture {
    let postgres = Arc::new(postgres);
    let custom = Arc::new(ScriptedDriver::default());
    let loader = Arc::new(FixedLoader {
        driver: custom.clone(),
        artifacts: Mutex::new(Vec::new()),
        loads: AtomicUsize::new(0),
    });
    let descriptors = Arc::new(InMemoryDescriptorStore::new());

    let mut drivers = DriverRegistry::new(loader.clone());
    drivers.register_builtin(BuiltinEngine::Postgres, postgres.clone());

    let engine = ConnectivityEngine::builder()
        .drivers(drivers)
        .descriptor_store(descriptors.clone())
        .credential_store(credentials)
        .settings(EngineSettings {
            drivers_dir: PathBuf::from("/srv/dbport/drivers"),
            ..Default::default()
        })
        .build();

    Fixture {
        engine,
        postgres,
        custom,
        loader,
        descriptors,
    }
}

fn fixture() -> Fixture {
    fixture_with(ScriptedDriver::default(), Arc::new(NoCredentials))
}

fn pg_profile(id: &str) -> ConnectionProfile {
    ConnectionProfile::new("postgresql", "pg.internal", 5432, "app")
        .with_id(id)
        .with_credentials("app", "secret")
        .with_pool_hints(PoolHints {
            max_size: Some(2),
            min_idle: Some(1),
            ..Default::default()
        })
}

#[tokio::test]
async fn test_adhoc_connect_generates_id_and_applies_session() {
    let f = fixture();
    let mut profile = pg_profile("unused");
    profile.id = None;

    let id = f
        .engine
        .connect(&profile, ConnectMode::AdHoc)
        .await
        .expect("connect");

    assert!(Uuid::parse_str(&id).is_ok());
    assert!(f.engine.connection(&id).is_some());
    assert!(f.engine.pool_statistics(&id).is_none());
    assert_eq!(f.postgres.last_url().as_deref(), Some("postgresql://pg.internal:5432/app"));

    let opened = f.postgres.opened();
    assert_eq!(
        opened[0].statements.lock().clone(),
        vec!["autocommit=true".to_string(), "isolation=READ COMMITTED".to_string()]
    );
}

#[tokio::test]
async fn test_pooled_connect_and_acquire() {
    let f = fixture();

    let id = f
        .engine
        .connect(&pg_profile("orders"), ConnectMode::Pooled)
        .await
        .expect("connect");
    assert_eq!(id, "orders");

    let stats = f.engine.pool_statistics("orders").expect("pool stats");
    assert_eq!(stats.idle, 1);

    let conn = f.engine.acquire("orders").await.expect("acquire");
    assert_eq!(conn.driver_name(), "scripted");
    assert_eq!(f.engine.pool_statistics("orders").map(|s| s.active), Some(1));
    assert!(f.engine.connection("orders").is_none());
}

#[tokio::test]
async fn test_one_strategy_per_id() {
    let f = fixture();
    let profile = pg_profile("shared");

    f.engine.connect(&profile, ConnectMode::AdHoc).await.expect("adhoc");
    let adhoc = f.engine.connection("shared").expect("registered");

    f.engine.connect(&profile, ConnectMode::Pooled).await.expect("pooled");
    assert!(adhoc.is_closed());
    assert!(f.engine.connection("shared").is_none());
    assert!(f.engine.pool_statistics("shared").is_some());

    f.engine.connect(&profile, ConnectMode::AdHoc).await.expect("adhoc again");
    assert!(f.engine.pool_statistics("shared").is_none());
    assert!(f.engine.connection("shared").is_some());
}

#[tokio::test]
async fn test_reconnect_adhoc_closes_previous() {
    let f = fixture();
    let profile = pg_profile("again");

    f.engine.connect(&profile, ConnectMode::AdHoc).await.expect("first");
    f.engine.connect(&profile, ConnectMode::AdHoc).await.expect("second");

    let opened = f.postgres.opened();
    assert_eq!(opened.len(), 2);
    assert!(opened[0].is_closed());
    assert!(!opened[1].is_closed());
}

#[tokio::test]
async fn test_disconnect() {
    let f = fixture();

    f.engine.connect(&pg_profile("a"), ConnectMode::AdHoc).await.expect("a");
    f.engine.connect(&pg_profile("b"), ConnectMode::Pooled).await.expect("b");

    f.engine.disconnect("a").await;
    f.engine.disconnect("b").await;
    f.engine.disconnect("never-connected").await;
    f.engine.disconnect("a").await;

    assert!(f.engine.connection("a").is_none());
    assert!(f.engine.pool_statistics("b").is_none());
    assert!(f.postgres.opened().iter().all(|c| c.is_closed()));

    let err = f.engine.acquire("b").await.expect_err("pool gone");
    assert!(matches!(err, DbPortError::NotFound(_)));
}

#[tokio::test]
async fn test_engine_errors() {
    let f = fixture();

    let profile = ConnectionProfile::new("cassandra", "h", 9042, "ks");
    let err = f
        .engine
        .connect(&profile, ConnectMode::AdHoc)
        .await
        .expect_err("unknown engine");
    assert!(matches!(err, DbPortError::UnsupportedEngine(_)));

    let profile = ConnectionProfile::new("oracle", "h", 1521, "XE");
    let err = f
        .engine
        .connect(&profile, ConnectMode::AdHoc)
        .await
        .expect_err("unlinked engine");
    assert!(matches!(err, DbPortError::DriverLoad { .. }));
}

#[tokio::test]
async fn test_custom_driver_connect() {
    let f = fixture();
    f.descriptors.insert(DriverDescriptor::new(
        "vendor",
        "Vendor DB",
        "vendor/libvendor.so",
        "vendor_driver_create",
        "vendor://{host}:{port}/{database}?zone={zone}",
    ));

    let profile = ConnectionProfile::new("vendordb", "v.internal", 7000, "main")
        .with_custom_driver("vendor")
        .with_param("zone", "eu")
        .with_param("trace", "1");

    f.engine
        .connect(&profile, ConnectMode::AdHoc)
        .await
        .expect("connect");
    f.engine
        .connect(&profile.clone().with_id("second"), ConnectMode::AdHoc)
        .await
        .expect("connect again");

    assert_eq!(
        f.custom.last_url().as_deref(),
        Some("vendor://v.internal:7000/main?zone=eu&trace=1")
    );
    assert_eq!(f.loader.loads.load(Ordering::SeqCst), 1);
    assert_eq!(
        f.loader.artifacts.lock().clone(),
        vec![PathBuf::from("/srv/dbport/drivers/vendor/libvendor.so")]
    );
    assert!(f.engine.drivers().is_loaded("vendor"));

    assert!(f.engine.forget_custom_driver("vendor"));
    assert!(!f.engine.drivers().is_loaded("vendor"));
}

#[tokio::test]
async fn test_custom_driver_without_descriptor() {
    let f = fixture();
    let profile = ConnectionProfile::new("vendordb", "h", 1, "d").with_custom_driver("ghost");

    let err = f
        .engine
        .connect(&profile, ConnectMode::AdHoc)
        .await
        .expect_err("missing descriptor");
    assert!(matches!(err, DbPortError::DriverLoad { ref driver_id, .. } if driver_id == "ghost"));
}

#[tokio::test]
async fn test_register_custom_driver() {
    let f = fixture();
    let descriptor = DriverDescriptor::new("x", "X", "/abs/libx.so", "x_create", "x://{host}");

    let first = f.engine.register_custom_driver(&descriptor).await.expect("register");
    let second = f.engine.register_custom_driver(&descriptor).await.expect("register");

    assert!(first.same_as(&second));
    assert!(first.is_custom());
    assert_eq!(f.loader.artifacts.lock().clone(), vec![PathBuf::from("/abs/libx.so")]);
}

struct StaticCredentials;

impl CredentialStore for StaticCredentials {
    fn credentials(&self, connection_id: &str) -> Option<Credentials> {
        (connection_id == "vaulted").then(|| Credentials::new("vault-user", "vault-pass"))
    }
}

#[tokio::test]
async fn test_credentials_from_store() {
    let f = fixture_with(ScriptedDriver::default(), Arc::new(StaticCredentials));
    let mut profile = pg_profile("vaulted");
    profile.credentials = None;

    f.engine.connect(&profile, ConnectMode::AdHoc).await.expect("adhoc");
    let options = f.postgres.last_options().expect("connected");
    assert_eq!(options.get("user"), Some("vault-user"));
    assert_eq!(options.get("password"), Some("vault-pass"));

    f.engine.connect(&profile, ConnectMode::Pooled).await.expect("pooled");
    let options = f.postgres.last_options().expect("connected");
    assert_eq!(options.get("user"), Some("vault-user"));

    // profile credentials win over the store
    f.engine
        .connect(&pg_profile("vaulted"), ConnectMode::AdHoc)
        .await
        .expect("adhoc");
    assert_eq!(f.postgres.last_options().and_then(|o| o.get("user").map(String::from)), Some("app".into()));
}

#[tokio::test(start_paused = true)]
async fn test_connect_timeout() {
    let slow = ScriptedDriver {
        delay: Some(Duration::from_secs(60)),
        ..Default::default()
    };
    let f = fixture_with(slow, Arc::new(NoCredentials));
    let mut profile = pg_profile("slow");
    profile.timeouts.connect_secs = 2;

    let err = f
        .engine
        .connect(&profile, ConnectMode::AdHoc)
        .await
        .expect_err("timeout");
    assert!(err.is_timeout());
    assert!(f.engine.connection("slow").is_none());
}

#[tokio::test]
async fn test_test_connection() {
    let f = fixture();
    f.engine
        .test_connection(&pg_profile("ping"))
        .await
        .expect("ping");

    let opened = f.postgres.opened();
    assert_eq!(opened.len(), 1);
    assert!(opened[0].is_closed());
    assert_eq!(opened[0].statements.lock().clone(), vec![TEST_QUERY.to_string()]);
    assert!(f.engine.connection("ping").is_none());

    let failing = fixture_with(
        ScriptedDriver {
            fail_validate: true,
            ..Default::default()
        },
        Arc::new(NoCredentials),
    );
    let err = failing
        .engine
        .test_connection(&pg_profile("ping"))
        .await
        .expect_err("validation fails");
    assert!(matches!(err, DbPortError::Query(_)));
    assert!(failing.postgres.opened()[0].is_closed());
}

#[tokio::test]
async fn test_supported_engines_and_shutdown() {
    let f = fixture();
    assert_eq!(f.engine.supported_engines(), vec![BuiltinEngine::Postgres]);

    f.engine.connect(&pg_profile("a"), ConnectMode::AdHoc).await.expect("a");
    f.engine.connect(&pg_profile("b"), ConnectMode::Pooled).await.expect("b");

    f.engine.shutdown().await;

    assert!(f.engine.connection("a").is_none());
    assert!(f.engine.all_pool_statistics().is_empty());
    assert!(f.postgres.opened().iter().all(|c| c.is_closed()));
}

#[tokio::test]
async fn test_custom_properties_override_credentials() {
    let f = fixture_with(ScriptedDriver::default(), Arc::new(StaticCredentials));
    let profile = pg_profile("props").with_property("password", "override");

    f.engine.connect(&profile, ConnectMode::AdHoc).await.expect("adhoc");
    let options = f.postgres.last_options().expect("connected");
    assert_eq!(options.get("user"), Some("app"));
    assert_eq!(options.get("password"), Some("override"));

    f.engine.connect(&profile, ConnectMode::Pooled).await.expect("pooled");
    let options = f.postgres.last_options().expect("connected");
    assert_eq!(options.get("password"), Some("override"));

    // the same holds for credentials taken from the store
    let mut vaulted = pg_profile("vaulted").with_property("user", "reporting");
    vaulted.credentials = None;
    f.engine.connect(&vaulted, ConnectMode::AdHoc).await.expect("adhoc");
    let options = f.postgres.last_options().expect("connected");
    assert_eq!(options.get("user"), Some("reporting"));
    assert_eq!(options.get("password"), Some("vault-pass"));
}

#[tokio::test]
async fn test_pooled_connect_with_only_max_size_hint() {
    let f = fixture();
    let mut profile = pg_profile("tiny");
    profile.pool = PoolHints {
        max_size: Some(1),
        ..Default::default()
    };

    f.engine.connect(&profile, ConnectMode::Pooled).await.expect("pooled");

    let stats = f.engine.pool_statistics("tiny").expect("pool stats");
    assert_eq!(stats.total, 1);
    assert_eq!(stats.idle, 1);
}

#[tokio::test]
async fn test_id_locks_are_released() {
    let f = fixture();
    let mut profile = pg_profile("unused");
    profile.id = None;

    let id = f.engine.connect(&profile, ConnectMode::AdHoc).await.expect("adhoc");
    assert!(f.engine.id_locks.lock().is_empty());

    let mut broken = pg_profile("broken");
    broken.pool.max_size = Some(0);
    f.engine
        .connect(&broken, ConnectMode::Pooled)
        .await
        .expect_err("zero max_size");
    assert!(f.engine.id_locks.lock().is_empty());

    f.engine.disconnect(&id).await;
    f.engine.disconnect("never-connected").await;
    assert!(f.engine.id_locks.lock().is_empty());
}

#[tokio::test]
async fn test_connection_metadata() {
    let f = fixture();
    f.engine.connect(&pg_profile("a"), ConnectMode::AdHoc).await.expect("a");
    f.engine.connect(&pg_profile("b"), ConnectMode::Pooled).await.expect("b");

    let adhoc = f.engine.connection_metadata("a").await.expect("adhoc metadata");
    assert_eq!(adhoc.driver_name, "scripted");
    assert!(adhoc.supports_transactions);

    let pooled = f.engine.connection_metadata("b").await.expect("pooled metadata");
    assert_eq!(pooled.product_name, "scripted");
    assert_eq!(f.engine.pool_statistics("b").map(|s| s.active), Some(0));

    let err = f
        .engine
        .connection_metadata("ghost")
        .await
        .expect_err("nothing registered");
    assert!(matches!(err, DbPortError::NotFound(_)));

    f.engine.connection("a").expect("registered").close().await.expect("close");
    let err = f.engine.connection_metadata("a").await.expect_err("closed");
    assert!(err.is_already_closed());
}

#[tokio::test(start_paused = true)]
async fn test_pooled_timeout_closes_previous_pool_first() {
    let slow = ScriptedDriver {
        delay: Some(Duration::from_secs(60)),
        ..Default::default()
    };
    let f = fixture_with(slow, Arc::new(NoCredentials));

    let mut profile = pg_profile("slow-pool");
    profile.timeouts.connect_secs = 0;
    f.engine.connect(&profile, ConnectMode::Pooled).await.expect("first pool");
    let first = f.postgres.opened();
    assert_eq!(first.len(), 1);

    profile.timeouts.connect_secs = 2;
    let err = f
        .engine
        .connect(&profile, ConnectMode::Pooled)
        .await
        .expect_err("warm-up timeout");

    assert!(err.is_timeout());
    assert!(first[0].is_closed());
    assert!(f.engine.pool_statistics("slow-pool").is_none());
    assert!(f.engine.id_locks.lock().is_empty());
}
