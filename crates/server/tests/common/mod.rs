//! In-process test fixture for API integration tests.
//!
//! Builds the real router over SQLite stores in a temp directory, with a
//! [`MockActivationDriver`] standing in for the redemption sidecar.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use redeemer_core::{
    create_audit_system, create_authenticator, testing::MockActivationDriver, AuditFilter,
    AuditStore, AuthConfig, AuthMethod, Authenticator, Config, DatabaseConfig,
    FulfillmentConfig, FulfillmentOrchestrator, OrderStore, ServerConfig, SqliteAuditStore,
    SqliteOrderStore, SqliteStockLedger, SqliteWorkerRegistry, StockLedger, WorkerRegistry,
};

pub use redeemer_core::testing::fixtures;

/// Operator key used when a fixture is built with API key auth.
pub const TEST_API_KEY: &str = "test-operator-key";

pub struct TestFixture {
    pub router: Router,
    pub driver: Arc<MockActivationDriver>,
    pub ledger: Arc<dyn StockLedger>,
    pub workers: Arc<dyn WorkerRegistry>,
    pub audit_store: Arc<dyn AuditStore>,
    /// Sent as `X-API-Key` on every request when set.
    api_key: Option<String>,
    pub temp_dir: TempDir,
}

#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

/// Configuration for test fixture.
#[derive(Debug, Clone)]
pub struct TestConfig {
    /// Protect admin routes with [`TEST_API_KEY`].
    pub require_api_key: bool,
    /// Build an orchestrator over the mock driver.
    pub with_driver: bool,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            require_api_key: false,
            with_driver: true,
        }
    }
}

impl TestConfig {
    pub fn with_api_key() -> Self {
        Self {
            require_api_key: true,
            ..Default::default()
        }
    }

    pub fn without_driver() -> Self {
        Self {
            with_driver: false,
            ..Default::default()
        }
    }
}

impl TestFixture {
    pub async fn new() -> Self {
        Self::with_config(TestConfig::default()).await
    }

    pub async fn with_config(test_config: TestConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");

        let auth = if test_config.require_api_key {
            AuthConfig {
                method: AuthMethod::ApiKey,
                api_key: Some(TEST_API_KEY.to_string()),
            }
        } else {
            AuthConfig {
                method: AuthMethod::None,
                api_key: None,
            }
        };

        let fulfillment = FulfillmentConfig {
            auto_fulfill_delay_secs: 0,
            activation_timeout_secs: 5,
            ..Default::default()
        };

        let config = Config {
            auth: auth.clone(),
            server: ServerConfig {
                host: std::net::IpAddr::V4(std::net::Ipv4Addr::LOCALHOST),
                port: 0,
            },
            database: DatabaseConfig {
                path: db_path.clone(),
                ..Default::default()
            },
            fulfillment: fulfillment.clone(),
            driver: None,
        };

        let authenticator: Arc<dyn Authenticator> =
            Arc::from(create_authenticator(&auth).expect("Failed to create authenticator"));
        let audit_store: Arc<dyn AuditStore> =
            Arc::new(SqliteAuditStore::new(&db_path).expect("Failed to create audit store"));
        let ledger: Arc<dyn StockLedger> =
            Arc::new(SqliteStockLedger::new(&db_path).expect("Failed to create ledger"));
        let order_store: Arc<dyn OrderStore> =
            Arc::new(SqliteOrderStore::new(&db_path).expect("Failed to create order store"));
        let workers: Arc<dyn WorkerRegistry> = Arc::new(
            SqliteWorkerRegistry::new(&db_path).expect("Failed to create worker registry"),
        );

        let (audit_handle, audit_writer) = create_audit_system(Arc::clone(&audit_store), 100);
        tokio::spawn(audit_writer.run());

        let driver = Arc::new(MockActivationDriver::new());
        let orchestrator = test_config.with_driver.then(|| {
            Arc::new(FulfillmentOrchestrator::new(
                fulfillment,
                Arc::clone(&ledger),
                Arc::clone(&order_store),
                Arc::clone(&workers),
                Arc::clone(&driver) as Arc<dyn redeemer_core::ActivationDriver>,
                Some(audit_handle.clone()),
            ))
        });

        let state = Arc::new(redeemer_server::state::AppState::new(
            config,
            authenticator,
            audit_handle,
            Arc::clone(&audit_store),
            Arc::clone(&ledger),
            order_store,
            Arc::clone(&workers),
            orchestrator,
        ));

        let router = redeemer_server::api::create_router(state);

        Self {
            router,
            driver,
            ledger,
            workers,
            audit_store,
            api_key: test_config
                .require_api_key
                .then(|| TEST_API_KEY.to_string()),
            temp_dir,
        }
    }

    /// Stock the ledger directly with one code per value.
    pub fn seed_stock(&self, values: &[u32]) {
        self.ledger
            .import(&fixtures::code_batch(values))
            .expect("Failed to seed stock");
    }

    /// Register active workers directly.
    pub fn seed_workers(&self, identities: &[&str]) {
        for identity in identities {
            self.workers
                .add(fixtures::worker(identity))
                .expect("Failed to add worker");
        }
    }

    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None, self.api_key.as_deref()).await
    }

    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body), self.api_key.as_deref())
            .await
    }

    /// POST without a JSON body.
    pub async fn post_empty(&self, path: &str) -> TestResponse {
        self.request("POST", path, None, self.api_key.as_deref()).await
    }

    /// GET with no credentials, regardless of fixture auth.
    pub async fn get_anonymous(&self, path: &str) -> TestResponse {
        self.request("GET", path, None, None).await
    }

    /// POST with no credentials, regardless of fixture auth.
    pub async fn post_anonymous(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body), None).await
    }

    /// GET returning the raw body text (for non-JSON endpoints).
    pub async fn get_text(&self, path: &str) -> String {
        let request = Request::builder()
            .method("GET")
            .uri(path)
            .body(Body::empty())
            .unwrap();
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    /// Poll the audit store until `count` events of `event_type` are written.
    pub async fn wait_for_audit(&self, event_type: &str, count: i64) -> bool {
        let filter = AuditFilter::new().with_event_type(event_type);
        for _ in 0..50 {
            if self.audit_store.count(&filter).unwrap_or(0) >= count {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }

    async fn request(
        &self,
        method: &str,
        path: &str,
        body: Option<Value>,
        api_key: Option<&str>,
    ) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        if let Some(key) = api_key {
            request_builder = request_builder.header("X-API-Key", key);
        }

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        let request = request_builder.body(body).unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body }
    }
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status,
            $response.status,
            serde_json::to_string_pretty(&$response.body).unwrap_or_default()
        );
    };
}
