// Not every integration binary exercises every helper.
#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, Set};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

use clinibill_api::{
    config::AppConfig,
    db,
    entities::{product, tenant},
    events,
    handlers::AppServices,
    AppState,
};

/// Test harness backed by a fresh SQLite database in a temp directory.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    _event_task: tokio::task::JoinHandle<()>,
    _db_dir: TempDir,
}

impl TestApp {
    /// Construct a new test application with fresh database state.
    pub async fn new() -> Self {
        let db_dir = tempfile::tempdir().expect("create temp dir for test db");
        let db_path = db_dir.path().join("billing_test.db");

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_path.display()),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.db_max_connections = 1;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let db_arc = Arc::new(pool);
        let (event_sender, event_rx) = events::channel(256);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let services = AppServices::new(db_arc.clone(), event_sender.clone());

        let state = AppState {
            db: db_arc,
            config: cfg,
            event_sender,
            services,
        };

        let router = clinibill_api::app(state.clone());

        Self {
            router,
            state,
            _event_task: event_task,
            _db_dir: db_dir,
        }
    }

    /// Inserts a tenant row and returns its id.
    pub async fn seed_tenant(&self, hard_stock_enforcement: bool) -> Uuid {
        let id = Uuid::new_v4();
        tenant::ActiveModel {
            id: Set(id),
            name: Set("General Hospital".to_string()),
            currency: Set("USD".to_string()),
            hard_stock_enforcement: Set(hard_stock_enforcement),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed tenant");
        id
    }

    /// Inserts a catalog product for a tenant and returns its id.
    pub async fn seed_product(
        &self,
        tenant_id: Uuid,
        sku: &str,
        stockable: bool,
        unit_price: Decimal,
    ) -> Uuid {
        let id = Uuid::new_v4();
        product::ActiveModel {
            id: Set(id),
            tenant_id: Set(tenant_id),
            sku: Set(sku.to_string()),
            name: Set(format!("Product {}", sku)),
            stockable: Set(stockable),
            stock_location: Set("main".to_string()),
            unit_price: Set(unit_price),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed product");
        id
    }

    async fn request(
        &self,
        method: Method,
        uri: &str,
        tenant_id: Uuid,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("x-tenant-id", tenant_id.to_string());

        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string())),
            None => {
                builder = builder.header("content-type", "application/json");
                builder.body(Body::empty())
            }
        }
        .expect("build request");

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("send request");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read response body");
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("parse response json")
        };
        (status, json)
    }

    pub async fn get(&self, uri: &str, tenant_id: Uuid) -> (StatusCode, Value) {
        self.request(Method::GET, uri, tenant_id, None).await
    }

    pub async fn post(&self, uri: &str, tenant_id: Uuid, body: Value) -> (StatusCode, Value) {
        self.request(Method::POST, uri, tenant_id, Some(body)).await
    }

    pub async fn post_empty(&self, uri: &str, tenant_id: Uuid) -> (StatusCode, Value) {
        self.request(Method::POST, uri, tenant_id, None).await
    }

    pub async fn patch(&self, uri: &str, tenant_id: Uuid, body: Value) -> (StatusCode, Value) {
        self.request(Method::PATCH, uri, tenant_id, Some(body))
            .await
    }

    pub async fn delete(&self, uri: &str, tenant_id: Uuid) -> (StatusCode, Value) {
        self.request(Method::DELETE, uri, tenant_id, None).await
    }
}

/// Extracts `data` from the response envelope, panicking on failure bodies.
pub fn data(body: &Value) -> &Value {
    assert_eq!(
        body["success"], true,
        "expected success envelope, got: {}",
        body
    );
    &body["data"]
}

/// Parses a decimal field from a JSON response. Scale varies by database
/// backend, so callers compare values, not strings.
pub fn dec_of(value: &Value) -> Decimal {
    value
        .as_str()
        .and_then(|s| s.parse::<Decimal>().ok())
        .or_else(|| value.as_f64().and_then(Decimal::from_f64_retain))
        .unwrap_or_else(|| panic!("not a decimal: {}", value))
}

/// Extracts the error kind from a failure envelope.
pub fn error_kind(body: &Value) -> &str {
    assert_eq!(
        body["success"], false,
        "expected failure envelope, got: {}",
        body
    );
    body["error"]["kind"].as_str().expect("error kind present")
}
