pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod migrator;
pub mod openapi;
pub mod services;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::ToSchema;

use crate::errors::{BillingError, ErrorDetail};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<db::DbPool>,
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub services: handlers::AppServices,
}

/// Uniform response envelope for every billing endpoint.
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub error: Option<ErrorDetail>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            error: None,
        }
    }

    pub fn success_with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: Some(message.into()),
            error: None,
        }
    }

    pub fn failure(error: ErrorDetail) -> Self {
        Self {
            success: false,
            data: None,
            message: None,
            error: Some(error),
        }
    }
}

pub type ApiResult<T> = Result<Json<ApiResponse<T>>, BillingError>;

/// Billing API under `/api/v1`.
pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .route("/status", get(api_status))
        .route("/health", get(health_check))
        .route(
            "/invoices",
            post(handlers::invoices::create_invoice).get(handlers::invoices::list_invoices),
        )
        .route("/invoices/:id", get(handlers::invoices::get_invoice))
        .route("/invoices/:id/lines", post(handlers::invoices::add_line))
        .route(
            "/invoices/:id/lines/:line_id",
            patch(handlers::invoices::update_line).delete(handlers::invoices::remove_line),
        )
        .route("/invoices/:id/post", post(handlers::invoices::post_invoice))
        .route(
            "/invoices/:id/cancel",
            post(handlers::invoices::cancel_invoice),
        )
        .route("/invoices/:id/void", post(handlers::invoices::void_invoice))
        .route("/invoices/:id/history", get(handlers::invoices::get_history))
        .route(
            "/invoices/:id/payments",
            post(handlers::payments::record_payment).get(handlers::payments::list_payments),
        )
        .route(
            "/payments/:id/reverse",
            post(handlers::payments::reverse_payment),
        )
}

/// Full application router: root, metrics, versioned API and Swagger UI.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { "clinibill-api up" }))
        .route("/health", get(health_check))
        .route(
            "/health/ready",
            get(|| async { Json(serde_json::json!({ "status": "up" })) }),
        )
        .route("/metrics", get(metrics_handler))
        .nest("/api/v1", api_v1_routes())
        .merge(openapi::swagger_ui())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn api_status() -> ApiResult<Value> {
    Ok(Json(ApiResponse::success(json!({
        "status": "ok",
        "service": "clinibill-api",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))))
}

async fn health_check(State(state): State<AppState>) -> ApiResult<Value> {
    let db_status = match state.db.ping().await {
        Ok(_) => "healthy",
        Err(_) => "unhealthy",
    };

    Ok(Json(ApiResponse::success(json!({
        "status": db_status,
        "checks": { "database": db_status },
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))))
}

async fn metrics_handler() -> Result<String, StatusCode> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    String::from_utf8(buffer).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

#[cfg(test)]
mod response_tests {
    use super::*;

    #[test]
    fn success_envelope_has_no_error() {
        let resp = ApiResponse::success("ok");
        assert!(resp.success);
        assert_eq!(resp.data, Some("ok"));
        assert!(resp.error.is_none());
    }

    #[test]
    fn failure_envelope_carries_detail() {
        let resp = ApiResponse::<()>::failure(ErrorDetail {
            kind: "validation".into(),
            message: "bad input".into(),
        });
        assert!(!resp.success);
        assert!(resp.data.is_none());
        assert_eq!(resp.error.map(|e| e.kind), Some("validation".to_string()));
    }
}
