use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::error::DbErr;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Typed error detail returned inside the response envelope.
///
/// Billing UI actions never see a thrown exception: every failure crosses
/// the boundary as a `kind` + human-readable message.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error kind (e.g. "validation", "immutable_invoice")
    #[schema(example = "invalid_state")]
    pub kind: String,
    /// Human-readable error description
    #[schema(example = "invoice 550e8400-e29b-41d4-a716-446655440000 is not in draft")]
    pub message: String,
}

/// Error taxonomy of the billing engine.
#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Invoice is immutable: {0}")]
    ImmutableInvoice(String),

    #[error("Incomplete invoice: {0}")]
    IncompleteInvoice(String),

    #[error("Concurrent modification: {0}")]
    ConcurrencyConflict(String),

    #[error("Insufficient stock: {0}")]
    InsufficientStock(String),

    #[error("Event error: {0}")]
    EventError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BillingError {
    /// Stable machine-readable discriminant for the API boundary.
    pub fn kind(&self) -> &'static str {
        match self {
            BillingError::DatabaseError(_) => "database",
            BillingError::NotFound(_) => "not_found",
            BillingError::Validation(_) => "validation",
            BillingError::InvalidState(_) => "invalid_state",
            BillingError::ImmutableInvoice(_) => "immutable_invoice",
            BillingError::IncompleteInvoice(_) => "incomplete_invoice",
            BillingError::ConcurrencyConflict(_) => "concurrency_conflict",
            BillingError::InsufficientStock(_) => "insufficient_stock",
            BillingError::EventError(_) => "event",
            BillingError::Internal(_) => "internal",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            BillingError::NotFound(_) => StatusCode::NOT_FOUND,
            BillingError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            BillingError::InvalidState(_)
            | BillingError::ImmutableInvoice(_)
            | BillingError::IncompleteInvoice(_)
            | BillingError::ConcurrencyConflict(_)
            | BillingError::InsufficientStock(_) => StatusCode::CONFLICT,
            BillingError::DatabaseError(_)
            | BillingError::EventError(_)
            | BillingError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to surface to clients. Infrastructure details stay in
    /// the logs.
    pub fn response_message(&self) -> String {
        match self {
            BillingError::DatabaseError(_) | BillingError::Internal(_) => {
                "internal server error".to_string()
            }
            other => other.to_string(),
        }
    }

    pub fn detail(&self) -> ErrorDetail {
        ErrorDetail {
            kind: self.kind().to_string(),
            message: self.response_message(),
        }
    }
}

impl IntoResponse for BillingError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "request failed");
        }
        let body = crate::ApiResponse::<()>::failure(self.detail());
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_errors_map_to_conflict() {
        for err in [
            BillingError::InvalidState("x".into()),
            BillingError::ImmutableInvoice("x".into()),
            BillingError::IncompleteInvoice("x".into()),
            BillingError::ConcurrencyConflict("x".into()),
            BillingError::InsufficientStock("x".into()),
        ] {
            assert_eq!(err.status_code(), StatusCode::CONFLICT);
        }
    }

    #[test]
    fn database_detail_is_opaque() {
        let err = BillingError::DatabaseError(DbErr::Custom("secret dsn".into()));
        assert_eq!(err.kind(), "database");
        assert!(!err.response_message().contains("secret"));
    }

    #[test]
    fn validation_is_unprocessable() {
        let err = BillingError::Validation("quantity must be positive".into());
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.detail().kind, "validation");
    }
}
