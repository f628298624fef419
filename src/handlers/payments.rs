//! Payment routes: record, list and reverse.

use crate::{
    entities::payment,
    errors::BillingError,
    handlers::common::{Actor, TenantId},
    services::payments::{PaymentResponse, RecordPaymentRequest},
    ApiResponse, AppState,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Payment row as listed under an invoice. Reversals show up as negative
/// amounts pointing at the original payment.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PaymentSummary {
    pub id: Uuid,
    pub amount: Decimal,
    pub method: String,
    pub reversal_of: Option<Uuid>,
    pub received_at: DateTime<Utc>,
    pub recorded_by: Option<Uuid>,
}

impl From<payment::Model> for PaymentSummary {
    fn from(model: payment::Model) -> Self {
        Self {
            id: model.id,
            amount: model.amount,
            method: model.method,
            reversal_of: model.reversal_of,
            received_at: model.received_at,
            recorded_by: model.recorded_by,
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/invoices/{id}/payments",
    params(("id" = Uuid, Path, description = "Invoice id")),
    request_body = RecordPaymentRequest,
    responses(
        (status = 201, description = "Payment recorded", body = ApiResponse<PaymentResponse>),
        (status = 409, description = "Invoice is not posted"),
        (status = 422, description = "Validation failed")
    ),
    tag = "payments"
)]
pub async fn record_payment(
    State(state): State<AppState>,
    TenantId(tenant_id): TenantId,
    Path(id): Path<Uuid>,
    Json(payload): Json<RecordPaymentRequest>,
) -> Result<impl IntoResponse, BillingError> {
    let payment = state
        .services
        .payments
        .record_payment(tenant_id, id, payload)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success_with_message(
            payment,
            "Payment recorded",
        )),
    ))
}

#[utoipa::path(
    get,
    path = "/api/v1/invoices/{id}/payments",
    params(("id" = Uuid, Path, description = "Invoice id")),
    responses(
        (status = 200, description = "Payments for the invoice, oldest first", body = ApiResponse<Vec<PaymentSummary>>)
    ),
    tag = "payments"
)]
pub async fn list_payments(
    State(state): State<AppState>,
    TenantId(tenant_id): TenantId,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<PaymentSummary>>>, BillingError> {
    let payments = state.services.payments.list_payments(tenant_id, id).await?;
    Ok(Json(ApiResponse::success(
        payments.into_iter().map(Into::into).collect(),
    )))
}

#[utoipa::path(
    post,
    path = "/api/v1/payments/{id}/reverse",
    params(("id" = Uuid, Path, description = "Payment id")),
    responses(
        (status = 201, description = "Compensating payment created", body = ApiResponse<PaymentResponse>),
        (status = 409, description = "Payment cannot be reversed")
    ),
    tag = "payments"
)]
pub async fn reverse_payment(
    State(state): State<AppState>,
    TenantId(tenant_id): TenantId,
    Actor(actor): Actor,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, BillingError> {
    let reversal = state
        .services
        .payments
        .reverse_payment(tenant_id, id, actor)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success_with_message(
            reversal,
            "Payment reversed",
        )),
    ))
}
