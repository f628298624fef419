//! Invoice lifecycle routes: draft CRUD, line ledger edits, state
//! transitions and the audit trail.

use crate::{
    entities::invoice_history,
    errors::BillingError,
    handlers::common::{Actor, PaginationParams, TenantId},
    services::invoicing::{
        CreateInvoiceRequest, InvoiceListResponse, InvoiceResponse, InvoiceWithLines, LineRequest,
        LineResponse, UpdateLineRequest,
    },
    ApiResponse, AppState,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Single audit trail entry as exposed over the API.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HistoryEntryResponse {
    pub id: Uuid,
    pub entity_type: String,
    pub entity_id: Uuid,
    pub field: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub actor: Option<Uuid>,
    pub recorded_at: DateTime<Utc>,
}

impl From<invoice_history::Model> for HistoryEntryResponse {
    fn from(model: invoice_history::Model) -> Self {
        Self {
            id: model.id,
            entity_type: model.entity_type,
            entity_id: model.entity_id,
            field: model.field,
            old_value: model.old_value,
            new_value: model.new_value,
            actor: model.actor,
            recorded_at: model.recorded_at,
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/invoices",
    request_body = CreateInvoiceRequest,
    responses(
        (status = 201, description = "Draft invoice created", body = ApiResponse<InvoiceResponse>),
        (status = 422, description = "Validation failed")
    ),
    tag = "invoices"
)]
pub async fn create_invoice(
    State(state): State<AppState>,
    TenantId(tenant_id): TenantId,
    Json(payload): Json<CreateInvoiceRequest>,
) -> Result<impl IntoResponse, BillingError> {
    let invoice = state
        .services
        .invoicing
        .create_draft(tenant_id, payload)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success_with_message(
            invoice,
            "Invoice draft created",
        )),
    ))
}

#[utoipa::path(
    get,
    path = "/api/v1/invoices",
    params(PaginationParams),
    responses(
        (status = 200, description = "Invoices for the tenant", body = ApiResponse<InvoiceListResponse>)
    ),
    tag = "invoices"
)]
pub async fn list_invoices(
    State(state): State<AppState>,
    TenantId(tenant_id): TenantId,
    Query(pagination): Query<PaginationParams>,
) -> Result<Json<ApiResponse<InvoiceListResponse>>, BillingError> {
    let list = state
        .services
        .invoicing
        .list_invoices(tenant_id, pagination.page(), pagination.per_page())
        .await?;
    Ok(Json(ApiResponse::success(list)))
}

#[utoipa::path(
    get,
    path = "/api/v1/invoices/{id}",
    params(("id" = Uuid, Path, description = "Invoice id")),
    responses(
        (status = 200, description = "Invoice with its lines", body = ApiResponse<InvoiceWithLines>),
        (status = 404, description = "Invoice not found")
    ),
    tag = "invoices"
)]
pub async fn get_invoice(
    State(state): State<AppState>,
    TenantId(tenant_id): TenantId,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<InvoiceWithLines>>, BillingError> {
    let invoice = state.services.invoicing.get_invoice(tenant_id, id).await?;
    Ok(Json(ApiResponse::success(invoice)))
}

#[utoipa::path(
    post,
    path = "/api/v1/invoices/{id}/lines",
    params(("id" = Uuid, Path, description = "Invoice id")),
    request_body = LineRequest,
    responses(
        (status = 201, description = "Line added", body = ApiResponse<LineResponse>),
        (status = 409, description = "Invoice is not editable"),
        (status = 422, description = "Validation failed")
    ),
    tag = "invoices"
)]
pub async fn add_line(
    State(state): State<AppState>,
    TenantId(tenant_id): TenantId,
    Actor(actor): Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<LineRequest>,
) -> Result<impl IntoResponse, BillingError> {
    let line = state
        .services
        .invoicing
        .add_line(tenant_id, id, payload, actor)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(line))))
}

#[utoipa::path(
    patch,
    path = "/api/v1/invoices/{id}/lines/{line_id}",
    params(
        ("id" = Uuid, Path, description = "Invoice id"),
        ("line_id" = Uuid, Path, description = "Line id")
    ),
    request_body = UpdateLineRequest,
    responses(
        (status = 200, description = "Line updated", body = ApiResponse<LineResponse>),
        (status = 409, description = "Invoice is not editable")
    ),
    tag = "invoices"
)]
pub async fn update_line(
    State(state): State<AppState>,
    TenantId(tenant_id): TenantId,
    Actor(actor): Actor,
    Path((id, line_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<UpdateLineRequest>,
) -> Result<Json<ApiResponse<LineResponse>>, BillingError> {
    let line = state
        .services
        .invoicing
        .update_line(tenant_id, id, line_id, payload, actor)
        .await?;
    Ok(Json(ApiResponse::success(line)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/invoices/{id}/lines/{line_id}",
    params(
        ("id" = Uuid, Path, description = "Invoice id"),
        ("line_id" = Uuid, Path, description = "Line id")
    ),
    responses(
        (status = 200, description = "Line removed"),
        (status = 409, description = "Invoice is not editable")
    ),
    tag = "invoices"
)]
pub async fn remove_line(
    State(state): State<AppState>,
    TenantId(tenant_id): TenantId,
    Actor(actor): Actor,
    Path((id, line_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<ApiResponse<()>>, BillingError> {
    state
        .services
        .invoicing
        .remove_line(tenant_id, id, line_id, actor)
        .await?;
    Ok(Json(ApiResponse::success_with_message((), "Line removed")))
}

#[utoipa::path(
    post,
    path = "/api/v1/invoices/{id}/post",
    params(("id" = Uuid, Path, description = "Invoice id")),
    responses(
        (status = 200, description = "Invoice posted", body = ApiResponse<InvoiceResponse>),
        (status = 409, description = "Invoice cannot be posted")
    ),
    tag = "invoices"
)]
pub async fn post_invoice(
    State(state): State<AppState>,
    TenantId(tenant_id): TenantId,
    Actor(actor): Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<InvoiceResponse>>, BillingError> {
    let invoice = state.services.status.post(tenant_id, id, actor).await?;
    Ok(Json(ApiResponse::success_with_message(
        invoice,
        "Invoice posted",
    )))
}

#[utoipa::path(
    post,
    path = "/api/v1/invoices/{id}/cancel",
    params(("id" = Uuid, Path, description = "Invoice id")),
    responses(
        (status = 200, description = "Invoice cancelled", body = ApiResponse<InvoiceResponse>),
        (status = 409, description = "Only drafts can be cancelled")
    ),
    tag = "invoices"
)]
pub async fn cancel_invoice(
    State(state): State<AppState>,
    TenantId(tenant_id): TenantId,
    Actor(actor): Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<InvoiceResponse>>, BillingError> {
    let invoice = state.services.status.cancel(tenant_id, id, actor).await?;
    Ok(Json(ApiResponse::success_with_message(
        invoice,
        "Invoice cancelled",
    )))
}

#[utoipa::path(
    post,
    path = "/api/v1/invoices/{id}/void",
    params(("id" = Uuid, Path, description = "Invoice id")),
    responses(
        (status = 200, description = "Invoice voided", body = ApiResponse<InvoiceResponse>),
        (status = 409, description = "Only posted or paid invoices can be voided")
    ),
    tag = "invoices"
)]
pub async fn void_invoice(
    State(state): State<AppState>,
    TenantId(tenant_id): TenantId,
    Actor(actor): Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<InvoiceResponse>>, BillingError> {
    let invoice = state.services.status.void(tenant_id, id, actor).await?;
    Ok(Json(ApiResponse::success_with_message(
        invoice,
        "Invoice voided",
    )))
}

#[utoipa::path(
    get,
    path = "/api/v1/invoices/{id}/history",
    params(("id" = Uuid, Path, description = "Invoice id")),
    responses(
        (status = 200, description = "Audit trail, oldest first", body = ApiResponse<Vec<HistoryEntryResponse>>)
    ),
    tag = "invoices"
)]
pub async fn get_history(
    State(state): State<AppState>,
    TenantId(tenant_id): TenantId,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<HistoryEntryResponse>>>, BillingError> {
    let entries = state.services.history.get_history(tenant_id, id).await?;
    Ok(Json(ApiResponse::success(
        entries.into_iter().map(Into::into).collect(),
    )))
}
