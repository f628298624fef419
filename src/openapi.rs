use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    errors::ErrorDetail,
    handlers::{invoices::HistoryEntryResponse, payments::PaymentSummary},
    services::{
        invoicing::{
            CreateInvoiceRequest, InvoiceListResponse, InvoiceResponse, InvoiceWithLines,
            LineRequest, LineResponse, UpdateLineRequest,
        },
        payments::{PaymentResponse, RecordPaymentRequest},
    },
};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "CliniBill API",
        version = "1.0.0",
        description = r#"
# CliniBill Invoice & Ledger API

Invoice lifecycle and payment allocation for a multi-tenant clinical ERP.

## Tenancy

Every request is scoped by the `X-Tenant-Id` header (a UUID). An optional
`X-Actor-Id` header attributes state changes in the audit trail.

## Invoice lifecycle

Invoices start as mutable drafts, receive a gap-free invoice number when
posted, and are immutable afterwards. Corrections happen through voiding
(compensating stock entries) and payment reversals, never through edits.

## Error handling

Failures return an envelope with a machine-readable error kind:

```json
{
  "success": false,
  "data": null,
  "message": null,
  "error": { "kind": "invalid_state", "message": "invoice ... is void" }
}
```
        "#
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    paths(
        crate::handlers::invoices::create_invoice,
        crate::handlers::invoices::list_invoices,
        crate::handlers::invoices::get_invoice,
        crate::handlers::invoices::add_line,
        crate::handlers::invoices::update_line,
        crate::handlers::invoices::remove_line,
        crate::handlers::invoices::post_invoice,
        crate::handlers::invoices::cancel_invoice,
        crate::handlers::invoices::void_invoice,
        crate::handlers::invoices::get_history,
        crate::handlers::payments::record_payment,
        crate::handlers::payments::list_payments,
        crate::handlers::payments::reverse_payment,
    ),
    components(schemas(
        ErrorDetail,
        CreateInvoiceRequest,
        LineRequest,
        UpdateLineRequest,
        InvoiceResponse,
        LineResponse,
        InvoiceWithLines,
        InvoiceListResponse,
        RecordPaymentRequest,
        PaymentResponse,
        PaymentSummary,
        HistoryEntryResponse,
    )),
    tags(
        (name = "invoices", description = "Invoice lifecycle and line ledger"),
        (name = "payments", description = "Payment recording and reversal")
    )
)]
pub struct ApiDoc;

/// Swagger UI mounted at `/docs`, serving the spec at `/api-docs/openapi.json`.
pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi())
}
