//! Draft invoice management and the line ledger.
//!
//! Lines are owned exclusively by their parent invoice and may only change
//! while the invoice is in draft. Every successful line mutation recomputes
//! the header totals before its transaction commits, so the header is never
//! observably inconsistent with the lines.

use crate::{
    db::DbPool,
    entities::{invoice, invoice_line, InvoiceStatus, LineKind},
    errors::BillingError,
    events::{Event, EventSender},
    services::{
        history::{self, NewHistoryEntry},
        load_invoice_for_update, totals,
    },
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, ModelTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionError, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateInvoiceRequest {
    pub patient_id: Uuid,
    #[validate(length(min = 3, max = 3, message = "Currency must be 3 characters"))]
    pub currency: String,
    pub issued_at: Option<DateTime<Utc>>,
    pub encounter_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct LineRequest {
    pub kind: LineKind,
    pub product_id: Option<Uuid>,
    #[validate(length(min = 1, message = "Description is required"))]
    pub description: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub discount_amount: Option<Decimal>,
    pub tax_amount: Option<Decimal>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdateLineRequest {
    pub description: Option<String>,
    pub quantity: Option<i32>,
    pub unit_price: Option<Decimal>,
    pub discount_amount: Option<Decimal>,
    pub tax_amount: Option<Decimal>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct InvoiceResponse {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub encounter_id: Option<Uuid>,
    pub invoice_number: Option<i64>,
    /// Display form, e.g. `INV-000042`; present once posted.
    pub invoice_number_display: Option<String>,
    pub currency: String,
    pub status: InvoiceStatus,
    pub subtotal: Decimal,
    pub total_discount: Decimal,
    pub total_tax: Decimal,
    pub total: Decimal,
    pub total_paid: Decimal,
    pub outstanding: Decimal,
    pub credit_balance: Decimal,
    pub issued_at: Option<DateTime<Utc>>,
    pub posted_at: Option<DateTime<Utc>>,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<invoice::Model> for InvoiceResponse {
    fn from(model: invoice::Model) -> Self {
        let status = model.status();
        Self {
            id: model.id,
            patient_id: model.patient_id,
            encounter_id: model.encounter_id,
            invoice_number: model.invoice_number,
            invoice_number_display: model.invoice_number.map(|n| format!("INV-{:06}", n)),
            currency: model.currency,
            status,
            subtotal: model.subtotal,
            total_discount: model.total_discount,
            total_tax: model.total_tax,
            total: model.total,
            total_paid: model.total_paid,
            outstanding: model.outstanding,
            credit_balance: model.credit_balance,
            issued_at: model.issued_at,
            posted_at: model.posted_at,
            version: model.version,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LineResponse {
    pub id: Uuid,
    pub line_number: i32,
    pub kind: LineKind,
    pub product_id: Option<Uuid>,
    pub description: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub discount_amount: Decimal,
    pub tax_amount: Decimal,
    pub net_amount: Decimal,
}

impl From<invoice_line::Model> for LineResponse {
    fn from(model: invoice_line::Model) -> Self {
        let kind = model.kind();
        Self {
            id: model.id,
            line_number: model.line_number,
            kind,
            product_id: model.product_id,
            description: model.description,
            quantity: model.quantity,
            unit_price: model.unit_price,
            discount_amount: model.discount_amount,
            tax_amount: model.tax_amount,
            net_amount: model.net_amount,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct InvoiceWithLines {
    pub invoice: InvoiceResponse,
    pub lines: Vec<LineResponse>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct InvoiceListResponse {
    pub invoices: Vec<InvoiceResponse>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

/// Rejects malformed line values before they reach storage.
fn validate_line_values(
    kind: LineKind,
    product_id: Option<Uuid>,
    quantity: i32,
    unit_price: Decimal,
    discount: Decimal,
    tax: Decimal,
) -> Result<(), BillingError> {
    if quantity <= 0 {
        return Err(BillingError::Validation(
            "quantity must be positive".to_string(),
        ));
    }
    if unit_price < Decimal::ZERO {
        return Err(BillingError::Validation(
            "unit_price must not be negative".to_string(),
        ));
    }
    if discount < Decimal::ZERO || tax < Decimal::ZERO {
        return Err(BillingError::Validation(
            "discount_amount and tax_amount must not be negative".to_string(),
        ));
    }
    if kind == LineKind::Product && product_id.is_none() {
        return Err(BillingError::Validation(
            "product lines require a product_id".to_string(),
        ));
    }
    Ok(())
}

fn ensure_draft(invoice: &invoice::Model) -> Result<(), BillingError> {
    let status = invoice.status();
    if status.is_frozen() {
        return Err(BillingError::ImmutableInvoice(format!(
            "invoice {} is {} and can no longer be edited",
            invoice.id,
            status.as_str()
        )));
    }
    Ok(())
}

fn unwrap_txn_err(e: TransactionError<BillingError>) -> BillingError {
    match e {
        TransactionError::Connection(db_err) => BillingError::DatabaseError(db_err),
        TransactionError::Transaction(err) => err,
    }
}

/// Service for draft invoices and their line ledger.
#[derive(Clone)]
pub struct InvoicingService {
    db: Arc<DbPool>,
    event_sender: EventSender,
}

impl InvoicingService {
    pub fn new(db: Arc<DbPool>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Creates a new draft invoice with zeroed totals.
    #[instrument(skip(self, request), fields(patient_id = %request.patient_id))]
    pub async fn create_draft(
        &self,
        tenant_id: Uuid,
        request: CreateInvoiceRequest,
    ) -> Result<InvoiceResponse, BillingError> {
        request
            .validate()
            .map_err(|e| BillingError::Validation(e.to_string()))?;

        let now = Utc::now();
        let model = invoice::ActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(tenant_id),
            patient_id: Set(request.patient_id),
            encounter_id: Set(request.encounter_id),
            invoice_number: Set(None),
            currency: Set(request.currency.to_uppercase()),
            status: Set(InvoiceStatus::Draft.as_str().to_string()),
            subtotal: Set(Decimal::ZERO),
            total_discount: Set(Decimal::ZERO),
            total_tax: Set(Decimal::ZERO),
            total: Set(Decimal::ZERO),
            total_paid: Set(Decimal::ZERO),
            outstanding: Set(Decimal::ZERO),
            credit_balance: Set(Decimal::ZERO),
            line_seq: Set(0),
            issued_at: Set(Some(request.issued_at.unwrap_or(now))),
            posted_at: Set(None),
            version: Set(1),
            created_at: Set(now),
            updated_at: Set(Some(now)),
        };

        let saved = model.insert(&*self.db).await?;
        info!(invoice_id = %saved.id, "draft invoice created");

        self.event_sender
            .send_or_log(Event::InvoiceDrafted {
                invoice_id: saved.id,
                tenant_id,
            })
            .await;

        Ok(saved.into())
    }

    /// Appends a line to a draft invoice and recomputes header totals.
    #[instrument(skip(self, request), fields(invoice_id = %invoice_id))]
    pub async fn add_line(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
        request: LineRequest,
        actor: Option<Uuid>,
    ) -> Result<LineResponse, BillingError> {
        request
            .validate()
            .map_err(|e| BillingError::Validation(e.to_string()))?;

        let line = self
            .db
            .transaction::<_, invoice_line::Model, BillingError>(move |txn| {
                Box::pin(async move {
                    let invoice = load_invoice_for_update(txn, tenant_id, invoice_id).await?;
                    ensure_draft(&invoice)?;

                    let discount = request.discount_amount.unwrap_or(Decimal::ZERO);
                    let tax = request.tax_amount.unwrap_or(Decimal::ZERO);
                    validate_line_values(
                        request.kind,
                        request.product_id,
                        request.quantity,
                        request.unit_price,
                        discount,
                        tax,
                    )?;

                    // Line numbers come from a monotonic per-invoice counter
                    // so removals never cause renumbering or reuse.
                    let line_number = invoice.line_seq + 1;
                    let now = Utc::now();

                    let line = invoice_line::ActiveModel {
                        id: Set(Uuid::new_v4()),
                        invoice_id: Set(invoice.id),
                        tenant_id: Set(tenant_id),
                        line_number: Set(line_number),
                        kind: Set(request.kind.as_str().to_string()),
                        product_id: Set(request.product_id),
                        description: Set(request.description.clone()),
                        quantity: Set(request.quantity),
                        unit_price: Set(request.unit_price),
                        discount_amount: Set(discount),
                        tax_amount: Set(tax),
                        net_amount: Set(totals::line_net(
                            request.quantity,
                            request.unit_price,
                            discount,
                            tax,
                        )),
                        created_at: Set(now),
                        updated_at: Set(None),
                    }
                    .insert(txn)
                    .await?;

                    let mut header: invoice::ActiveModel = invoice.into();
                    header.line_seq = Set(line_number);
                    header.version = Set(header.version.take().unwrap_or(1) + 1);
                    let updated = header.update(txn).await?;

                    totals::recompute_on(txn, updated).await?;

                    history::record(
                        txn,
                        NewHistoryEntry::line_event(
                            tenant_id,
                            invoice_id,
                            line.id,
                            "added",
                            Some(line.description.clone()),
                            actor,
                        ),
                    )
                    .await;

                    Ok(line)
                })
            })
            .await
            .map_err(unwrap_txn_err)?;

        info!(invoice_id = %invoice_id, line_id = %line.id, "line added");
        Ok(line.into())
    }

    /// Patches a draft invoice line and recomputes header totals.
    #[instrument(skip(self, patch), fields(invoice_id = %invoice_id, line_id = %line_id))]
    pub async fn update_line(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
        line_id: Uuid,
        patch: UpdateLineRequest,
        actor: Option<Uuid>,
    ) -> Result<LineResponse, BillingError> {
        let line = self
            .db
            .transaction::<_, invoice_line::Model, BillingError>(move |txn| {
                Box::pin(async move {
                    let invoice = load_invoice_for_update(txn, tenant_id, invoice_id).await?;
                    ensure_draft(&invoice)?;

                    let line = invoice_line::Entity::find_by_id(line_id)
                        .filter(invoice_line::Column::InvoiceId.eq(invoice_id))
                        .one(txn)
                        .await?
                        .ok_or_else(|| {
                            BillingError::NotFound(format!("line {} not found", line_id))
                        })?;

                    let kind = line.kind();
                    let quantity = patch.quantity.unwrap_or(line.quantity);
                    let unit_price = patch.unit_price.unwrap_or(line.unit_price);
                    let discount = patch.discount_amount.unwrap_or(line.discount_amount);
                    let tax = patch.tax_amount.unwrap_or(line.tax_amount);
                    validate_line_values(kind, line.product_id, quantity, unit_price, discount, tax)?;

                    let mut active: invoice_line::ActiveModel = line.into();
                    if let Some(description) = patch.description {
                        if description.is_empty() {
                            return Err(BillingError::Validation(
                                "description must not be empty".to_string(),
                            ));
                        }
                        active.description = Set(description);
                    }
                    active.quantity = Set(quantity);
                    active.unit_price = Set(unit_price);
                    active.discount_amount = Set(discount);
                    active.tax_amount = Set(tax);
                    active.net_amount = Set(totals::line_net(quantity, unit_price, discount, tax));
                    active.updated_at = Set(Some(Utc::now()));
                    let updated_line = active.update(txn).await?;

                    let mut header: invoice::ActiveModel = invoice.into();
                    header.version = Set(header.version.take().unwrap_or(1) + 1);
                    let header = header.update(txn).await?;
                    totals::recompute_on(txn, header).await?;

                    history::record(
                        txn,
                        NewHistoryEntry::line_event(
                            tenant_id,
                            invoice_id,
                            line_id,
                            "updated",
                            Some(updated_line.description.clone()),
                            actor,
                        ),
                    )
                    .await;

                    Ok(updated_line)
                })
            })
            .await
            .map_err(unwrap_txn_err)?;

        Ok(line.into())
    }

    /// Removes a line from a draft invoice. Surviving lines keep their
    /// numbers.
    #[instrument(skip(self), fields(invoice_id = %invoice_id, line_id = %line_id))]
    pub async fn remove_line(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
        line_id: Uuid,
        actor: Option<Uuid>,
    ) -> Result<(), BillingError> {
        self.db
            .transaction::<_, (), BillingError>(move |txn| {
                Box::pin(async move {
                    let invoice = load_invoice_for_update(txn, tenant_id, invoice_id).await?;
                    ensure_draft(&invoice)?;

                    let line = invoice_line::Entity::find_by_id(line_id)
                        .filter(invoice_line::Column::InvoiceId.eq(invoice_id))
                        .one(txn)
                        .await?
                        .ok_or_else(|| {
                            BillingError::NotFound(format!("line {} not found", line_id))
                        })?;

                    line.delete(txn).await?;

                    let mut header: invoice::ActiveModel = invoice.into();
                    header.version = Set(header.version.take().unwrap_or(1) + 1);
                    let header = header.update(txn).await?;
                    totals::recompute_on(txn, header).await?;

                    history::record(
                        txn,
                        NewHistoryEntry::line_event(
                            tenant_id,
                            invoice_id,
                            line_id,
                            "removed",
                            None,
                            actor,
                        ),
                    )
                    .await;
                    Ok(())
                })
            })
            .await
            .map_err(unwrap_txn_err)?;

        info!(invoice_id = %invoice_id, line_id = %line_id, "line removed");
        Ok(())
    }

    /// Fetches an invoice with its lines in stable line-number order.
    #[instrument(skip(self), fields(invoice_id = %invoice_id))]
    pub async fn get_invoice(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<InvoiceWithLines, BillingError> {
        let invoice = invoice::Entity::find_by_id(invoice_id)
            .filter(invoice::Column::TenantId.eq(tenant_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| BillingError::NotFound(format!("invoice {} not found", invoice_id)))?;

        let lines = invoice_line::Entity::find()
            .filter(invoice_line::Column::InvoiceId.eq(invoice_id))
            .order_by_asc(invoice_line::Column::LineNumber)
            .all(&*self.db)
            .await?;

        Ok(InvoiceWithLines {
            invoice: invoice.into(),
            lines: lines.into_iter().map(Into::into).collect(),
        })
    }

    /// Lists invoices for a tenant, newest first.
    #[instrument(skip(self))]
    pub async fn list_invoices(
        &self,
        tenant_id: Uuid,
        page: u64,
        per_page: u64,
    ) -> Result<InvoiceListResponse, BillingError> {
        let paginator = invoice::Entity::find()
            .filter(invoice::Column::TenantId.eq(tenant_id))
            .order_by_desc(invoice::Column::CreatedAt)
            .paginate(&*self.db, per_page.max(1));

        let total = paginator.num_items().await?;
        let invoices = paginator.fetch_page(page.saturating_sub(1)).await?;

        Ok(InvoiceListResponse {
            invoices: invoices.into_iter().map(Into::into).collect(),
            total,
            page,
            per_page,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn rejects_zero_and_negative_quantity() {
        for quantity in [0, -3] {
            let result = validate_line_values(
                LineKind::Service,
                None,
                quantity,
                dec!(10.00),
                Decimal::ZERO,
                Decimal::ZERO,
            );
            assert!(matches!(result, Err(BillingError::Validation(_))));
        }
    }

    #[test]
    fn rejects_negative_unit_price() {
        let result = validate_line_values(
            LineKind::FreeText,
            None,
            1,
            dec!(-0.01),
            Decimal::ZERO,
            Decimal::ZERO,
        );
        assert!(matches!(result, Err(BillingError::Validation(_))));
    }

    #[test]
    fn product_lines_require_a_product_reference() {
        let result = validate_line_values(
            LineKind::Product,
            None,
            1,
            dec!(5.00),
            Decimal::ZERO,
            Decimal::ZERO,
        );
        assert!(matches!(result, Err(BillingError::Validation(_))));
    }

    #[test]
    fn free_price_line_is_accepted() {
        let result = validate_line_values(
            LineKind::Service,
            None,
            2,
            Decimal::ZERO,
            Decimal::ZERO,
            Decimal::ZERO,
        );
        assert!(result.is_ok());
    }

    #[test]
    fn invoice_number_display_is_padded() {
        let mut model = invoice::Model {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            encounter_id: None,
            invoice_number: Some(42),
            currency: "USD".to_string(),
            status: "posted".to_string(),
            subtotal: Decimal::ZERO,
            total_discount: Decimal::ZERO,
            total_tax: Decimal::ZERO,
            total: Decimal::ZERO,
            total_paid: Decimal::ZERO,
            outstanding: Decimal::ZERO,
            credit_balance: Decimal::ZERO,
            line_seq: 0,
            issued_at: None,
            posted_at: None,
            version: 1,
            created_at: Utc::now(),
            updated_at: None,
        };
        let response: InvoiceResponse = model.clone().into();
        assert_eq!(response.invoice_number_display.as_deref(), Some("INV-000042"));

        model.invoice_number = None;
        let response: InvoiceResponse = model.into();
        assert_eq!(response.invoice_number_display, None);
    }
}
