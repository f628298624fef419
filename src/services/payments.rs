//! Payment allocation against posted invoices.
//!
//! Payments are append-only. Allocation updates the outstanding balance via
//! totals recomputation and drives the `posted → paid` transition (and back,
//! on reversal) through the state machine's transition table.

use crate::{
    db::DbPool,
    entities::{invoice, payment, InvoiceStatus},
    errors::BillingError,
    events::{Event, EventSender},
    services::{
        history::{self, NewHistoryEntry},
        invoice_status::can_transition,
        load_invoice_for_update, totals,
    },
};
use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use prometheus::{register_int_counter, IntCounter};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionError, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

lazy_static! {
    static ref PAYMENTS_RECORDED: IntCounter = register_int_counter!(
        "billing_payments_recorded_total",
        "Total number of payments recorded"
    )
    .expect("metric can be created");
    static ref PAYMENTS_REVERSED: IntCounter = register_int_counter!(
        "billing_payments_reversed_total",
        "Total number of payments reversed"
    )
    .expect("metric can be created");
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct RecordPaymentRequest {
    pub amount: Decimal,
    #[validate(length(min = 1, message = "Payment method is required"))]
    pub method: String,
    pub received_at: Option<DateTime<Utc>>,
    pub recorded_by: Option<Uuid>,
    /// Optional replay guard. A retried request with the same key returns
    /// the payment recorded by the first attempt instead of applying twice.
    #[validate(length(min = 1, message = "Idempotency key must not be empty"))]
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PaymentResponse {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub amount: Decimal,
    pub method: String,
    pub reversal_of: Option<Uuid>,
    pub received_at: DateTime<Utc>,
    pub recorded_by: Option<Uuid>,
    /// Invoice status after this payment was applied.
    pub invoice_status: InvoiceStatus,
    pub outstanding: Decimal,
    pub credit_balance: Decimal,
}

fn response(payment: payment::Model, invoice: &invoice::Model) -> PaymentResponse {
    PaymentResponse {
        id: payment.id,
        invoice_id: payment.invoice_id,
        amount: payment.amount,
        method: payment.method,
        reversal_of: payment.reversal_of,
        received_at: payment.received_at,
        recorded_by: payment.recorded_by,
        invoice_status: invoice.status(),
        outstanding: invoice.outstanding,
        credit_balance: invoice.credit_balance,
    }
}

fn unwrap_txn_err(e: TransactionError<BillingError>) -> BillingError {
    match e {
        TransactionError::Connection(db_err) => BillingError::DatabaseError(db_err),
        TransactionError::Transaction(err) => err,
    }
}

/// Applies the paid-state transition an allocation result calls for, writing
/// a history entry when the status actually changes.
async fn settle_status<C: ConnectionTrait>(
    conn: &C,
    invoice: invoice::Model,
    actor: Option<Uuid>,
) -> Result<invoice::Model, BillingError> {
    let current = invoice.status();
    let target = if invoice.outstanding == Decimal::ZERO {
        InvoiceStatus::Paid
    } else {
        InvoiceStatus::Posted
    };

    if current == target || !can_transition(current, target) {
        return Ok(invoice);
    }

    let tenant_id = invoice.tenant_id;
    let invoice_id = invoice.id;
    let old_status = invoice.status.clone();

    let mut active: invoice::ActiveModel = invoice.into();
    active.status = Set(target.as_str().to_string());
    active.version = Set(active.version.take().unwrap_or(1) + 1);
    active.updated_at = Set(Some(Utc::now()));
    let updated = active.update(conn).await?;

    history::record(
        conn,
        NewHistoryEntry::status_change(tenant_id, invoice_id, &old_status, target.as_str(), actor),
    )
    .await;

    Ok(updated)
}

#[derive(Clone)]
pub struct PaymentService {
    db: Arc<DbPool>,
    event_sender: EventSender,
}

impl PaymentService {
    pub fn new(db: Arc<DbPool>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Records a payment against a posted (or already paid) invoice and
    /// allocates it against the outstanding balance. Reaching zero
    /// outstanding transitions the invoice to `paid`.
    #[instrument(skip(self, request), fields(invoice_id = %invoice_id, amount = %request.amount))]
    pub async fn record_payment(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
        request: RecordPaymentRequest,
    ) -> Result<PaymentResponse, BillingError> {
        request
            .validate()
            .map_err(|e| BillingError::Validation(e.to_string()))?;
        if request.amount <= Decimal::ZERO {
            return Err(BillingError::Validation(
                "payment amount must be positive".to_string(),
            ));
        }

        let (saved, updated, replayed) = self
            .db
            .transaction::<_, (payment::Model, invoice::Model, bool), BillingError>(move |txn| {
                Box::pin(async move {
                    let invoice = load_invoice_for_update(txn, tenant_id, invoice_id).await?;

                    match invoice.status() {
                        InvoiceStatus::Posted | InvoiceStatus::Paid => {}
                        other => {
                            return Err(BillingError::InvalidState(format!(
                                "invoice {} is {}; payments require a posted invoice",
                                invoice_id,
                                other.as_str()
                            )));
                        }
                    }

                    // The invoice row lock serializes writers, so a keyed
                    // retry always observes the first attempt's row here.
                    if let Some(key) = request.idempotency_key.as_deref() {
                        let existing = payment::Entity::find()
                            .filter(payment::Column::TenantId.eq(tenant_id))
                            .filter(payment::Column::InvoiceId.eq(invoice_id))
                            .filter(payment::Column::IdempotencyKey.eq(key))
                            .one(txn)
                            .await?;
                        if let Some(existing) = existing {
                            return Ok((existing, invoice, true));
                        }
                    }

                    let actor = request.recorded_by;
                    let now = Utc::now();
                    let saved = payment::ActiveModel {
                        id: Set(Uuid::new_v4()),
                        invoice_id: Set(invoice_id),
                        tenant_id: Set(tenant_id),
                        amount: Set(request.amount),
                        method: Set(request.method.clone()),
                        reversal_of: Set(None),
                        received_at: Set(request.received_at.unwrap_or(now)),
                        recorded_by: Set(actor),
                        idempotency_key: Set(request.idempotency_key.clone()),
                        created_at: Set(now),
                    }
                    .insert(txn)
                    .await?;

                    let old_paid = invoice.total_paid;
                    let recomputed = totals::recompute_on(txn, invoice).await?;

                    history::record(
                        txn,
                        NewHistoryEntry::invoice_field(
                            tenant_id,
                            invoice_id,
                            "total_paid",
                            old_paid.to_string(),
                            recomputed.total_paid.to_string(),
                            actor,
                        ),
                    )
                    .await;

                    if recomputed.credit_balance > Decimal::ZERO {
                        warn!(
                            invoice_id = %invoice_id,
                            credit = %recomputed.credit_balance,
                            "payment exceeds invoice total; flagged as credit balance"
                        );
                    }

                    let updated = settle_status(txn, recomputed, actor).await?;

                    Ok((saved, updated, false))
                })
            })
            .await
            .map_err(unwrap_txn_err)?;

        if replayed {
            info!(
                payment_id = %saved.id,
                invoice_id = %invoice_id,
                "idempotency key seen before, returning the recorded payment"
            );
            return Ok(response(saved, &updated));
        }

        PAYMENTS_RECORDED.inc();
        info!(payment_id = %saved.id, invoice_id = %invoice_id, "payment recorded");

        self.event_sender
            .send_or_log(Event::PaymentRecorded {
                payment_id: saved.id,
                invoice_id,
                tenant_id,
                amount: saved.amount,
            })
            .await;
        if updated.status() == InvoiceStatus::Paid {
            self.event_sender
                .send_or_log(Event::InvoicePaid {
                    invoice_id,
                    tenant_id,
                })
                .await;
        }

        Ok(response(saved, &updated))
    }

    /// Reverses a payment by appending a negative compensating payment. The
    /// original row is never touched. May transition the invoice back from
    /// `paid` to `posted`.
    #[instrument(skip(self), fields(payment_id = %payment_id))]
    pub async fn reverse_payment(
        &self,
        tenant_id: Uuid,
        payment_id: Uuid,
        actor: Option<Uuid>,
    ) -> Result<PaymentResponse, BillingError> {
        let (reversal, updated, original_id) = self
            .db
            .transaction::<_, (payment::Model, invoice::Model, Uuid), BillingError>(move |txn| {
                Box::pin(async move {
                    let original = payment::Entity::find_by_id(payment_id)
                        .filter(payment::Column::TenantId.eq(tenant_id))
                        .one(txn)
                        .await?
                        .ok_or_else(|| {
                            BillingError::NotFound(format!("payment {} not found", payment_id))
                        })?;

                    if original.amount <= Decimal::ZERO {
                        return Err(BillingError::InvalidState(format!(
                            "payment {} is a reversal and cannot be reversed",
                            payment_id
                        )));
                    }

                    let already_reversed = payment::Entity::find()
                        .filter(payment::Column::ReversalOf.eq(payment_id))
                        .one(txn)
                        .await?;
                    if already_reversed.is_some() {
                        return Err(BillingError::InvalidState(format!(
                            "payment {} was already reversed",
                            payment_id
                        )));
                    }

                    let invoice =
                        load_invoice_for_update(txn, tenant_id, original.invoice_id).await?;

                    let now = Utc::now();
                    let reversal = payment::ActiveModel {
                        id: Set(Uuid::new_v4()),
                        invoice_id: Set(original.invoice_id),
                        tenant_id: Set(tenant_id),
                        amount: Set(-original.amount),
                        method: Set(original.method.clone()),
                        reversal_of: Set(Some(original.id)),
                        received_at: Set(now),
                        recorded_by: Set(actor),
                        idempotency_key: Set(None),
                        created_at: Set(now),
                    }
                    .insert(txn)
                    .await?;

                    let old_paid = invoice.total_paid;
                    let recomputed = totals::recompute_on(txn, invoice).await?;

                    history::record(
                        txn,
                        NewHistoryEntry::invoice_field(
                            tenant_id,
                            original.invoice_id,
                            "total_paid",
                            old_paid.to_string(),
                            recomputed.total_paid.to_string(),
                            actor,
                        ),
                    )
                    .await;

                    let updated = settle_status(txn, recomputed, actor).await?;

                    Ok((reversal, updated, original.id))
                })
            })
            .await
            .map_err(unwrap_txn_err)?;

        PAYMENTS_REVERSED.inc();
        info!(payment_id = %reversal.id, original_payment_id = %original_id, "payment reversed");

        self.event_sender
            .send_or_log(Event::PaymentReversed {
                payment_id: reversal.id,
                original_payment_id: original_id,
                invoice_id: reversal.invoice_id,
                tenant_id,
            })
            .await;

        Ok(response(reversal, &updated))
    }

    /// Lists payments for an invoice, oldest first.
    #[instrument(skip(self), fields(invoice_id = %invoice_id))]
    pub async fn list_payments(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<Vec<payment::Model>, BillingError> {
        let payments = payment::Entity::find()
            .filter(payment::Column::TenantId.eq(tenant_id))
            .filter(payment::Column::InvoiceId.eq(invoice_id))
            .order_by_asc(payment::Column::ReceivedAt)
            .all(&*self.db)
            .await?;
        Ok(payments)
    }
}
