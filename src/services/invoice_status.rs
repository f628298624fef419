//! Invoice state machine.
//!
//! `draft → posted → {paid, cancelled, void}`. Posting happens exactly once,
//! assigns the gap-free invoice number, freezes the lines and drives the
//! stock synchronizer inside the same transaction. Void/cancel never delete
//! anything; reversal is always a compensating record.

use crate::{
    db::DbPool,
    entities::{invoice, invoice_line, invoice_sequence, tenant, InvoiceStatus},
    errors::BillingError,
    events::{Event, EventSender},
    services::{
        history::{self, NewHistoryEntry},
        invoicing::InvoiceResponse,
        load_invoice_for_update, stock_sync,
    },
};
use chrono::Utc;
use lazy_static::lazy_static;
use prometheus::{register_int_counter, IntCounter};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbBackend, EntityTrait, QueryFilter,
    QuerySelect, Set, TransactionError, TransactionTrait,
};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

lazy_static! {
    static ref INVOICE_POSTINGS: IntCounter = register_int_counter!(
        "billing_invoice_postings_total",
        "Total number of invoices posted"
    )
    .expect("metric can be created");
    static ref POSTING_FAILURES: IntCounter = register_int_counter!(
        "billing_invoice_posting_failures_total",
        "Total number of failed invoice postings"
    )
    .expect("metric can be created");
    static ref INVOICE_VOIDS: IntCounter = register_int_counter!(
        "billing_invoice_voids_total",
        "Total number of invoices voided"
    )
    .expect("metric can be created");
}

/// Allowed transitions. `paid → posted` exists only for payment reversals.
pub fn can_transition(from: InvoiceStatus, to: InvoiceStatus) -> bool {
    use InvoiceStatus::*;
    matches!(
        (from, to),
        (Draft, Posted) | (Draft, Cancelled) | (Posted, Paid) | (Posted, Void) | (Paid, Void)
            | (Paid, Posted)
    )
}

/// Draws the next gap-free number from the tenant's serialized counter.
/// The sequence row stays locked until the surrounding transaction ends.
async fn next_invoice_number<C: ConnectionTrait>(
    conn: &C,
    tenant_id: Uuid,
) -> Result<i64, BillingError> {
    let mut query =
        invoice_sequence::Entity::find().filter(invoice_sequence::Column::TenantId.eq(tenant_id));
    if conn.get_database_backend() == DbBackend::Postgres {
        query = query.lock_exclusive();
    }

    match query.one(conn).await? {
        Some(seq) => {
            let number = seq.next_number;
            let mut active: invoice_sequence::ActiveModel = seq.into();
            active.next_number = Set(number + 1);
            active.updated_at = Set(Utc::now());
            active.update(conn).await?;
            Ok(number)
        }
        None => {
            invoice_sequence::ActiveModel {
                tenant_id: Set(tenant_id),
                next_number: Set(2),
                updated_at: Set(Utc::now()),
            }
            .insert(conn)
            .await?;
            Ok(1)
        }
    }
}

fn unwrap_txn_err(e: TransactionError<BillingError>) -> BillingError {
    match e {
        TransactionError::Connection(db_err) => BillingError::DatabaseError(db_err),
        TransactionError::Transaction(err) => err,
    }
}

#[derive(Clone)]
pub struct InvoiceStatusService {
    db: Arc<DbPool>,
    event_sender: EventSender,
}

impl InvoiceStatusService {
    pub fn new(db: Arc<DbPool>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Posts a draft invoice: validates preconditions, assigns the invoice
    /// number, writes stock ledger entries and flips the status, all in one
    /// transaction. Posting a second time fails cleanly without touching
    /// stock again.
    #[instrument(skip(self), fields(invoice_id = %invoice_id))]
    pub async fn post(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
        actor: Option<Uuid>,
    ) -> Result<InvoiceResponse, BillingError> {
        let result = self
            .db
            .transaction::<_, invoice::Model, BillingError>(move |txn| {
                Box::pin(async move {
                    let invoice = load_invoice_for_update(txn, tenant_id, invoice_id).await?;

                    match invoice.status() {
                        InvoiceStatus::Draft => {}
                        InvoiceStatus::Posted | InvoiceStatus::Paid => {
                            return Err(BillingError::ConcurrencyConflict(format!(
                                "invoice {} was already posted",
                                invoice_id
                            )));
                        }
                        other => {
                            return Err(BillingError::InvalidState(format!(
                                "invoice {} is {} and cannot be posted",
                                invoice_id,
                                other.as_str()
                            )));
                        }
                    }

                    let lines = invoice_line::Entity::find()
                        .filter(invoice_line::Column::InvoiceId.eq(invoice_id))
                        .all(txn)
                        .await?;
                    if lines.is_empty() {
                        return Err(BillingError::IncompleteInvoice(format!(
                            "invoice {} has no lines",
                            invoice_id
                        )));
                    }
                    if invoice.issued_at.is_none() {
                        return Err(BillingError::IncompleteInvoice(format!(
                            "invoice {} has no issue date",
                            invoice_id
                        )));
                    }
                    if invoice.currency.len() != 3 {
                        return Err(BillingError::IncompleteInvoice(format!(
                            "invoice {} has no valid currency",
                            invoice_id
                        )));
                    }
                    if invoice.total < Decimal::ZERO || invoice.subtotal < Decimal::ZERO {
                        return Err(BillingError::IncompleteInvoice(format!(
                            "invoice {} has negative totals",
                            invoice_id
                        )));
                    }

                    let hard_enforcement = tenant::Entity::find_by_id(tenant_id)
                        .one(txn)
                        .await?
                        .map(|t| t.hard_stock_enforcement)
                        .unwrap_or(false);

                    let number = next_invoice_number(txn, tenant_id).await?;
                    stock_sync::apply_posting(txn, &invoice, &lines, hard_enforcement).await?;

                    let old_status = invoice.status.clone();
                    let mut active: invoice::ActiveModel = invoice.into();
                    active.status = Set(InvoiceStatus::Posted.as_str().to_string());
                    active.invoice_number = Set(Some(number));
                    active.posted_at = Set(Some(Utc::now()));
                    active.version = Set(active.version.take().unwrap_or(1) + 1);
                    active.updated_at = Set(Some(Utc::now()));
                    let updated = active.update(txn).await?;

                    history::record(
                        txn,
                        NewHistoryEntry::status_change(
                            tenant_id,
                            invoice_id,
                            &old_status,
                            InvoiceStatus::Posted.as_str(),
                            actor,
                        ),
                    )
                    .await;

                    Ok(updated)
                })
            })
            .await
            .map_err(unwrap_txn_err);

        let posted = match result {
            Ok(model) => model,
            Err(e) => {
                POSTING_FAILURES.inc();
                return Err(e);
            }
        };

        INVOICE_POSTINGS.inc();
        info!(
            invoice_id = %posted.id,
            invoice_number = posted.invoice_number.unwrap_or_default(),
            "invoice posted"
        );

        self.event_sender
            .send_or_log(Event::InvoicePosted {
                invoice_id: posted.id,
                tenant_id,
                invoice_number: posted.invoice_number.unwrap_or_default(),
                total: posted.total,
            })
            .await;

        Ok(posted.into())
    }

    /// Cancels a draft invoice. Nothing was ever committed, so there is no
    /// stock or ledger impact.
    #[instrument(skip(self), fields(invoice_id = %invoice_id))]
    pub async fn cancel(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
        actor: Option<Uuid>,
    ) -> Result<InvoiceResponse, BillingError> {
        let cancelled = self
            .db
            .transaction::<_, invoice::Model, BillingError>(move |txn| {
                Box::pin(async move {
                    let invoice = load_invoice_for_update(txn, tenant_id, invoice_id).await?;

                    if !can_transition(invoice.status(), InvoiceStatus::Cancelled) {
                        return Err(BillingError::InvalidState(format!(
                            "invoice {} is {} and cannot be cancelled",
                            invoice_id,
                            invoice.status
                        )));
                    }

                    let old_status = invoice.status.clone();
                    let mut active: invoice::ActiveModel = invoice.into();
                    active.status = Set(InvoiceStatus::Cancelled.as_str().to_string());
                    active.version = Set(active.version.take().unwrap_or(1) + 1);
                    active.updated_at = Set(Some(Utc::now()));
                    let updated = active.update(txn).await?;

                    history::record(
                        txn,
                        NewHistoryEntry::status_change(
                            tenant_id,
                            invoice_id,
                            &old_status,
                            InvoiceStatus::Cancelled.as_str(),
                            actor,
                        ),
                    )
                    .await;

                    Ok(updated)
                })
            })
            .await
            .map_err(unwrap_txn_err)?;

        self.event_sender
            .send_or_log(Event::InvoiceCancelled {
                invoice_id: cancelled.id,
                tenant_id,
            })
            .await;

        Ok(cancelled.into())
    }

    /// Voids a posted or paid invoice, appending compensating stock ledger
    /// entries. Lines and payments remain untouched for audit.
    #[instrument(skip(self), fields(invoice_id = %invoice_id))]
    pub async fn void(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
        actor: Option<Uuid>,
    ) -> Result<InvoiceResponse, BillingError> {
        let (voided, reversal_count) = self
            .db
            .transaction::<_, (invoice::Model, usize), BillingError>(move |txn| {
                Box::pin(async move {
                    let invoice = load_invoice_for_update(txn, tenant_id, invoice_id).await?;

                    if !can_transition(invoice.status(), InvoiceStatus::Void) {
                        return Err(BillingError::InvalidState(format!(
                            "invoice {} is {} and cannot be voided",
                            invoice_id,
                            invoice.status
                        )));
                    }

                    let reversals = stock_sync::apply_reversal(txn, &invoice).await?;

                    let old_status = invoice.status.clone();
                    let mut active: invoice::ActiveModel = invoice.into();
                    active.status = Set(InvoiceStatus::Void.as_str().to_string());
                    active.version = Set(active.version.take().unwrap_or(1) + 1);
                    active.updated_at = Set(Some(Utc::now()));
                    let updated = active.update(txn).await?;

                    history::record(
                        txn,
                        NewHistoryEntry::status_change(
                            tenant_id,
                            invoice_id,
                            &old_status,
                            InvoiceStatus::Void.as_str(),
                            actor,
                        ),
                    )
                    .await;

                    Ok((updated, reversals.len()))
                })
            })
            .await
            .map_err(unwrap_txn_err)?;

        INVOICE_VOIDS.inc();
        info!(invoice_id = %voided.id, reversal_count, "invoice voided");

        self.event_sender
            .send_or_log(Event::InvoiceVoided {
                invoice_id: voided.id,
                tenant_id,
                reversal_count,
            })
            .await;

        Ok(voided.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(InvoiceStatus::Draft, InvoiceStatus::Posted, true; "draft posts")]
    #[test_case(InvoiceStatus::Draft, InvoiceStatus::Cancelled, true; "draft cancels")]
    #[test_case(InvoiceStatus::Posted, InvoiceStatus::Paid, true; "posted pays")]
    #[test_case(InvoiceStatus::Posted, InvoiceStatus::Void, true; "posted voids")]
    #[test_case(InvoiceStatus::Paid, InvoiceStatus::Void, true; "paid voids")]
    #[test_case(InvoiceStatus::Paid, InvoiceStatus::Posted, true; "reversal reopens")]
    #[test_case(InvoiceStatus::Draft, InvoiceStatus::Paid, false; "draft cannot pay")]
    #[test_case(InvoiceStatus::Posted, InvoiceStatus::Draft, false; "posting is one way")]
    #[test_case(InvoiceStatus::Cancelled, InvoiceStatus::Posted, false; "cancelled is terminal")]
    #[test_case(InvoiceStatus::Void, InvoiceStatus::Posted, false; "void is terminal")]
    #[test_case(InvoiceStatus::Posted, InvoiceStatus::Cancelled, false; "posted cannot cancel")]
    fn transition_table(from: InvoiceStatus, to: InvoiceStatus, expected: bool) {
        assert_eq!(can_transition(from, to), expected);
    }

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            InvoiceStatus::Draft,
            InvoiceStatus::Posted,
            InvoiceStatus::Paid,
            InvoiceStatus::Cancelled,
            InvoiceStatus::Void,
        ] {
            assert_eq!(InvoiceStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(InvoiceStatus::from_str("open"), None);
    }
}
