//! Stock ledger synchronization.
//!
//! Invoked only by the invoice state machine, inside the same transaction as
//! the status transition, so a stock failure rolls the whole posting back.
//! Application is idempotent: ledger entries are keyed by invoice line and
//! direction, so a retried posting never double-decrements stock.

use crate::{
    entities::{
        invoice, invoice_line, product,
        stock_ledger_entry::{self, MovementDirection},
        stock_level, LineKind,
    },
    errors::BillingError,
};
use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DbBackend, EntityTrait,
    QueryFilter, QuerySelect, Set,
};
use tracing::debug;
use uuid::Uuid;

/// Writes one negative-delta ledger entry per stockable line of a posting
/// invoice and decrements the tracked on-hand level. Returns the entries
/// written in this call (already-applied lines are skipped).
pub async fn apply_posting<C: ConnectionTrait>(
    conn: &C,
    invoice: &invoice::Model,
    lines: &[invoice_line::Model],
    hard_enforcement: bool,
) -> Result<Vec<stock_ledger_entry::Model>, BillingError> {
    let mut written = Vec::new();

    for line in lines {
        if line.kind() != LineKind::Product {
            continue;
        }
        let Some(product_id) = line.product_id else {
            continue;
        };

        let product = product::Entity::find_by_id(product_id)
            .filter(product::Column::TenantId.eq(invoice.tenant_id))
            .one(conn)
            .await?
            .ok_or_else(|| {
                BillingError::NotFound(format!(
                    "product {} referenced by line {} not found",
                    product_id, line.id
                ))
            })?;

        if !product.stockable {
            continue;
        }

        // Idempotency: a posting entry for this line means it was applied.
        let existing = stock_ledger_entry::Entity::find()
            .filter(stock_ledger_entry::Column::InvoiceLineId.eq(line.id))
            .filter(
                stock_ledger_entry::Column::Direction.eq(MovementDirection::Posting.as_str()),
            )
            .one(conn)
            .await?;
        if existing.is_some() {
            debug!(line_id = %line.id, "stock already applied for line, skipping");
            continue;
        }

        if hard_enforcement {
            // Lock the level row so two invoices for the same product cannot
            // both pass the check against the same snapshot.
            let on_hand =
                on_hand_for_update(conn, invoice.tenant_id, product_id, &product.stock_location)
                    .await?;
            if on_hand < line.quantity {
                return Err(BillingError::InsufficientStock(format!(
                    "product {} has {} on hand at {}, line {} needs {}",
                    product.sku, on_hand, product.stock_location, line.line_number, line.quantity
                )));
            }
        }

        let entry = stock_ledger_entry::ActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(invoice.tenant_id),
            product_id: Set(product_id),
            location: Set(product.stock_location.clone()),
            quantity_delta: Set(-line.quantity),
            invoice_id: Set(invoice.id),
            invoice_line_id: Set(line.id),
            direction: Set(MovementDirection::Posting.as_str().to_string()),
            created_at: Set(Utc::now()),
        }
        .insert(conn)
        .await?;

        adjust_level(
            conn,
            invoice.tenant_id,
            product_id,
            &product.stock_location,
            -line.quantity,
        )
        .await?;

        written.push(entry);
    }

    Ok(written)
}

/// Appends one compensating entry per original posting entry of the invoice.
/// The originals are never edited or deleted.
pub async fn apply_reversal<C: ConnectionTrait>(
    conn: &C,
    invoice: &invoice::Model,
) -> Result<Vec<stock_ledger_entry::Model>, BillingError> {
    let postings = stock_ledger_entry::Entity::find()
        .filter(stock_ledger_entry::Column::InvoiceId.eq(invoice.id))
        .filter(stock_ledger_entry::Column::Direction.eq(MovementDirection::Posting.as_str()))
        .all(conn)
        .await?;

    let mut written = Vec::new();

    for original in postings {
        let already_reversed = stock_ledger_entry::Entity::find()
            .filter(stock_ledger_entry::Column::InvoiceLineId.eq(original.invoice_line_id))
            .filter(
                stock_ledger_entry::Column::Direction.eq(MovementDirection::Reversal.as_str()),
            )
            .one(conn)
            .await?;
        if already_reversed.is_some() {
            continue;
        }

        let entry = stock_ledger_entry::ActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(original.tenant_id),
            product_id: Set(original.product_id),
            location: Set(original.location.clone()),
            quantity_delta: Set(-original.quantity_delta),
            invoice_id: Set(original.invoice_id),
            invoice_line_id: Set(original.invoice_line_id),
            direction: Set(MovementDirection::Reversal.as_str().to_string()),
            created_at: Set(Utc::now()),
        }
        .insert(conn)
        .await?;

        adjust_level(
            conn,
            original.tenant_id,
            original.product_id,
            &original.location,
            -original.quantity_delta,
        )
        .await?;

        written.push(entry);
    }

    Ok(written)
}

/// Reads the on-hand level under a row lock. SQLite serializes writers on
/// its own and rejects locking clauses, so the lock is only emitted on
/// Postgres. A missing row reads as zero; nothing exists to lock yet, but
/// the hard-enforcement check fails such a row for any positive quantity.
async fn on_hand_for_update<C: ConnectionTrait>(
    conn: &C,
    tenant_id: Uuid,
    product_id: Uuid,
    location: &str,
) -> Result<i32, BillingError> {
    let mut query = stock_level::Entity::find()
        .filter(stock_level::Column::TenantId.eq(tenant_id))
        .filter(stock_level::Column::ProductId.eq(product_id))
        .filter(stock_level::Column::Location.eq(location));

    if conn.get_database_backend() == DbBackend::Postgres {
        query = query.lock_exclusive();
    }

    Ok(query.one(conn).await?.map(|l| l.on_hand).unwrap_or(0))
}

/// Applies the delta in place (`on_hand = on_hand + delta`) so concurrent
/// postings of different invoices never overwrite each other's adjustment
/// with a stale read.
async fn adjust_level<C: ConnectionTrait>(
    conn: &C,
    tenant_id: Uuid,
    product_id: Uuid,
    location: &str,
    delta: i32,
) -> Result<(), BillingError> {
    let updated = stock_level::Entity::update_many()
        .col_expr(
            stock_level::Column::OnHand,
            Expr::col(stock_level::Column::OnHand).add(delta),
        )
        .col_expr(stock_level::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(stock_level::Column::TenantId.eq(tenant_id))
        .filter(stock_level::Column::ProductId.eq(product_id))
        .filter(stock_level::Column::Location.eq(location))
        .exec(conn)
        .await?;

    if updated.rows_affected == 0 {
        // First movement for this product/location. Concurrent first inserts
        // collide on the primary key and the loser rolls back.
        stock_level::ActiveModel {
            tenant_id: Set(tenant_id),
            product_id: Set(product_id),
            location: Set(location.to_string()),
            on_hand: Set(delta),
            updated_at: Set(Utc::now()),
        }
        .insert(conn)
        .await?;
    }

    Ok(())
}
