//! Header totals derivation.
//!
//! Totals are a pure function of the current lines and payments, recomputed
//! inside the same transaction as whichever mutation triggered it. Calling
//! it redundantly is safe.

use crate::{
    entities::{invoice, invoice_line, payment},
    errors::BillingError,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set};

/// Line-level totals summed over an invoice's current lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TotalsSummary {
    pub subtotal: Decimal,
    pub total_discount: Decimal,
    pub total_tax: Decimal,
    pub total: Decimal,
}

impl TotalsSummary {
    pub fn from_lines(lines: &[invoice_line::Model]) -> Self {
        let subtotal: Decimal = lines
            .iter()
            .map(|l| l.unit_price * Decimal::from(l.quantity))
            .sum();
        let total_discount: Decimal = lines.iter().map(|l| l.discount_amount).sum();
        let total_tax: Decimal = lines.iter().map(|l| l.tax_amount).sum();

        Self {
            subtotal,
            total_discount,
            total_tax,
            total: subtotal - total_discount + total_tax,
        }
    }
}

/// Outstanding balance and credit derived from total vs. paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settlement {
    pub outstanding: Decimal,
    pub credit_balance: Decimal,
}

/// Floors outstanding at zero; an overpayment surfaces as a credit balance
/// instead of being clamped away.
pub fn settle(total: Decimal, total_paid: Decimal) -> Settlement {
    let raw = total - total_paid;
    if raw >= Decimal::ZERO {
        Settlement {
            outstanding: raw,
            credit_balance: Decimal::ZERO,
        }
    } else {
        Settlement {
            outstanding: Decimal::ZERO,
            credit_balance: -raw,
        }
    }
}

/// Net amount of a single line (tax-exclusive pricing).
pub fn line_net(quantity: i32, unit_price: Decimal, discount: Decimal, tax: Decimal) -> Decimal {
    Decimal::from(quantity) * unit_price - discount + tax
}

/// Recomputes and persists the header totals for `invoice` through the open
/// transaction. Returns the updated header row.
pub async fn recompute_on<C: ConnectionTrait>(
    conn: &C,
    invoice: invoice::Model,
) -> Result<invoice::Model, BillingError> {
    let lines = invoice_line::Entity::find()
        .filter(invoice_line::Column::InvoiceId.eq(invoice.id))
        .all(conn)
        .await?;

    let payments = payment::Entity::find()
        .filter(payment::Column::InvoiceId.eq(invoice.id))
        .all(conn)
        .await?;
    let total_paid: Decimal = payments.iter().map(|p| p.amount).sum();

    let summary = TotalsSummary::from_lines(&lines);
    let settlement = settle(summary.total, total_paid);

    let mut active: invoice::ActiveModel = invoice.into();
    active.subtotal = Set(summary.subtotal);
    active.total_discount = Set(summary.total_discount);
    active.total_tax = Set(summary.total_tax);
    active.total = Set(summary.total);
    active.total_paid = Set(total_paid);
    active.outstanding = Set(settlement.outstanding);
    active.credit_balance = Set(settlement.credit_balance);
    active.updated_at = Set(Some(Utc::now()));

    let updated = active.update(conn).await?;
    Ok(updated)
}
