use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Lifecycle states of a billing document.
///
/// `draft → posted → {paid, cancelled, void}`. Once an invoice leaves
/// `draft` its lines and header facts are frozen; corrections are expressed
/// as compensating records, never in-place edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    Posted,
    Paid,
    Cancelled,
    Void,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Posted => "posted",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Cancelled => "cancelled",
            InvoiceStatus::Void => "void",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(InvoiceStatus::Draft),
            "posted" => Some(InvoiceStatus::Posted),
            "paid" => Some(InvoiceStatus::Paid),
            "cancelled" => Some(InvoiceStatus::Cancelled),
            "void" => Some(InvoiceStatus::Void),
            _ => None,
        }
    }

    /// True once the invoice has been posted, in any downstream state.
    pub fn is_frozen(&self) -> bool {
        !matches!(self, InvoiceStatus::Draft)
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "invoices")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub patient_id: Uuid,
    pub encounter_id: Option<Uuid>,
    /// Gap-free sequential number per tenant, assigned at posting time.
    pub invoice_number: Option<i64>,
    pub currency: String,
    pub status: String,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub subtotal: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub total_discount: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub total_tax: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub total: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub total_paid: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub outstanding: Decimal,
    /// Overpayment surfaced explicitly rather than clamped away.
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub credit_balance: Decimal,
    /// Monotonic line-number allocator; never decremented on line removal so
    /// surviving lines keep stable numbers.
    pub line_seq: i32,
    pub issued_at: Option<DateTime<Utc>>,
    pub posted_at: Option<DateTime<Utc>>,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Model {
    /// An unrecognized stored value reads as `void`: a corrupted row stays
    /// frozen and unpayable rather than becoming an editable draft.
    pub fn status(&self) -> InvoiceStatus {
        InvoiceStatus::from_str(&self.status).unwrap_or(InvoiceStatus::Void)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::invoice_line::Entity")]
    InvoiceLines,
    #[sea_orm(has_many = "super::payment::Entity")]
    Payments,
}

impl Related<super::invoice_line::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::InvoiceLines.def()
    }
}

impl Related<super::payment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Payments.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
