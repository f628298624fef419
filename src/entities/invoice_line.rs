use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// What kind of billable item a line represents.
///
/// Product lines reference a catalog product (and may move stock); service
/// and free-text lines never touch the stock ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum LineKind {
    Product,
    Service,
    FreeText,
}

impl LineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LineKind::Product => "product",
            LineKind::Service => "service",
            LineKind::FreeText => "free_text",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "product" => Some(LineKind::Product),
            "service" => Some(LineKind::Service),
            "free_text" => Some(LineKind::FreeText),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "invoice_lines")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub tenant_id: Uuid,
    /// Assigned in append order, stable for the life of the invoice.
    pub line_number: i32,
    pub kind: String,
    pub product_id: Option<Uuid>,
    pub description: String,
    pub quantity: i32,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub unit_price: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub discount_amount: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub tax_amount: Decimal,
    /// `quantity * unit_price - discount_amount + tax_amount`.
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub net_amount: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Model {
    /// An unrecognized stored value reads as `product`: a mangled line with
    /// a product reference still goes through stock sync instead of silently
    /// skipping it.
    pub fn kind(&self) -> LineKind {
        LineKind::from_str(&self.kind).unwrap_or(LineKind::Product)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::invoice::Entity",
        from = "Column::InvoiceId",
        to = "super::invoice::Column::Id"
    )]
    Invoice,
}

impl Related<super::invoice::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Invoice.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unrecognized_stored_kind_still_moves_stock() {
        let line = Model {
            id: Uuid::new_v4(),
            invoice_id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            line_number: 1,
            kind: "prodcut".to_string(),
            product_id: Some(Uuid::new_v4()),
            description: "med".to_string(),
            quantity: 1,
            unit_price: Decimal::ONE,
            discount_amount: Decimal::ZERO,
            tax_amount: Decimal::ZERO,
            net_amount: Decimal::ONE,
            created_at: Utc::now(),
            updated_at: None,
        };
        assert_eq!(line.kind(), LineKind::Product);
    }
}
