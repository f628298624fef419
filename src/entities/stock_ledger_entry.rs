use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Whether a movement was written at posting time or as a compensating
/// reversal at void/return time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementDirection {
    Posting,
    Reversal,
}

impl MovementDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementDirection::Posting => "posting",
            MovementDirection::Reversal => "reversal",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "posting" => Some(MovementDirection::Posting),
            "reversal" => Some(MovementDirection::Reversal),
            _ => None,
        }
    }
}

/// An immutable inventory movement caused by a billing event.
///
/// Exactly one `posting` entry exists per stockable invoice line; a void
/// appends one `reversal` entry per original posting. Entries are never
/// edited or deleted.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_ledger_entries")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub product_id: Uuid,
    pub location: String,
    /// Negative on sale, positive on reversal.
    pub quantity_delta: i32,
    pub invoice_id: Uuid,
    pub invoice_line_id: Uuid,
    pub direction: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
