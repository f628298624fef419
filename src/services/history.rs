//! Append-only audit trail.
//!
//! Writes happen inside the mutating transaction so the trail only ever
//! reflects committed changes, but a failed history insert is logged and
//! never fails the parent operation.

use crate::{
    db::DbPool,
    entities::invoice_history,
    errors::BillingError,
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
};
use std::sync::Arc;
use tracing::{instrument, warn};
use uuid::Uuid;

/// A pending audit record.
#[derive(Debug, Clone)]
pub struct NewHistoryEntry {
    pub tenant_id: Uuid,
    pub invoice_id: Uuid,
    pub entity_type: String,
    pub entity_id: Uuid,
    pub field: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub actor: Option<Uuid>,
}

impl NewHistoryEntry {
    /// Convenience constructor for invoice status transitions.
    pub fn status_change(
        tenant_id: Uuid,
        invoice_id: Uuid,
        old: &str,
        new: &str,
        actor: Option<Uuid>,
    ) -> Self {
        Self {
            tenant_id,
            invoice_id,
            entity_type: "invoice".to_string(),
            entity_id: invoice_id,
            field: "status".to_string(),
            old_value: Some(old.to_string()),
            new_value: Some(new.to_string()),
            actor,
        }
    }

    /// Records a line ledger mutation (`added`, `updated`, `removed`).
    pub fn line_event(
        tenant_id: Uuid,
        invoice_id: Uuid,
        line_id: Uuid,
        event: &str,
        detail: Option<String>,
        actor: Option<Uuid>,
    ) -> Self {
        Self {
            tenant_id,
            invoice_id,
            entity_type: "invoice_line".to_string(),
            entity_id: line_id,
            field: event.to_string(),
            old_value: None,
            new_value: detail,
            actor,
        }
    }

    pub fn invoice_field(
        tenant_id: Uuid,
        invoice_id: Uuid,
        field: &str,
        old: String,
        new: String,
        actor: Option<Uuid>,
    ) -> Self {
        Self {
            tenant_id,
            invoice_id,
            entity_type: "invoice".to_string(),
            entity_id: invoice_id,
            field: field.to_string(),
            old_value: Some(old),
            new_value: Some(new),
            actor,
        }
    }
}

/// Best-effort append within the caller's transaction.
pub async fn record<C: ConnectionTrait>(conn: &C, entry: NewHistoryEntry) {
    let model = invoice_history::ActiveModel {
        id: Set(Uuid::new_v4()),
        tenant_id: Set(entry.tenant_id),
        invoice_id: Set(entry.invoice_id),
        entity_type: Set(entry.entity_type),
        entity_id: Set(entry.entity_id),
        field: Set(entry.field),
        old_value: Set(entry.old_value),
        new_value: Set(entry.new_value),
        actor: Set(entry.actor),
        recorded_at: Set(Utc::now()),
    };

    if let Err(e) = model.insert(conn).await {
        warn!(error = %e, invoice_id = %entry.invoice_id, "failed to write history entry");
    }
}

/// Read side of the audit trail.
#[derive(Clone)]
pub struct HistoryService {
    db: Arc<DbPool>,
}

impl HistoryService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Returns the full trail for an invoice, oldest first.
    #[instrument(skip(self), fields(invoice_id = %invoice_id))]
    pub async fn get_history(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<Vec<invoice_history::Model>, BillingError> {
        let entries = invoice_history::Entity::find()
            .filter(invoice_history::Column::TenantId.eq(tenant_id))
            .filter(invoice_history::Column::InvoiceId.eq(invoice_id))
            .order_by_asc(invoice_history::Column::RecordedAt)
            .all(&*self.db)
            .await?;
        Ok(entries)
    }
}
