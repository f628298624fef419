pub mod history;
pub mod invoice_status;
pub mod invoicing;
pub mod payments;
pub mod stock_sync;
pub mod totals;

use crate::{entities::invoice, errors::BillingError};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DbBackend, EntityTrait, QueryFilter, QuerySelect,
};
use uuid::Uuid;

/// Loads the invoice header under a row lock, serializing concurrent writers
/// on the same invoice. SQLite serializes writers on its own and rejects
/// locking clauses, so the lock is only emitted on Postgres.
pub(crate) async fn load_invoice_for_update<C: ConnectionTrait>(
    conn: &C,
    tenant_id: Uuid,
    invoice_id: Uuid,
) -> Result<invoice::Model, BillingError> {
    let mut query = invoice::Entity::find()
        .filter(invoice::Column::Id.eq(invoice_id))
        .filter(invoice::Column::TenantId.eq(tenant_id));

    if conn.get_database_backend() == DbBackend::Postgres {
        query = query.lock_exclusive();
    }

    query
        .one(conn)
        .await?
        .ok_or_else(|| BillingError::NotFound(format!("invoice {} not found", invoice_id)))
}
