//! SeaORM entities for the billing engine.
//!
//! Every row is tenant-scoped: each table carries a `tenant_id` column and
//! all queries filter on it.

pub mod invoice;
pub mod invoice_history;
pub mod invoice_line;
pub mod invoice_sequence;
pub mod payment;
pub mod product;
pub mod stock_ledger_entry;
pub mod stock_level;
pub mod tenant;

pub use invoice::InvoiceStatus;
pub use invoice_line::LineKind;
pub use stock_ledger_entry::MovementDirection;
