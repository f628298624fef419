//! HTTP layer. Handlers are thin: extract tenant and payload, call the
//! matching service, wrap the result in the response envelope.

pub mod common;
pub mod invoices;
pub mod payments;

use crate::{
    db::DbPool,
    events::EventSender,
    services::{
        history::HistoryService, invoice_status::InvoiceStatusService,
        invoicing::InvoicingService, payments::PaymentService,
    },
};
use std::sync::Arc;

/// Service registry handed to every handler through `AppState`.
#[derive(Clone)]
pub struct AppServices {
    pub invoicing: InvoicingService,
    pub status: InvoiceStatusService,
    pub payments: PaymentService,
    pub history: HistoryService,
}

impl AppServices {
    pub fn new(db: Arc<DbPool>, event_sender: EventSender) -> Self {
        Self {
            invoicing: InvoicingService::new(db.clone(), event_sender.clone()),
            status: InvoiceStatusService::new(db.clone(), event_sender.clone()),
            payments: PaymentService::new(db.clone(), event_sender),
            history: HistoryService::new(db),
        }
    }
}
