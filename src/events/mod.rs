use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Events emitted by the billing engine after a transaction commits.
///
/// Downstream consumers (the accounting/journal module in particular) are
/// eventually consistent: they are fed from here and never participate in
/// the posting transaction itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    InvoiceDrafted {
        invoice_id: Uuid,
        tenant_id: Uuid,
    },
    InvoicePosted {
        invoice_id: Uuid,
        tenant_id: Uuid,
        invoice_number: i64,
        total: Decimal,
    },
    InvoicePaid {
        invoice_id: Uuid,
        tenant_id: Uuid,
    },
    InvoiceCancelled {
        invoice_id: Uuid,
        tenant_id: Uuid,
    },
    InvoiceVoided {
        invoice_id: Uuid,
        tenant_id: Uuid,
        reversal_count: usize,
    },
    PaymentRecorded {
        payment_id: Uuid,
        invoice_id: Uuid,
        tenant_id: Uuid,
        amount: Decimal,
    },
    PaymentReversed {
        payment_id: Uuid,
        original_payment_id: Uuid,
        invoice_id: Uuid,
        tenant_id: Uuid,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Best-effort send used after a transaction has already committed: a
    /// full channel must not fail the operation.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event.clone()).await {
            warn!(error = %e, ?event, "failed to publish billing event");
        }
    }
}

/// Creates a bounded event channel.
pub fn channel(capacity: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(capacity);
    (EventSender::new(tx), rx)
}

/// Event processing loop. Posted/voided invoices are handed to the journal
/// feed; everything else is logged for observability.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::InvoicePosted {
                invoice_id,
                tenant_id,
                invoice_number,
                total,
            } => {
                info!(
                    %invoice_id, %tenant_id, invoice_number, %total,
                    "invoice posted; queueing journal export"
                );
            }
            Event::InvoiceVoided {
                invoice_id,
                tenant_id,
                reversal_count,
            } => {
                info!(
                    %invoice_id, %tenant_id, reversal_count,
                    "invoice voided; queueing journal reversal"
                );
            }
            other => {
                info!(event = ?other, "billing event");
            }
        }
    }

    info!("Event processing loop stopped");
}
