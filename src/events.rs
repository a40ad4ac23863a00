use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info};
use uuid::Uuid;

/// Domain events emitted by the services.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    CartUpdated {
        cart_id: Uuid,
        user_id: Uuid,
    },
    CartCleared {
        cart_id: Uuid,
    },
    OrderCreated {
        order_id: Uuid,
        user_id: Uuid,
    },
    OrderPaid {
        order_id: Uuid,
        amount_received: i64,
    },
    OrderPaymentFailed {
        order_id: Uuid,
    },
    EntitlementGranted {
        user_id: Uuid,
        order_id: Uuid,
        book_ids: Vec<Uuid>,
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

    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of erroring if the channel is closed.
    /// Event delivery is observability, not a correctness dependency.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            error!("Dropping event: {}", e);
        }
    }
}

/// Background consumer for the event channel.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    while let Some(event) = receiver.recv().await {
        match &event {
            Event::OrderPaid {
                order_id,
                amount_received,
            } => {
                info!(%order_id, amount_received, "order paid");
            }
            Event::OrderPaymentFailed { order_id } => {
                info!(%order_id, "order payment failed");
            }
            Event::EntitlementGranted {
                user_id,
                order_id,
                book_ids,
            } => {
                info!(%user_id, %order_id, books = book_ids.len(), "entitlements granted");
            }
            other => {
                info!(?other, "event");
            }
        }
    }
    info!("Event channel closed; processor exiting");
}
