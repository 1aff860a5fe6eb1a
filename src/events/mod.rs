use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Events emitted by the domain services. Consumers (the in-process
/// event loop, and eventually external subscribers) receive them through
/// an mpsc channel owned by the runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Cart events
    CartItemAdded {
        cart_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    },
    CartItemUpdated {
        cart_id: Uuid,
        item_id: Uuid,
        quantity: i32,
    },
    CartItemRemoved {
        cart_id: Uuid,
        item_id: Uuid,
    },
    CartCleared(Uuid),

    // Order events
    OrderCreated(Uuid),
    OrderStatusChanged {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },
    OrderCancelled(Uuid),
    CheckoutCompleted {
        cart_id: Uuid,
        order_id: Uuid,
    },

    // Payment events
    PaymentInitiated {
        transaction_id: Uuid,
        order_id: Uuid,
        method: String,
        amount: Decimal,
    },
    PaymentSucceeded {
        transaction_id: Uuid,
        order_id: Uuid,
        receipt: Option<String>,
    },
    PaymentFailed {
        transaction_id: Uuid,
        order_id: Option<Uuid>,
        reason: String,
    },
    PaymentExpired {
        transaction_id: Uuid,
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

    /// Sends an event, surfacing channel failures to the caller.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event and logs instead of failing the surrounding
    /// operation if the channel is closed. Domain writes must not be
    /// rolled back because an observer went away.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!("Event dropped: {}", e);
        }
    }
}

/// Background loop draining the event channel. Handlers here are
/// intentionally lightweight; anything heavier belongs in a dedicated
/// consumer.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::PaymentSucceeded {
                transaction_id,
                order_id,
                receipt,
            } => {
                info!(
                    %transaction_id,
                    %order_id,
                    receipt = receipt.as_deref().unwrap_or("-"),
                    "payment confirmed"
                );
            }
            Event::PaymentFailed {
                transaction_id,
                reason,
                ..
            } => {
                warn!(%transaction_id, %reason, "payment failed");
            }
            other => {
                info!("Received event: {:?}", other);
            }
        }
    }

    info!("Event channel closed; processing loop exiting");
}
