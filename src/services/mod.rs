//! Application services: cart consistency, order creation and lifecycle,
//! payment reconciliation.

pub mod cart;
pub mod orders;
pub mod payments;

pub use cart::CartService;
pub use orders::OrderService;
pub use payments::{PaymentInit, PaymentService, WebhookAck};

use crate::domain::OrderEvent;

/// Best-effort order-event publisher. A missing NATS connection or a publish
/// failure never fails the request that raised the event.
#[derive(Clone, Default)]
pub struct EventPublisher {
    client: Option<async_nats::Client>,
}

impl EventPublisher {
    pub fn new(client: Option<async_nats::Client>) -> Self {
        Self { client }
    }

    pub fn disabled() -> Self {
        Self { client: None }
    }

    pub async fn publish(&self, event: &OrderEvent) {
        let Some(client) = &self.client else { return };
        match serde_json::to_vec(event) {
            Ok(payload) => {
                if let Err(e) = client.publish(event.subject().to_string(), payload.into()).await {
                    tracing::warn!(subject = event.subject(), error = %e, "event publish failed");
                }
            }
            Err(e) => tracing::warn!(error = %e, "event encode failed"),
        }
    }
}
