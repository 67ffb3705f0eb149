//! Order lifecycle events, published best-effort to NATS when configured.

use serde::Serialize;
use uuid::Uuid;

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase", tag = "event")]
pub enum OrderEvent {
    Placed { order_id: Uuid, user_id: Uuid, total_price: i64 },
    Paid { order_id: Uuid, gateway_payment_id: String },
    PaymentFailed { order_id: Uuid },
    Shipped { order_id: Uuid },
    Delivered { order_id: Uuid },
    Cancelled { order_id: Uuid },
}

impl OrderEvent {
    pub fn subject(&self) -> &'static str {
        match self {
            Self::Placed { .. } => "orders.placed",
            Self::Paid { .. } => "orders.paid",
            Self::PaymentFailed { .. } => "orders.payment_failed",
            Self::Shipped { .. } => "orders.shipped",
            Self::Delivered { .. } => "orders.delivered",
            Self::Cancelled { .. } => "orders.cancelled",
        }
    }
}
