//! Order aggregate and status state machines.
//!
//! An order is an immutable snapshot of a checked-out cart: lines and total
//! are frozen at creation, independent of later catalog changes. Only the two
//! status fields, payment metadata and the lifecycle timestamps mutate, and
//! every such mutation goes through the transition checks here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;
use validator::Validate;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub order_lines: Vec<OrderLine>,
    pub shipping_address: ShippingAddress,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub order_status: OrderStatus,
    /// Frozen at creation; minor units.
    pub total_price: i64,
    pub payment_provider: Option<String>,
    pub gateway_order_id: Option<String>,
    pub gateway_payment_id: Option<String>,
    pub placed_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
    pub product_id: Uuid,
    pub shade_id: Uuid,
    pub quantity: i32,
    /// Resolved price at checkout time, minor units.
    pub price: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ShippingAddress {
    #[validate(length(min = 1))]
    pub full_name: String,
    #[validate(length(min = 1))]
    pub phone: String,
    #[validate(length(min = 1))]
    pub street: String,
    #[validate(length(min = 1))]
    pub city: String,
    #[validate(length(min = 1))]
    pub state: String,
    #[validate(length(min = 1))]
    pub zip_code: String,
    #[validate(length(min = 1))]
    pub country: String,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Cod,
    Upi,
    Card,
    Netbanking,
    Wallet,
}

impl PaymentMethod {
    pub fn is_pay_on_delivery(self) -> bool {
        matches!(self, Self::Cod)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cod => "cod",
            Self::Upi => "upi",
            Self::Card => "card",
            Self::Netbanking => "netbanking",
            Self::Wallet => "wallet",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "cod" => Some(Self::Cod),
            "upi" => Some(Self::Upi),
            "card" => Some(Self::Card),
            "netbanking" => Some(Self::Netbanking),
            "wallet" => Some(Self::Wallet),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    /// The adjacency table of legal transitions. Every status-changing entry
    /// point (self-service cancel, admin update) consults this and nothing
    /// else.
    pub fn can_transition(self, to: OrderStatus) -> bool {
        matches!(
            (self, to),
            (Self::Processing, Self::Shipped)
                | (Self::Processing, Self::Cancelled)
                | (Self::Shipped, Self::Delivered)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "processing" => Some(Self::Processing),
            "shipped" => Some(Self::Shipped),
            "delivered" => Some(Self::Delivered),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OrderError {
    #[error("cannot change order status from '{from}' to '{to}'")]
    IllegalTransition { from: &'static str, to: &'static str },
    #[error("payment already completed")]
    PaymentSettled,
}

impl Order {
    /// Freezes a validated line set into a new order. Payment starts
    /// `completed` for prepaid channels and `pending` for pay-on-delivery.
    pub fn place(
        user_id: Uuid,
        order_lines: Vec<OrderLine>,
        shipping_address: ShippingAddress,
        payment_method: PaymentMethod,
    ) -> Self {
        let now = Utc::now();
        let total_price = order_lines
            .iter()
            .map(|l| l.price * i64::from(l.quantity))
            .sum();
        Self {
            id: Uuid::now_v7(),
            user_id,
            order_lines,
            shipping_address,
            payment_method,
            payment_status: if payment_method.is_pay_on_delivery() {
                PaymentStatus::Pending
            } else {
                PaymentStatus::Completed
            },
            order_status: OrderStatus::Processing,
            total_price,
            payment_provider: None,
            gateway_order_id: None,
            gateway_payment_id: None,
            placed_at: now,
            paid_at: None,
            shipped_at: None,
            delivered_at: None,
            updated_at: now,
        }
    }

    /// Applies a status transition, stamping the lifecycle timestamp for the
    /// target state. Stock restoration on cancellation is the caller's side
    /// effect; the legality check lives here.
    pub fn transition_to(&mut self, to: OrderStatus) -> Result<(), OrderError> {
        if !self.order_status.can_transition(to) {
            return Err(OrderError::IllegalTransition {
                from: self.order_status.as_str(),
                to: to.as_str(),
            });
        }
        match to {
            OrderStatus::Shipped => self.shipped_at = Some(Utc::now()),
            OrderStatus::Delivered => self.delivered_at = Some(Utc::now()),
            OrderStatus::Processing | OrderStatus::Cancelled => {}
        }
        self.order_status = to;
        self.touch();
        Ok(())
    }

    /// `completed` is absorbing: once set, no further payment writes.
    pub fn set_payment_status(&mut self, status: PaymentStatus) -> Result<(), OrderError> {
        if self.payment_status == PaymentStatus::Completed {
            return Err(OrderError::PaymentSettled);
        }
        self.payment_status = status;
        self.touch();
        Ok(())
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address() -> ShippingAddress {
        ShippingAddress {
            full_name: "Asha Rao".into(),
            phone: "+911234567890".into(),
            street: "12 MG Road".into(),
            city: "Bengaluru".into(),
            state: "KA".into(),
            zip_code: "560001".into(),
            country: "IN".into(),
        }
    }

    fn order(method: PaymentMethod) -> Order {
        let line = OrderLine {
            product_id: Uuid::now_v7(),
            shade_id: Uuid::now_v7(),
            quantity: 2,
            price: 500,
        };
        Order::place(Uuid::now_v7(), vec![line], address(), method)
    }

    #[test]
    fn total_is_frozen_sum() {
        let o = order(PaymentMethod::Cod);
        assert_eq!(o.total_price, 1000);
        assert_eq!(o.order_status, OrderStatus::Processing);
        assert_eq!(o.payment_status, PaymentStatus::Pending);
    }

    #[test]
    fn prepaid_starts_completed() {
        assert_eq!(order(PaymentMethod::Card).payment_status, PaymentStatus::Completed);
    }

    #[test]
    fn legal_lifecycle_stamps_timestamps() {
        let mut o = order(PaymentMethod::Cod);
        o.transition_to(OrderStatus::Shipped).unwrap();
        assert!(o.shipped_at.is_some());
        o.transition_to(OrderStatus::Delivered).unwrap();
        assert!(o.delivered_at.is_some());
    }

    #[test]
    fn skipping_shipped_is_illegal() {
        let mut o = order(PaymentMethod::Cod);
        let err = o.transition_to(OrderStatus::Delivered).unwrap_err();
        assert_eq!(
            err,
            OrderError::IllegalTransition { from: "processing", to: "delivered" }
        );
    }

    #[test]
    fn cancel_only_from_processing() {
        let mut o = order(PaymentMethod::Cod);
        o.transition_to(OrderStatus::Shipped).unwrap();
        assert!(o.transition_to(OrderStatus::Cancelled).is_err());
    }

    #[test]
    fn terminal_states_reject_everything() {
        let mut o = order(PaymentMethod::Cod);
        o.transition_to(OrderStatus::Cancelled).unwrap();
        assert!(o.transition_to(OrderStatus::Shipped).is_err());
        assert!(o.transition_to(OrderStatus::Delivered).is_err());
    }

    #[test]
    fn completed_payment_is_absorbing() {
        let mut o = order(PaymentMethod::Cod);
        o.set_payment_status(PaymentStatus::Completed).unwrap();
        assert_eq!(
            o.set_payment_status(PaymentStatus::Failed),
            Err(OrderError::PaymentSettled)
        );
    }
}
