//! Payment Reconciliation Service.
//!
//! Consumes gateway notifications and applies each payment outcome exactly
//! once. Signature verification runs over the raw request bytes; settlement
//! re-checks stock per line with the ledger's conditional decrement and
//! unwinds completely if any line cannot be satisfied.

use std::sync::Arc;

use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use uuid::Uuid;

use crate::domain::{OrderEvent, OrderLine, OrderStatus, PaymentStatus};
use crate::error::{ApiError, Result};
use crate::gateway::{CreateGatewayOrder, PaymentGateway};
use crate::store::Store;

use super::EventPublisher;

type HmacSha256 = Hmac<Sha256>;

pub struct PaymentService {
    store: Arc<dyn Store>,
    gateway: Arc<dyn PaymentGateway>,
    webhook_secret: String,
    events: EventPublisher,
}

/// What the client needs to open the gateway's payment flow.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInit {
    pub gateway_order_id: String,
    pub amount: i64,
    pub currency: String,
    pub order_id: Uuid,
    pub payment_provider: String,
    pub key: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct WebhookAck {
    pub message: &'static str,
}

impl WebhookAck {
    fn new(message: &'static str) -> Self {
        Self { message }
    }
}

/// Closed set of gateway event kinds; anything unrecognized is acknowledged
/// harmlessly.
#[derive(Debug, PartialEq, Eq)]
pub enum GatewayEvent {
    Captured { gateway_order_id: String, gateway_payment_id: String },
    Failed { gateway_order_id: String },
    Ignored,
}

#[derive(Deserialize)]
struct Envelope {
    event: String,
    payload: Option<EventPayload>,
}

#[derive(Deserialize)]
struct EventPayload {
    payment: Option<PaymentWrapper>,
}

#[derive(Deserialize)]
struct PaymentWrapper {
    entity: PaymentEntity,
}

#[derive(Deserialize)]
struct PaymentEntity {
    id: String,
    order_id: String,
}

impl GatewayEvent {
    fn parse(body: &[u8]) -> Result<Self> {
        let envelope: Envelope = serde_json::from_slice(body)
            .map_err(|e| ApiError::Validation(format!("malformed webhook body: {e}")))?;
        let entity = envelope
            .payload
            .and_then(|p| p.payment)
            .map(|w| w.entity);
        match envelope.event.as_str() {
            "payment.captured" => {
                let entity = entity
                    .ok_or_else(|| ApiError::Validation("missing payment entity".into()))?;
                Ok(Self::Captured {
                    gateway_order_id: entity.order_id,
                    gateway_payment_id: entity.id,
                })
            }
            "payment.failed" => {
                let entity = entity
                    .ok_or_else(|| ApiError::Validation("missing payment entity".into()))?;
                Ok(Self::Failed { gateway_order_id: entity.order_id })
            }
            _ => Ok(Self::Ignored),
        }
    }
}

impl PaymentService {
    /// Header carrying the hex HMAC of the raw request body.
    pub const SIGNATURE_HEADER: &'static str = "x-razorpay-signature";

    pub fn new(
        store: Arc<dyn Store>,
        gateway: Arc<dyn PaymentGateway>,
        webhook_secret: impl Into<String>,
        events: EventPublisher,
    ) -> Self {
        Self { store, gateway, webhook_secret: webhook_secret.into(), events }
    }

    /// Creates a gateway order for a pay-online order still awaiting payment
    /// and records the gateway reference on our side.
    pub async fn initiate_payment(&self, user_id: Uuid, order_id: Uuid) -> Result<PaymentInit> {
        let mut order = self
            .store
            .find_order(order_id)
            .await?
            .filter(|o| o.user_id == user_id)
            .ok_or(ApiError::NotFound("order"))?;

        match order.payment_status {
            PaymentStatus::Completed => return Err(ApiError::PaymentAlreadySettled),
            PaymentStatus::Failed => {
                return Err(ApiError::Validation(
                    "payment already processed for this order".into(),
                ))
            }
            PaymentStatus::Pending => {}
        }
        if order.order_status == OrderStatus::Cancelled {
            return Err(ApiError::Validation("cannot pay for a cancelled order".into()));
        }
        if order.total_price <= 0 {
            return Err(ApiError::Validation("invalid order amount".into()));
        }

        let gateway_order = self
            .gateway
            .create_gateway_order(CreateGatewayOrder {
                amount: order.total_price,
                currency: "INR".into(),
                receipt: format!("order_rcpt_{}", order.id),
                notes: serde_json::json!({
                    "orderId": order.id,
                    "userId": user_id,
                }),
            })
            .await?;

        order.gateway_order_id = Some(gateway_order.id.clone());
        order.payment_provider = Some(self.gateway.provider().to_string());
        self.store.update_order(&order).await?;

        Ok(PaymentInit {
            gateway_order_id: gateway_order.id,
            amount: gateway_order.amount,
            currency: gateway_order.currency,
            order_id: order.id,
            payment_provider: self.gateway.provider().to_string(),
            key: self.gateway.key_id().to_string(),
        })
    }

    /// Entry point for the gateway webhook. `raw_body` must be the exact
    /// bytes of the request; a re-serialized body will not reproduce the
    /// signature.
    pub async fn handle_webhook(&self, raw_body: &[u8], signature: &str) -> Result<WebhookAck> {
        self.verify_signature(raw_body, signature)?;
        match GatewayEvent::parse(raw_body)? {
            GatewayEvent::Captured { gateway_order_id, gateway_payment_id } => {
                self.apply_captured(&gateway_order_id, gateway_payment_id).await
            }
            GatewayEvent::Failed { gateway_order_id } => {
                self.apply_failed(&gateway_order_id).await
            }
            GatewayEvent::Ignored => Ok(WebhookAck::new("event ignored")),
        }
    }

    fn verify_signature(&self, raw_body: &[u8], signature: &str) -> Result<()> {
        let expected = hex::decode(signature).map_err(|_| ApiError::InvalidSignature)?;
        let mut mac = HmacSha256::new_from_slice(self.webhook_secret.as_bytes())
            .map_err(|_| ApiError::InvalidSignature)?;
        mac.update(raw_body);
        // verify_slice is constant-time.
        mac.verify_slice(&expected).map_err(|_| ApiError::InvalidSignature)
    }

    async fn apply_captured(
        &self,
        gateway_order_id: &str,
        gateway_payment_id: String,
    ) -> Result<WebhookAck> {
        let Some(order) = self.store.find_order_by_gateway_ref(gateway_order_id).await?
        else {
            return Ok(WebhookAck::new("order not found"));
        };
        // Fast path for redelivery; the settle_payment compare-and-set below
        // is what actually guarantees exactly-once.
        if order.payment_status == PaymentStatus::Completed {
            return Ok(WebhookAck::new("already processed"));
        }

        // Settlement-time stock re-check: conditionally decrement each line,
        // unwinding everything on the first line that cannot be satisfied.
        for (idx, line) in order.order_lines.iter().enumerate() {
            let reserved = match self.store.reserve_stock(line.shade_id, line.quantity).await {
                Ok(reserved) => reserved,
                Err(e) => {
                    self.release_lines(&order.order_lines[..idx]).await?;
                    return Err(e);
                }
            };
            if !reserved {
                self.release_lines(&order.order_lines[..idx]).await?;
                tracing::error!(
                    order_id = %order.id,
                    shade_id = %line.shade_id,
                    "oversold: settlement stock re-check failed, manual reconciliation required"
                );
                return Err(ApiError::Oversold { order_id: order.id });
            }
        }

        // The flip is conditional on the payment not being settled yet; a
        // concurrent duplicate that slipped past the read above loses here
        // and hands its decrements back. A storage failure does the same, so
        // the gateway's retry starts from a clean ledger.
        let settled = match self
            .store
            .settle_payment(order.id, &gateway_payment_id, Utc::now())
            .await
        {
            Ok(settled) => settled,
            Err(e) => {
                self.release_lines(&order.order_lines).await?;
                return Err(e);
            }
        };
        if !settled {
            self.release_lines(&order.order_lines).await?;
            return Ok(WebhookAck::new("already processed"));
        }

        self.events
            .publish(&OrderEvent::Paid {
                order_id: order.id,
                gateway_payment_id,
            })
            .await;
        tracing::info!(order_id = %order.id, "payment settled");
        Ok(WebhookAck::new("payment processed"))
    }

    async fn release_lines(&self, lines: &[OrderLine]) -> Result<()> {
        for line in lines {
            self.store.restore_stock(line.shade_id, line.quantity).await?;
        }
        Ok(())
    }

    async fn apply_failed(&self, gateway_order_id: &str) -> Result<WebhookAck> {
        let Some(order) = self.store.find_order_by_gateway_ref(gateway_order_id).await?
        else {
            return Ok(WebhookAck::new("order not found"));
        };
        // A completed payment is absorbing: a late failure event never
        // downgrades it, and the gateway still gets a 2xx. The conditional
        // write repeats the check so a capture racing this event keeps its
        // settled state.
        if order.payment_status == PaymentStatus::Completed {
            return Ok(WebhookAck::new("already processed"));
        }
        if !self
            .store
            .set_payment_status_unless_settled(order.id, PaymentStatus::Failed)
            .await?
        {
            return Ok(WebhookAck::new("already processed"));
        }
        self.events
            .publish(&OrderEvent::PaymentFailed { order_id: order.id })
            .await;
        Ok(WebhookAck::new("payment marked failed"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_captured_event() {
        let body = br#"{"event":"payment.captured","payload":{"payment":{"entity":{"id":"pay_1","order_id":"rzp_1"}}}}"#;
        assert_eq!(
            GatewayEvent::parse(body).unwrap(),
            GatewayEvent::Captured {
                gateway_order_id: "rzp_1".into(),
                gateway_payment_id: "pay_1".into(),
            }
        );
    }

    #[test]
    fn unknown_events_are_ignored() {
        let body = br#"{"event":"refund.processed","payload":{}}"#;
        assert_eq!(GatewayEvent::parse(body).unwrap(), GatewayEvent::Ignored);
    }

    #[test]
    fn captured_without_entity_is_rejected() {
        let body = br#"{"event":"payment.captured","payload":{}}"#;
        assert!(GatewayEvent::parse(body).is_err());
    }
}
