//! Payment gateway collaborator.
//!
//! The engine only needs one outbound call: creating a gateway-side order so
//! the client can open the payment flow. Everything else arrives through the
//! webhook.

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::{ApiError, Result};

pub struct CreateGatewayOrder {
    /// Minor units.
    pub amount: i64,
    pub currency: String,
    pub receipt: String,
    pub notes: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct GatewayOrder {
    pub id: String,
    pub amount: i64,
    pub currency: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn provider(&self) -> &'static str;
    fn key_id(&self) -> &str;
    async fn create_gateway_order(&self, req: CreateGatewayOrder) -> Result<GatewayOrder>;
}

/// Razorpay orders API client.
pub struct RazorpayClient {
    http: reqwest::Client,
    base_url: String,
    key_id: String,
    key_secret: String,
}

impl RazorpayClient {
    pub fn new(base_url: impl Into<String>, key_id: impl Into<String>, key_secret: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            key_id: key_id.into(),
            key_secret: key_secret.into(),
        }
    }
}

#[derive(Deserialize)]
struct RazorpayOrderResponse {
    id: String,
    amount: i64,
    currency: String,
}

#[async_trait]
impl PaymentGateway for RazorpayClient {
    fn provider(&self) -> &'static str {
        "razorpay"
    }

    fn key_id(&self) -> &str {
        &self.key_id
    }

    async fn create_gateway_order(&self, req: CreateGatewayOrder) -> Result<GatewayOrder> {
        let response = self
            .http
            .post(format!("{}/v1/orders", self.base_url))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&serde_json::json!({
                "amount": req.amount,
                "currency": req.currency,
                "receipt": req.receipt,
                "notes": req.notes,
            }))
            .send()
            .await
            .map_err(|e| ApiError::Gateway(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ApiError::Gateway(format!(
                "gateway order creation failed: {}",
                response.status()
            )));
        }
        let body: RazorpayOrderResponse = response
            .json()
            .await
            .map_err(|e| ApiError::Gateway(e.to_string()))?;
        Ok(GatewayOrder { id: body.id, amount: body.amount, currency: body.currency })
    }
}

/// Offline gateway for tests and local development: issues synthetic gateway
/// order ids without any network traffic.
#[derive(Default)]
pub struct StubGateway;

#[async_trait]
impl PaymentGateway for StubGateway {
    fn provider(&self) -> &'static str {
        "razorpay"
    }

    fn key_id(&self) -> &str {
        "rzp_test_key"
    }

    async fn create_gateway_order(&self, req: CreateGatewayOrder) -> Result<GatewayOrder> {
        Ok(GatewayOrder {
            id: format!("order_{:016x}", rand::random::<u64>()),
            amount: req.amount,
            currency: req.currency,
        })
    }
}
