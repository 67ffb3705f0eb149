#![allow(dead_code)]

use std::sync::Arc;

use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

use glowcart::api::auth::{AuthUser, Role};
use glowcart::domain::{Product, Shade, ShippingAddress};
use glowcart::gateway::StubGateway;
use glowcart::services::{CartService, EventPublisher, OrderService, PaymentService};
use glowcart::store::{MemoryStore, Store};

pub const WEBHOOK_SECRET: &str = "whsec_glowcart_test";

pub struct Engine {
    pub store: Arc<MemoryStore>,
    pub cart: CartService,
    pub orders: OrderService,
    pub payments: PaymentService,
}

pub fn engine() -> Engine {
    let store = Arc::new(MemoryStore::new());
    let seam: Arc<dyn Store> = store.clone();
    Engine {
        store,
        cart: CartService::new(seam.clone()),
        orders: OrderService::new(seam.clone(), EventPublisher::disabled()),
        payments: PaymentService::new(
            seam,
            Arc::new(StubGateway),
            WEBHOOK_SECRET,
            EventPublisher::disabled(),
        ),
    }
}

/// Seeds one active product with one active shade; returns (product, shade).
pub async fn seed_catalog(
    store: &MemoryStore,
    base_price: i64,
    shade_price: Option<i64>,
    stock: i32,
) -> (Uuid, Uuid) {
    let now = Utc::now();
    let product = Product {
        id: Uuid::now_v7(),
        name: "Velvet Matte Lipstick".into(),
        brand: "Glow".into(),
        base_price,
        discounted_price: None,
        is_active: true,
        created_at: now,
        updated_at: now,
    };
    let shade = Shade {
        id: Uuid::now_v7(),
        product_id: product.id,
        shade_name: "Rosewood".into(),
        stock,
        price: shade_price,
        is_active: true,
        created_at: now,
        updated_at: now,
    };
    let ids = (product.id, shade.id);
    store.seed_product(product).await;
    store.seed_shade(shade).await;
    ids
}

pub fn customer() -> AuthUser {
    AuthUser { user_id: Uuid::now_v7(), role: Role::User }
}

pub fn admin() -> AuthUser {
    AuthUser { user_id: Uuid::now_v7(), role: Role::Admin }
}

pub fn address() -> ShippingAddress {
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

pub fn sign(body: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(WEBHOOK_SECRET.as_bytes()).unwrap();
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

pub fn captured_body(gateway_order_id: &str, payment_id: &str) -> Vec<u8> {
    serde_json::json!({
        "event": "payment.captured",
        "payload": {"payment": {"entity": {"id": payment_id, "order_id": gateway_order_id}}}
    })
    .to_string()
    .into_bytes()
}

pub fn failed_body(gateway_order_id: &str) -> Vec<u8> {
    serde_json::json!({
        "event": "payment.failed",
        "payload": {"payment": {"entity": {"id": "pay_failed", "order_id": gateway_order_id}}}
    })
    .to_string()
    .into_bytes()
}
