//! HTTP surface: router, shared state, caller identity.

pub mod auth;
pub mod handlers;

use std::sync::Arc;

use axum::routing::{delete, get, patch, post};
use axum::{Json, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::gateway::PaymentGateway;
use crate::services::{CartService, EventPublisher, OrderService, PaymentService};
use crate::store::Store;

#[derive(Clone)]
pub struct AppState {
    pub cart: Arc<CartService>,
    pub orders: Arc<OrderService>,
    pub payments: Arc<PaymentService>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn Store>,
        gateway: Arc<dyn PaymentGateway>,
        webhook_secret: impl Into<String>,
        events: EventPublisher,
    ) -> Self {
        Self {
            cart: Arc::new(CartService::new(store.clone())),
            orders: Arc::new(OrderService::new(store.clone(), events.clone())),
            payments: Arc::new(PaymentService::new(store, gateway, webhook_secret, events)),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/health",
            get(|| async { Json(serde_json::json!({"status": "healthy", "service": "glowcart"})) }),
        )
        .route("/api/v1/cart", get(handlers::get_cart).delete(handlers::clear_cart))
        .route(
            "/api/v1/cart/items",
            post(handlers::add_cart_line).put(handlers::update_cart_line),
        )
        .route(
            "/api/v1/cart/items/:product_id/:shade_id",
            delete(handlers::remove_cart_line),
        )
        .route("/api/v1/cart/refresh", post(handlers::refresh_cart))
        .route("/api/v1/cart/validate", post(handlers::validate_cart))
        .route("/api/v1/orders", post(handlers::create_order).get(handlers::list_my_orders))
        .route("/api/v1/orders/:order_id", get(handlers::get_order))
        .route("/api/v1/orders/:order_id/cancel", post(handlers::cancel_order))
        .route("/api/v1/payments/initiate", post(handlers::initiate_payment))
        .route("/api/v1/payments/webhook", post(handlers::payment_webhook))
        .route("/api/v1/admin/orders", get(handlers::admin_list_orders))
        .route(
            "/api/v1/admin/orders/:order_id/status",
            patch(handlers::admin_update_order_status),
        )
        .route(
            "/api/v1/admin/orders/:order_id/payment-status",
            patch(handlers::admin_update_payment_status),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
