//! HTTP handlers for the checkout and payment surface.
//!
//! Ids arrive as strings and are parsed here so a malformed id surfaces as
//! `InvalidReference` rather than a framework rejection.

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::domain::{Cart, LineIssue, Order, OrderStatus, PaymentMethod, PaymentStatus, ShippingAddress};
use crate::error::{ApiError, ApiResponse, Result};
use crate::services::{PaymentInit, PaymentService, WebhookAck};

use super::auth::AuthUser;
use super::AppState;

fn parse_id(value: &str, what: &str) -> Result<Uuid> {
    Uuid::parse_str(value).map_err(|_| ApiError::InvalidReference(format!("invalid {what}")))
}

type Reply<T> = Result<(StatusCode, Json<ApiResponse<T>>)>;

// ---------------------------------------------------------------------------
// Cart
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLineRequest {
    pub product_id: String,
    pub shade_id: String,
    pub quantity: i32,
}

#[derive(Serialize)]
pub struct CartWithWarnings {
    pub cart: Cart,
    pub warnings: Vec<LineIssue>,
}

pub async fn get_cart(State(state): State<AppState>, caller: AuthUser) -> Reply<Cart> {
    let cart = state.cart.get_cart(caller.user_id).await?;
    Ok(ApiResponse::ok(cart, "Cart fetched successfully"))
}

pub async fn add_cart_line(
    State(state): State<AppState>,
    caller: AuthUser,
    Json(req): Json<CartLineRequest>,
) -> Reply<Cart> {
    let product_id = parse_id(&req.product_id, "product id")?;
    let shade_id = parse_id(&req.shade_id, "shade id")?;
    let cart = state
        .cart
        .add_line(caller.user_id, product_id, shade_id, req.quantity)
        .await?;
    Ok(ApiResponse::ok(cart, "Product added to cart"))
}

pub async fn update_cart_line(
    State(state): State<AppState>,
    caller: AuthUser,
    Json(req): Json<CartLineRequest>,
) -> Reply<Cart> {
    let product_id = parse_id(&req.product_id, "product id")?;
    let shade_id = parse_id(&req.shade_id, "shade id")?;
    let cart = state
        .cart
        .update_line(caller.user_id, product_id, shade_id, req.quantity)
        .await?;
    Ok(ApiResponse::ok(cart, "Cart updated"))
}

pub async fn remove_cart_line(
    State(state): State<AppState>,
    caller: AuthUser,
    Path((product_id, shade_id)): Path<(String, String)>,
) -> Reply<Cart> {
    let product_id = parse_id(&product_id, "product id")?;
    let shade_id = parse_id(&shade_id, "shade id")?;
    let cart = state
        .cart
        .remove_line(caller.user_id, product_id, shade_id)
        .await?;
    Ok(ApiResponse::ok(cart, "Item removed from cart"))
}

pub async fn clear_cart(State(state): State<AppState>, caller: AuthUser) -> Reply<Cart> {
    let cart = state.cart.clear_cart(caller.user_id).await?;
    Ok(ApiResponse::ok(cart, "Cart cleared"))
}

pub async fn refresh_cart(
    State(state): State<AppState>,
    caller: AuthUser,
) -> Reply<CartWithWarnings> {
    let (cart, warnings) = state.cart.refresh(caller.user_id).await?;
    Ok(ApiResponse::ok(
        CartWithWarnings { cart, warnings },
        "Cart refreshed",
    ))
}

pub async fn validate_cart(
    State(state): State<AppState>,
    caller: AuthUser,
) -> Reply<CartWithWarnings> {
    let (cart, warnings) = state.cart.validate_for_checkout(caller.user_id).await?;
    Ok(ApiResponse::ok(
        CartWithWarnings { cart, warnings },
        "Cart is ready for checkout",
    ))
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub shipping_address: ShippingAddress,
    pub payment_method: String,
}

pub async fn create_order(
    State(state): State<AppState>,
    caller: AuthUser,
    Json(req): Json<CreateOrderRequest>,
) -> Reply<Order> {
    req.shipping_address
        .validate()
        .map_err(|e| ApiError::Validation(e.to_string()))?;
    let method = PaymentMethod::parse(&req.payment_method)
        .ok_or_else(|| ApiError::Validation("invalid payment method".into()))?;
    let order = state
        .orders
        .create_order_from_cart(caller.user_id, req.shipping_address, method)
        .await?;
    Ok(ApiResponse::created(order, "Order placed successfully"))
}

pub async fn get_order(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(order_id): Path<String>,
) -> Reply<Order> {
    let order_id = parse_id(&order_id, "order id")?;
    let order = state.orders.get_order(&caller, order_id).await?;
    Ok(ApiResponse::ok(order, "Order fetched successfully"))
}

pub async fn list_my_orders(State(state): State<AppState>, caller: AuthUser) -> Reply<Vec<Order>> {
    let orders = state.orders.my_orders(caller.user_id).await?;
    let message = if orders.is_empty() { "No orders found" } else { "Orders fetched successfully" };
    Ok(ApiResponse::ok(orders, message))
}

pub async fn cancel_order(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(order_id): Path<String>,
) -> Reply<Order> {
    let order_id = parse_id(&order_id, "order id")?;
    let order = state.orders.cancel_order(&caller, order_id).await?;
    Ok(ApiResponse::ok(order, "Order cancelled successfully"))
}

// ---------------------------------------------------------------------------
// Admin
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct ListParams {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

pub async fn admin_list_orders(
    State(state): State<AppState>,
    caller: AuthUser,
    Query(params): Query<ListParams>,
) -> Reply<Vec<Order>> {
    caller.require_admin()?;
    let orders = state
        .orders
        .admin_list_orders(params.page.unwrap_or(1), params.limit.unwrap_or(10))
        .await?;
    Ok(ApiResponse::ok(orders, "Orders fetched successfully"))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOrderStatusRequest {
    pub new_status: String,
}

pub async fn admin_update_order_status(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(order_id): Path<String>,
    Json(req): Json<UpdateOrderStatusRequest>,
) -> Reply<Order> {
    caller.require_admin()?;
    let order_id = parse_id(&order_id, "order id")?;
    let status = OrderStatus::parse(&req.new_status)
        .ok_or_else(|| ApiError::Validation("invalid order status".into()))?;
    let order = state.orders.admin_update_status(order_id, status).await?;
    Ok(ApiResponse::ok(order, format!("Order status updated to '{}'", req.new_status)))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePaymentStatusRequest {
    pub payment_status: String,
}

pub async fn admin_update_payment_status(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(order_id): Path<String>,
    Json(req): Json<UpdatePaymentStatusRequest>,
) -> Reply<Order> {
    caller.require_admin()?;
    let order_id = parse_id(&order_id, "order id")?;
    let status = PaymentStatus::parse(&req.payment_status)
        .ok_or_else(|| ApiError::Validation("invalid payment status".into()))?;
    let order = state.orders.admin_update_payment(order_id, status).await?;
    Ok(ApiResponse::ok(order, "Payment status updated successfully"))
}

// ---------------------------------------------------------------------------
// Payments
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiatePaymentRequest {
    pub order_id: String,
}

pub async fn initiate_payment(
    State(state): State<AppState>,
    caller: AuthUser,
    Json(req): Json<InitiatePaymentRequest>,
) -> Reply<PaymentInit> {
    let order_id = parse_id(&req.order_id, "order id")?;
    let init = state.payments.initiate_payment(caller.user_id, order_id).await?;
    Ok(ApiResponse::ok(init, "Payment initiated successfully"))
}

/// Webhook endpoint. Consumes the raw body bytes; the signature is computed
/// over exactly what was sent, so the body must not be deserialized first.
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Reply<WebhookAck> {
    let signature = headers
        .get(PaymentService::SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::InvalidSignature)?;
    let ack = state.payments.handle_webhook(&body, signature).await?;
    Ok(ApiResponse::ok(ack, "ok"))
}
