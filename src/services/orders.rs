//! Order Creation Service and order lifecycle.
//!
//! Checkout is the single place where stock leaves the available pool for a
//! customer-facing reason. Creation plus its reservations are all-or-nothing:
//! a failed reservation partway unwinds everything already applied before the
//! error is reported.

use std::sync::Arc;

use uuid::Uuid;

use crate::api::auth::AuthUser;
use crate::domain::{
    IssueCode, LineIssue, Order, OrderError, OrderEvent, OrderLine, OrderStatus, PaymentMethod,
    PaymentStatus, ShippingAddress,
};
use crate::error::{ApiError, Result};
use crate::store::Store;

use super::cart::validate_lines;
use super::EventPublisher;

pub struct OrderService {
    store: Arc<dyn Store>,
    events: EventPublisher,
}

impl OrderService {
    pub fn new(store: Arc<dyn Store>, events: EventPublisher) -> Self {
        Self { store, events }
    }

    /// Converts the user's cart into an immutable order, reserving stock for
    /// every line. On success the cart is emptied; on any failure nothing is
    /// committed.
    pub async fn create_order_from_cart(
        &self,
        user_id: Uuid,
        shipping_address: ShippingAddress,
        payment_method: PaymentMethod,
    ) -> Result<Order> {
        let mut cart = self
            .store
            .load_cart(user_id)
            .await?
            .ok_or(ApiError::NotFound("cart"))?;
        if cart.is_empty() {
            return Err(ApiError::Validation("cart is empty".into()));
        }

        // Final validation pass; any blocking issue aborts the whole checkout.
        let (validated, issues) = validate_lines(self.store.as_ref(), &cart).await?;
        if issues.iter().any(|i| i.code.is_blocking()) {
            return Err(ApiError::CheckoutValidationFailed(issues));
        }

        let order_lines: Vec<OrderLine> = validated
            .iter()
            .map(|l| OrderLine {
                product_id: l.product_id,
                shade_id: l.shade_id,
                quantity: l.quantity,
                price: l.price,
            })
            .collect();
        let order = Order::place(user_id, order_lines, shipping_address, payment_method);
        self.store.insert_order(&order).await?;

        // Reserve per line; unwind and drop the order if any line loses the
        // race between validation and reservation, or if a reservation write
        // itself fails partway.
        for (idx, line) in order.order_lines.iter().enumerate() {
            let reserved = match self.store.reserve_stock(line.shade_id, line.quantity).await {
                Ok(reserved) => reserved,
                Err(e) => {
                    self.unwind_reservation(&order, idx).await?;
                    return Err(e);
                }
            };
            if !reserved {
                self.unwind_reservation(&order, idx).await?;
                return Err(ApiError::CheckoutValidationFailed(vec![LineIssue {
                    code: IssueCode::InsufficientStock,
                    product_id: line.product_id,
                    shade_id: line.shade_id,
                    message: "insufficient stock".into(),
                }]));
            }
        }

        cart.clear();
        self.store.save_cart(&cart).await?;

        self.events
            .publish(&OrderEvent::Placed {
                order_id: order.id,
                user_id,
                total_price: order.total_price,
            })
            .await;
        tracing::info!(order_id = %order.id, user_id = %user_id, total = order.total_price, "order placed");
        Ok(order)
    }

    /// Owner or admin only.
    pub async fn get_order(&self, caller: &AuthUser, order_id: Uuid) -> Result<Order> {
        let order = self
            .store
            .find_order(order_id)
            .await?
            .ok_or(ApiError::NotFound("order"))?;
        if order.user_id != caller.user_id && !caller.is_admin() {
            return Err(ApiError::Forbidden("you are not allowed to view this order"));
        }
        Ok(order)
    }

    pub async fn my_orders(&self, user_id: Uuid) -> Result<Vec<Order>> {
        self.store.orders_for_user(user_id).await
    }

    /// Self-service cancellation: owner or admin, and only while the order is
    /// still `processing`. Every reserved unit goes back to its shade.
    pub async fn cancel_order(&self, caller: &AuthUser, order_id: Uuid) -> Result<Order> {
        let order = self
            .store
            .find_order(order_id)
            .await?
            .ok_or(ApiError::NotFound("order"))?;
        if order.user_id != caller.user_id && !caller.is_admin() {
            return Err(ApiError::Forbidden("you are not allowed to cancel this order"));
        }
        self.apply_transition(order, OrderStatus::Cancelled).await
    }

    pub async fn admin_list_orders(&self, page: i64, limit: i64) -> Result<Vec<Order>> {
        let page = page.max(1);
        let limit = limit.clamp(1, 100);
        self.store.list_orders((page - 1) * limit, limit).await
    }

    pub async fn admin_update_status(&self, order_id: Uuid, to: OrderStatus) -> Result<Order> {
        let order = self
            .store
            .find_order(order_id)
            .await?
            .ok_or(ApiError::NotFound("order"))?;
        self.apply_transition(order, to).await
    }

    pub async fn admin_update_payment(
        &self,
        order_id: Uuid,
        status: PaymentStatus,
    ) -> Result<Order> {
        let mut order = self
            .store
            .find_order(order_id)
            .await?
            .ok_or(ApiError::NotFound("order"))?;
        order.set_payment_status(status).map_err(map_order_error)?;
        // Conditional write: if a webhook settled the payment after the read
        // above, `completed` stays in place.
        if !self
            .store
            .set_payment_status_unless_settled(order_id, status)
            .await?
        {
            return Err(ApiError::PaymentAlreadySettled);
        }
        Ok(order)
    }

    /// Compensation for a checkout whose reservations failed partway: hands
    /// back the first `applied` lines and drops the order.
    async fn unwind_reservation(&self, order: &Order, applied: usize) -> Result<()> {
        for line in &order.order_lines[..applied] {
            self.store.restore_stock(line.shade_id, line.quantity).await?;
        }
        self.store.delete_order(order.id).await
    }

    /// The one path every status change goes through: transition-table check,
    /// timestamp stamping, and the cancellation stock restore. The write is a
    /// compare-and-set on the status read above it, so of two racing callers
    /// only one applies, and a cancellation restores stock at most once. The
    /// status lands in the store before the restore runs.
    async fn apply_transition(&self, mut order: Order, to: OrderStatus) -> Result<Order> {
        let from = order.order_status;
        order.transition_to(to).map_err(map_order_error)?;
        if !self.store.update_order_status(&order, from).await? {
            return Err(ApiError::IllegalTransition { from: from.as_str(), to: to.as_str() });
        }
        if to == OrderStatus::Cancelled {
            for line in &order.order_lines {
                self.store.restore_stock(line.shade_id, line.quantity).await?;
            }
        }
        let event = match to {
            OrderStatus::Shipped => Some(OrderEvent::Shipped { order_id: order.id }),
            OrderStatus::Delivered => Some(OrderEvent::Delivered { order_id: order.id }),
            OrderStatus::Cancelled => Some(OrderEvent::Cancelled { order_id: order.id }),
            OrderStatus::Processing => None,
        };
        if let Some(event) = event {
            self.events.publish(&event).await;
        }
        tracing::info!(order_id = %order.id, status = to.as_str(), "order status updated");
        Ok(order)
    }
}

fn map_order_error(e: OrderError) -> ApiError {
    match e {
        OrderError::IllegalTransition { from, to } => ApiError::IllegalTransition { from, to },
        OrderError::PaymentSettled => ApiError::PaymentAlreadySettled,
    }
}
