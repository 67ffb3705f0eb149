//! Persistence seam.
//!
//! The services are written against [`Store`]; production runs the sqlx
//! Postgres implementation, tests the in-memory one. The stock ledger
//! contract lives here: `reserve_stock` is the single conditional, atomic
//! decrement every component must go through — no caller reads stock and
//! writes it back outside that primitive.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{Cart, Order, OrderStatus, PaymentStatus, Product, Shade};
use crate::error::Result;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait Store: Send + Sync {
    // Catalog, read-only (owned by the catalog collaborator).
    async fn find_active_product(&self, id: Uuid) -> Result<Option<Product>>;
    async fn find_active_shade(&self, id: Uuid, product_id: Uuid) -> Result<Option<Shade>>;

    // Stock ledger. `reserve_stock` decrements only if `stock >= qty` and
    // reports whether it did; `restore_stock` increments unconditionally and
    // must only be fed previously-reserved quantities.
    async fn reserve_stock(&self, shade_id: Uuid, qty: i32) -> Result<bool>;
    async fn restore_stock(&self, shade_id: Uuid, qty: i32) -> Result<()>;

    // Carts: one per user, upserted whole.
    async fn load_cart(&self, user_id: Uuid) -> Result<Option<Cart>>;
    async fn save_cart(&self, cart: &Cart) -> Result<()>;

    // Orders.
    async fn insert_order(&self, order: &Order) -> Result<()>;
    /// Compensation path only: removes an order whose reservations failed.
    async fn delete_order(&self, id: Uuid) -> Result<()>;
    async fn update_order(&self, order: &Order) -> Result<()>;
    /// Compare-and-set settlement: records the gateway payment id and flips
    /// the payment to `completed`, unless it already is. Returns whether this
    /// call won the flip; concurrent duplicate deliveries see `false`.
    async fn settle_payment(
        &self,
        order_id: Uuid,
        gateway_payment_id: &str,
        paid_at: DateTime<Utc>,
    ) -> Result<bool>;
    /// Conditional payment-status write: `completed` is absorbing, so a
    /// settled payment is never overwritten. Returns whether a write happened.
    async fn set_payment_status_unless_settled(
        &self,
        order_id: Uuid,
        status: PaymentStatus,
    ) -> Result<bool>;
    /// Compare-and-set status transition: applies `order`'s status and
    /// lifecycle timestamps only while the stored status still equals
    /// `expected`, so two racing transitions cannot both apply.
    async fn update_order_status(&self, order: &Order, expected: OrderStatus) -> Result<bool>;
    async fn find_order(&self, id: Uuid) -> Result<Option<Order>>;
    async fn find_order_by_gateway_ref(&self, gateway_order_id: &str) -> Result<Option<Order>>;
    async fn orders_for_user(&self, user_id: Uuid) -> Result<Vec<Order>>;
    async fn list_orders(&self, offset: i64, limit: i64) -> Result<Vec<Order>>;
}
