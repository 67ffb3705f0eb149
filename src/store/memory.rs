//! In-memory store for tests and local development.
//!
//! All state sits behind one `RwLock`; the conditional stock decrement runs
//! check-and-subtract under the write lock, which makes it linearizable per
//! shade exactly like the SQL `UPDATE ... WHERE stock >= qty` it stands in
//! for.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::{Cart, Order, OrderStatus, PaymentStatus, Product, Shade};
use crate::error::Result;

use super::Store;

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    products: HashMap<Uuid, Product>,
    shades: HashMap<Uuid, Shade>,
    carts: HashMap<Uuid, Cart>,
    orders: HashMap<Uuid, Order>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed_product(&self, product: Product) {
        self.inner.write().await.products.insert(product.id, product);
    }

    pub async fn seed_shade(&self, shade: Shade) {
        self.inner.write().await.shades.insert(shade.id, shade);
    }

    pub async fn set_product_active(&self, id: Uuid, active: bool) {
        if let Some(p) = self.inner.write().await.products.get_mut(&id) {
            p.is_active = active;
        }
    }

    pub async fn set_shade_active(&self, id: Uuid, active: bool) {
        if let Some(s) = self.inner.write().await.shades.get_mut(&id) {
            s.is_active = active;
        }
    }

    pub async fn set_stock(&self, id: Uuid, stock: i32) {
        if let Some(s) = self.inner.write().await.shades.get_mut(&id) {
            s.stock = stock;
        }
    }

    pub async fn set_shade_price(&self, id: Uuid, price: Option<i64>) {
        if let Some(s) = self.inner.write().await.shades.get_mut(&id) {
            s.price = price;
        }
    }

    pub async fn remove_shade(&self, id: Uuid) {
        self.inner.write().await.shades.remove(&id);
    }

    pub async fn stock_of(&self, shade_id: Uuid) -> Option<i32> {
        self.inner.read().await.shades.get(&shade_id).map(|s| s.stock)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn find_active_product(&self, id: Uuid) -> Result<Option<Product>> {
        Ok(self
            .inner
            .read()
            .await
            .products
            .get(&id)
            .filter(|p| p.is_active)
            .cloned())
    }

    async fn find_active_shade(&self, id: Uuid, product_id: Uuid) -> Result<Option<Shade>> {
        Ok(self
            .inner
            .read()
            .await
            .shades
            .get(&id)
            .filter(|s| s.is_active && s.product_id == product_id)
            .cloned())
    }

    async fn reserve_stock(&self, shade_id: Uuid, qty: i32) -> Result<bool> {
        let mut inner = self.inner.write().await;
        match inner.shades.get_mut(&shade_id) {
            Some(shade) if shade.stock >= qty => {
                shade.stock -= qty;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn restore_stock(&self, shade_id: Uuid, qty: i32) -> Result<()> {
        if let Some(shade) = self.inner.write().await.shades.get_mut(&shade_id) {
            shade.stock += qty;
        }
        Ok(())
    }

    async fn load_cart(&self, user_id: Uuid) -> Result<Option<Cart>> {
        Ok(self.inner.read().await.carts.get(&user_id).cloned())
    }

    async fn save_cart(&self, cart: &Cart) -> Result<()> {
        self.inner.write().await.carts.insert(cart.user_id, cart.clone());
        Ok(())
    }

    async fn insert_order(&self, order: &Order) -> Result<()> {
        self.inner.write().await.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn delete_order(&self, id: Uuid) -> Result<()> {
        self.inner.write().await.orders.remove(&id);
        Ok(())
    }

    async fn update_order(&self, order: &Order) -> Result<()> {
        self.inner.write().await.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn settle_payment(
        &self,
        order_id: Uuid,
        gateway_payment_id: &str,
        paid_at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut inner = self.inner.write().await;
        match inner.orders.get_mut(&order_id) {
            Some(order) if order.payment_status != PaymentStatus::Completed => {
                order.payment_status = PaymentStatus::Completed;
                order.gateway_payment_id = Some(gateway_payment_id.to_string());
                order.paid_at = Some(paid_at);
                order.updated_at = paid_at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set_payment_status_unless_settled(
        &self,
        order_id: Uuid,
        status: PaymentStatus,
    ) -> Result<bool> {
        let mut inner = self.inner.write().await;
        match inner.orders.get_mut(&order_id) {
            Some(order) if order.payment_status != PaymentStatus::Completed => {
                order.payment_status = status;
                order.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn update_order_status(&self, order: &Order, expected: OrderStatus) -> Result<bool> {
        let mut inner = self.inner.write().await;
        match inner.orders.get_mut(&order.id) {
            Some(stored) if stored.order_status == expected => {
                stored.order_status = order.order_status;
                stored.shipped_at = order.shipped_at;
                stored.delivered_at = order.delivered_at;
                stored.updated_at = order.updated_at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_order(&self, id: Uuid) -> Result<Option<Order>> {
        Ok(self.inner.read().await.orders.get(&id).cloned())
    }

    async fn find_order_by_gateway_ref(&self, gateway_order_id: &str) -> Result<Option<Order>> {
        Ok(self
            .inner
            .read()
            .await
            .orders
            .values()
            .find(|o| o.gateway_order_id.as_deref() == Some(gateway_order_id))
            .cloned())
    }

    async fn orders_for_user(&self, user_id: Uuid) -> Result<Vec<Order>> {
        let mut orders: Vec<Order> = self
            .inner
            .read()
            .await
            .orders
            .values()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.placed_at.cmp(&a.placed_at));
        Ok(orders)
    }

    async fn list_orders(&self, offset: i64, limit: i64) -> Result<Vec<Order>> {
        let mut orders: Vec<Order> = self.inner.read().await.orders.values().cloned().collect();
        orders.sort_by(|a, b| b.placed_at.cmp(&a.placed_at));
        Ok(orders
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }
}
