//! sqlx Postgres store.
//!
//! Stock mutations compile down to a single conditional `UPDATE`, so two
//! concurrent reservations against the same shade serialize in the database
//! and can never both take the last unit.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{
    Cart, CartLine, Order, OrderLine, OrderStatus, PaymentMethod, PaymentStatus, Product, Shade,
    ShippingAddress,
};
use crate::error::{ApiError, Result};

use super::Store;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct CartRow {
    user_id: Uuid,
    items: serde_json::Value,
    total_price: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<CartRow> for Cart {
    type Error = ApiError;

    fn try_from(row: CartRow) -> Result<Self> {
        let items: Vec<CartLine> = serde_json::from_value(row.items)
            .map_err(|e| ApiError::Storage(format!("cart lines decode: {e}")))?;
        Ok(Cart {
            user_id: row.user_id,
            items,
            total_price: row.total_price,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    user_id: Uuid,
    order_lines: serde_json::Value,
    shipping_address: serde_json::Value,
    payment_method: String,
    payment_status: String,
    order_status: String,
    total_price: i64,
    payment_provider: Option<String>,
    gateway_order_id: Option<String>,
    gateway_payment_id: Option<String>,
    placed_at: DateTime<Utc>,
    paid_at: Option<DateTime<Utc>>,
    shipped_at: Option<DateTime<Utc>>,
    delivered_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = ApiError;

    fn try_from(row: OrderRow) -> Result<Self> {
        let order_lines: Vec<OrderLine> = serde_json::from_value(row.order_lines)
            .map_err(|e| ApiError::Storage(format!("order lines decode: {e}")))?;
        let shipping_address: ShippingAddress = serde_json::from_value(row.shipping_address)
            .map_err(|e| ApiError::Storage(format!("shipping address decode: {e}")))?;
        let payment_method = PaymentMethod::parse(&row.payment_method)
            .ok_or_else(|| ApiError::Storage(format!("bad payment method '{}'", row.payment_method)))?;
        let payment_status = PaymentStatus::parse(&row.payment_status)
            .ok_or_else(|| ApiError::Storage(format!("bad payment status '{}'", row.payment_status)))?;
        let order_status = OrderStatus::parse(&row.order_status)
            .ok_or_else(|| ApiError::Storage(format!("bad order status '{}'", row.order_status)))?;
        Ok(Order {
            id: row.id,
            user_id: row.user_id,
            order_lines,
            shipping_address,
            payment_method,
            payment_status,
            order_status,
            total_price: row.total_price,
            payment_provider: row.payment_provider,
            gateway_order_id: row.gateway_order_id,
            gateway_payment_id: row.gateway_payment_id,
            placed_at: row.placed_at,
            paid_at: row.paid_at,
            shipped_at: row.shipped_at,
            delivered_at: row.delivered_at,
            updated_at: row.updated_at,
        })
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| ApiError::Storage(format!("json encode: {e}")))
}

#[async_trait]
impl Store for PgStore {
    async fn find_active_product(&self, id: Uuid) -> Result<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(
            "SELECT * FROM products WHERE id = $1 AND is_active = TRUE",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(product)
    }

    async fn find_active_shade(&self, id: Uuid, product_id: Uuid) -> Result<Option<Shade>> {
        let shade = sqlx::query_as::<_, Shade>(
            "SELECT * FROM shades WHERE id = $1 AND product_id = $2 AND is_active = TRUE",
        )
        .bind(id)
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(shade)
    }

    async fn reserve_stock(&self, shade_id: Uuid, qty: i32) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE shades SET stock = stock - $1, updated_at = NOW() \
             WHERE id = $2 AND stock >= $1",
        )
        .bind(qty)
        .bind(shade_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn restore_stock(&self, shade_id: Uuid, qty: i32) -> Result<()> {
        sqlx::query("UPDATE shades SET stock = stock + $1, updated_at = NOW() WHERE id = $2")
            .bind(qty)
            .bind(shade_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn load_cart(&self, user_id: Uuid) -> Result<Option<Cart>> {
        let row = sqlx::query_as::<_, CartRow>("SELECT * FROM carts WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Cart::try_from).transpose()
    }

    async fn save_cart(&self, cart: &Cart) -> Result<()> {
        sqlx::query(
            "INSERT INTO carts (user_id, items, total_price, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (user_id) DO UPDATE \
             SET items = EXCLUDED.items, total_price = EXCLUDED.total_price, \
                 updated_at = EXCLUDED.updated_at",
        )
        .bind(cart.user_id)
        .bind(to_json(&cart.items)?)
        .bind(cart.total_price)
        .bind(cart.created_at)
        .bind(cart.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_order(&self, order: &Order) -> Result<()> {
        sqlx::query(
            "INSERT INTO orders (id, user_id, order_lines, shipping_address, payment_method, \
             payment_status, order_status, total_price, payment_provider, gateway_order_id, \
             gateway_payment_id, placed_at, paid_at, shipped_at, delivered_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)",
        )
        .bind(order.id)
        .bind(order.user_id)
        .bind(to_json(&order.order_lines)?)
        .bind(to_json(&order.shipping_address)?)
        .bind(order.payment_method.as_str())
        .bind(order.payment_status.as_str())
        .bind(order.order_status.as_str())
        .bind(order.total_price)
        .bind(&order.payment_provider)
        .bind(&order.gateway_order_id)
        .bind(&order.gateway_payment_id)
        .bind(order.placed_at)
        .bind(order.paid_at)
        .bind(order.shipped_at)
        .bind(order.delivered_at)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_order(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_order(&self, order: &Order) -> Result<()> {
        sqlx::query(
            "UPDATE orders SET payment_status = $2, order_status = $3, payment_provider = $4, \
             gateway_order_id = $5, gateway_payment_id = $6, paid_at = $7, shipped_at = $8, \
             delivered_at = $9, updated_at = $10 WHERE id = $1",
        )
        .bind(order.id)
        .bind(order.payment_status.as_str())
        .bind(order.order_status.as_str())
        .bind(&order.payment_provider)
        .bind(&order.gateway_order_id)
        .bind(&order.gateway_payment_id)
        .bind(order.paid_at)
        .bind(order.shipped_at)
        .bind(order.delivered_at)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn settle_payment(
        &self,
        order_id: Uuid,
        gateway_payment_id: &str,
        paid_at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE orders SET payment_status = 'completed', gateway_payment_id = $2, \
             paid_at = $3, updated_at = $3 \
             WHERE id = $1 AND payment_status <> 'completed'",
        )
        .bind(order_id)
        .bind(gateway_payment_id)
        .bind(paid_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn set_payment_status_unless_settled(
        &self,
        order_id: Uuid,
        status: PaymentStatus,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE orders SET payment_status = $2, updated_at = NOW() \
             WHERE id = $1 AND payment_status <> 'completed'",
        )
        .bind(order_id)
        .bind(status.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn update_order_status(&self, order: &Order, expected: OrderStatus) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE orders SET order_status = $2, shipped_at = $3, delivered_at = $4, \
             updated_at = $5 WHERE id = $1 AND order_status = $6",
        )
        .bind(order.id)
        .bind(order.order_status.as_str())
        .bind(order.shipped_at)
        .bind(order.delivered_at)
        .bind(order.updated_at)
        .bind(expected.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn find_order(&self, id: Uuid) -> Result<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Order::try_from).transpose()
    }

    async fn find_order_by_gateway_ref(&self, gateway_order_id: &str) -> Result<Option<Order>> {
        let row =
            sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE gateway_order_id = $1")
                .bind(gateway_order_id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(Order::try_from).transpose()
    }

    async fn orders_for_user(&self, user_id: Uuid) -> Result<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>(
            "SELECT * FROM orders WHERE user_id = $1 ORDER BY placed_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Order::try_from).collect()
    }

    async fn list_orders(&self, offset: i64, limit: i64) -> Result<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>(
            "SELECT * FROM orders ORDER BY placed_at DESC LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Order::try_from).collect()
    }
}
