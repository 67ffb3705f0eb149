//! Checkout engine properties: stock ledger, cart consistency, order
//! creation, and the order status state machine.

mod common;

use common::*;
use futures::future::join_all;

use glowcart::domain::{IssueCode, OrderStatus, PaymentMethod, PaymentStatus};
use glowcart::error::ApiError;
use glowcart::store::Store;

#[tokio::test]
async fn checkout_freezes_total_reserves_stock_and_empties_cart() {
    let e = engine();
    let (product, shade) = seed_catalog(&e.store, 500, None, 3).await;
    let caller = customer();

    e.cart.add_line(caller.user_id, product, shade, 2).await.unwrap();
    let order = e
        .orders
        .create_order_from_cart(caller.user_id, address(), PaymentMethod::Cod)
        .await
        .unwrap();

    assert_eq!(order.total_price, 1000);
    assert_eq!(order.order_status, OrderStatus::Processing);
    assert_eq!(order.payment_status, PaymentStatus::Pending);
    assert_eq!(e.store.stock_of(shade).await, Some(1));
    assert!(e.cart.get_cart(caller.user_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn prepaid_checkout_settles_payment_immediately() {
    let e = engine();
    let (product, shade) = seed_catalog(&e.store, 500, None, 3).await;
    let caller = customer();

    e.cart.add_line(caller.user_id, product, shade, 1).await.unwrap();
    let order = e
        .orders
        .create_order_from_cart(caller.user_id, address(), PaymentMethod::Card)
        .await
        .unwrap();
    assert_eq!(order.payment_status, PaymentStatus::Completed);
}

#[tokio::test]
async fn order_total_is_independent_of_later_price_changes() {
    let e = engine();
    let (product, shade) = seed_catalog(&e.store, 500, None, 5).await;
    let caller = customer();

    e.cart.add_line(caller.user_id, product, shade, 2).await.unwrap();
    let order = e
        .orders
        .create_order_from_cart(caller.user_id, address(), PaymentMethod::Cod)
        .await
        .unwrap();

    e.store.set_shade_price(shade, Some(900)).await;
    let fetched = e.orders.get_order(&caller, order.id).await.unwrap();
    assert_eq!(fetched.total_price, 1000);
    assert_eq!(fetched.order_lines[0].price, 500);
}

#[tokio::test]
async fn cancel_restores_every_reserved_unit() {
    let e = engine();
    let (product, shade) = seed_catalog(&e.store, 500, None, 3).await;
    let caller = customer();

    e.cart.add_line(caller.user_id, product, shade, 2).await.unwrap();
    let order = e
        .orders
        .create_order_from_cart(caller.user_id, address(), PaymentMethod::Cod)
        .await
        .unwrap();
    assert_eq!(e.store.stock_of(shade).await, Some(1));

    let cancelled = e.orders.cancel_order(&caller, order.id).await.unwrap();
    assert_eq!(cancelled.order_status, OrderStatus::Cancelled);
    assert_eq!(e.store.stock_of(shade).await, Some(3));
}

#[tokio::test]
async fn non_owner_cannot_cancel_but_admin_can() {
    let e = engine();
    let (product, shade) = seed_catalog(&e.store, 500, None, 3).await;
    let caller = customer();

    e.cart.add_line(caller.user_id, product, shade, 1).await.unwrap();
    let order = e
        .orders
        .create_order_from_cart(caller.user_id, address(), PaymentMethod::Cod)
        .await
        .unwrap();

    let stranger = customer();
    assert!(matches!(
        e.orders.cancel_order(&stranger, order.id).await,
        Err(ApiError::Forbidden(_))
    ));
    assert!(e.orders.cancel_order(&admin(), order.id).await.is_ok());
}

#[tokio::test]
async fn checkout_with_empty_or_missing_cart_fails() {
    let e = engine();
    let caller = customer();
    assert!(matches!(
        e.orders
            .create_order_from_cart(caller.user_id, address(), PaymentMethod::Cod)
            .await,
        Err(ApiError::NotFound("cart"))
    ));

    let (product, shade) = seed_catalog(&e.store, 500, None, 3).await;
    e.cart.add_line(caller.user_id, product, shade, 1).await.unwrap();
    e.cart.clear_cart(caller.user_id).await.unwrap();
    assert!(matches!(
        e.orders
            .create_order_from_cart(caller.user_id, address(), PaymentMethod::Cod)
            .await,
        Err(ApiError::Validation(_))
    ));
}

#[tokio::test]
async fn add_counts_existing_line_against_stock() {
    let e = engine();
    let (product, shade) = seed_catalog(&e.store, 500, None, 3).await;
    let caller = customer();

    e.cart.add_line(caller.user_id, product, shade, 2).await.unwrap();
    assert!(matches!(
        e.cart.add_line(caller.user_id, product, shade, 2).await,
        Err(ApiError::InsufficientStock { .. })
    ));
    // Stock was never touched by cart operations.
    assert_eq!(e.store.stock_of(shade).await, Some(3));
}

#[tokio::test]
async fn add_rejects_quantity_overflowing_the_existing_line() {
    let e = engine();
    let (product, shade) = seed_catalog(&e.store, 500, None, 3).await;
    let caller = customer();

    e.cart.add_line(caller.user_id, product, shade, 2).await.unwrap();
    // A requested total past i32::MAX is a stock failure, not a wrap-around.
    assert!(matches!(
        e.cart.add_line(caller.user_id, product, shade, i32::MAX).await,
        Err(ApiError::InsufficientStock { .. })
    ));
    let cart = e.cart.get_cart(caller.user_id).await.unwrap();
    assert_eq!(cart.items[0].quantity, 2);
    assert_eq!(cart.total_price, 1000);
}

#[tokio::test]
async fn cart_total_tracks_every_service_mutation() {
    let e = engine();
    let (product, shade) = seed_catalog(&e.store, 500, Some(450), 10).await;
    let caller = customer();

    let cart = e.cart.add_line(caller.user_id, product, shade, 2).await.unwrap();
    assert_eq!(cart.total_price, 900);
    let cart = e.cart.update_line(caller.user_id, product, shade, 5).await.unwrap();
    assert_eq!(cart.total_price, 2250);
    let cart = e.cart.remove_line(caller.user_id, product, shade).await.unwrap();
    assert_eq!(cart.total_price, 0);
}

#[tokio::test]
async fn validate_blocks_atomically_on_inactive_shade() {
    let e = engine();
    let (product, shade) = seed_catalog(&e.store, 500, None, 3).await;
    let caller = customer();

    e.cart.add_line(caller.user_id, product, shade, 2).await.unwrap();
    e.store.set_shade_active(shade, false).await;

    let err = e.cart.validate_for_checkout(caller.user_id).await.unwrap_err();
    match err {
        ApiError::CheckoutValidationFailed(issues) => {
            assert_eq!(issues.len(), 1);
            assert_eq!(issues[0].code, IssueCode::ShadeInactive);
        }
        other => panic!("expected CheckoutValidationFailed, got {other:?}"),
    }
    // Blocked validation leaves the cart untouched.
    let cart = e.cart.get_cart(caller.user_id).await.unwrap();
    assert_eq!(cart.items.len(), 1);
    assert_eq!(cart.items[0].quantity, 2);
}

#[tokio::test]
async fn validate_collects_issues_across_all_lines() {
    let e = engine();
    let caller = customer();
    let (p1, s1) = seed_catalog(&e.store, 500, None, 3).await;
    let (p2, s2) = seed_catalog(&e.store, 300, None, 3).await;

    e.cart.add_line(caller.user_id, p1, s1, 1).await.unwrap();
    e.cart.add_line(caller.user_id, p2, s2, 3).await.unwrap();
    e.store.set_product_active(p1, false).await;
    e.store.set_stock(s2, 1).await;

    let err = e.cart.validate_for_checkout(caller.user_id).await.unwrap_err();
    match err {
        ApiError::CheckoutValidationFailed(issues) => {
            let codes: Vec<IssueCode> = issues.iter().map(|i| i.code).collect();
            assert_eq!(codes, vec![IssueCode::ProductInactive, IssueCode::InsufficientStock]);
        }
        other => panic!("expected CheckoutValidationFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn validate_accepts_and_refreshes_price_on_warning_only() {
    let e = engine();
    let (product, shade) = seed_catalog(&e.store, 500, None, 3).await;
    let caller = customer();

    e.cart.add_line(caller.user_id, product, shade, 2).await.unwrap();
    e.store.set_shade_price(shade, Some(400)).await;

    let (cart, warnings) = e.cart.validate_for_checkout(caller.user_id).await.unwrap();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].code, IssueCode::PriceUpdated);
    assert_eq!(cart.items[0].price, 400);
    assert_eq!(cart.total_price, 800);
}

#[tokio::test]
async fn refresh_self_heals_and_never_blocks() {
    let e = engine();
    let caller = customer();
    let (p1, s1) = seed_catalog(&e.store, 500, None, 1).await;
    let (p2, s2) = seed_catalog(&e.store, 300, None, 5).await;
    let (p3, s3) = seed_catalog(&e.store, 200, None, 5).await;

    // Build the cart while everything is in stock.
    let mut cart = e.cart.get_cart(caller.user_id).await.unwrap();
    cart.add_line(glowcart::domain::CartLine { product_id: p1, shade_id: s1, quantity: 1, price: 500 });
    cart.add_line(glowcart::domain::CartLine { product_id: p2, shade_id: s2, quantity: 4, price: 300 });
    cart.add_line(glowcart::domain::CartLine { product_id: p3, shade_id: s3, quantity: 1, price: 200 });
    e.store.save_cart(&cart).await.unwrap();

    // Then the catalog moves underneath it.
    e.store.remove_shade(s1).await;
    e.store.set_stock(s2, 2).await;
    e.store.set_shade_price(s3, Some(150)).await;

    let (cart, warnings) = e.cart.refresh(caller.user_id).await.unwrap();
    let codes: Vec<IssueCode> = warnings.iter().map(|w| w.code).collect();
    assert!(codes.contains(&IssueCode::ShadeRemoved));
    assert!(codes.contains(&IssueCode::QuantityAdjusted));
    assert!(codes.contains(&IssueCode::PriceUpdated));
    assert_eq!(cart.items.len(), 2);
    assert_eq!(cart.items[0].quantity, 2);
    assert_eq!(cart.items[1].price, 150);
    assert_eq!(cart.total_price, 2 * 300 + 150);
}

#[tokio::test]
async fn status_updates_follow_the_transition_table() {
    let e = engine();
    let (product, shade) = seed_catalog(&e.store, 500, None, 3).await;
    let caller = customer();

    e.cart.add_line(caller.user_id, product, shade, 1).await.unwrap();
    let order = e
        .orders
        .create_order_from_cart(caller.user_id, address(), PaymentMethod::Cod)
        .await
        .unwrap();

    // processing -> delivered skips shipped and must fail.
    assert!(matches!(
        e.orders.admin_update_status(order.id, OrderStatus::Delivered).await,
        Err(ApiError::IllegalTransition { from: "processing", to: "delivered" })
    ));

    let shipped = e.orders.admin_update_status(order.id, OrderStatus::Shipped).await.unwrap();
    assert!(shipped.shipped_at.is_some());

    // A shipped order can no longer be cancelled.
    assert!(matches!(
        e.orders.cancel_order(&caller, order.id).await,
        Err(ApiError::IllegalTransition { .. })
    ));

    let delivered = e.orders.admin_update_status(order.id, OrderStatus::Delivered).await.unwrap();
    assert!(delivered.delivered_at.is_some());
}

#[tokio::test]
async fn admin_payment_update_rejects_settled_payment() {
    let e = engine();
    let (product, shade) = seed_catalog(&e.store, 500, None, 3).await;
    let caller = customer();

    e.cart.add_line(caller.user_id, product, shade, 1).await.unwrap();
    let order = e
        .orders
        .create_order_from_cart(caller.user_id, address(), PaymentMethod::Cod)
        .await
        .unwrap();

    e.orders.admin_update_payment(order.id, PaymentStatus::Completed).await.unwrap();
    assert!(matches!(
        e.orders.admin_update_payment(order.id, PaymentStatus::Failed).await,
        Err(ApiError::PaymentAlreadySettled)
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn parallel_reservations_never_oversell() {
    let e = engine();
    let (_, shade) = seed_catalog(&e.store, 500, None, 3).await;

    let attempts = 8;
    let tasks: Vec<_> = (0..attempts)
        .map(|_| {
            let store = e.store.clone();
            tokio::spawn(async move { store.reserve_stock(shade, 1).await.unwrap() })
        })
        .collect();
    let results = join_all(tasks).await;
    let successes = results.into_iter().filter(|r| *r.as_ref().unwrap()).count();

    assert_eq!(successes, 3);
    assert_eq!(e.store.stock_of(shade).await, Some(0));
}

#[tokio::test]
async fn stock_never_goes_negative() {
    let e = engine();
    let (_, shade) = seed_catalog(&e.store, 500, None, 2).await;

    assert!(e.store.reserve_stock(shade, 2).await.unwrap());
    assert!(!e.store.reserve_stock(shade, 1).await.unwrap());
    e.store.restore_stock(shade, 2).await.unwrap();
    assert!(!e.store.reserve_stock(shade, 3).await.unwrap());
    assert_eq!(e.store.stock_of(shade).await, Some(2));
}

/// Delegating store that over-reports one shade's stock on catalog reads,
/// reproducing the window where validation passes but the conditional
/// reservation loses the race.
struct RacyStore {
    inner: std::sync::Arc<glowcart::store::MemoryStore>,
    inflated: uuid::Uuid,
}

#[async_trait::async_trait]
impl Store for RacyStore {
    async fn find_active_product(
        &self,
        id: uuid::Uuid,
    ) -> glowcart::error::Result<Option<glowcart::domain::Product>> {
        self.inner.find_active_product(id).await
    }

    async fn find_active_shade(
        &self,
        id: uuid::Uuid,
        product_id: uuid::Uuid,
    ) -> glowcart::error::Result<Option<glowcart::domain::Shade>> {
        let mut shade = self.inner.find_active_shade(id, product_id).await?;
        if let Some(s) = shade.as_mut() {
            if s.id == self.inflated {
                s.stock += 1;
            }
        }
        Ok(shade)
    }

    async fn reserve_stock(&self, shade_id: uuid::Uuid, qty: i32) -> glowcart::error::Result<bool> {
        self.inner.reserve_stock(shade_id, qty).await
    }

    async fn restore_stock(&self, shade_id: uuid::Uuid, qty: i32) -> glowcart::error::Result<()> {
        self.inner.restore_stock(shade_id, qty).await
    }

    async fn load_cart(
        &self,
        user_id: uuid::Uuid,
    ) -> glowcart::error::Result<Option<glowcart::domain::Cart>> {
        self.inner.load_cart(user_id).await
    }

    async fn save_cart(&self, cart: &glowcart::domain::Cart) -> glowcart::error::Result<()> {
        self.inner.save_cart(cart).await
    }

    async fn insert_order(&self, order: &glowcart::domain::Order) -> glowcart::error::Result<()> {
        self.inner.insert_order(order).await
    }

    async fn delete_order(&self, id: uuid::Uuid) -> glowcart::error::Result<()> {
        self.inner.delete_order(id).await
    }

    async fn update_order(&self, order: &glowcart::domain::Order) -> glowcart::error::Result<()> {
        self.inner.update_order(order).await
    }

    async fn settle_payment(
        &self,
        order_id: uuid::Uuid,
        gateway_payment_id: &str,
        paid_at: chrono::DateTime<chrono::Utc>,
    ) -> glowcart::error::Result<bool> {
        self.inner.settle_payment(order_id, gateway_payment_id, paid_at).await
    }

    async fn set_payment_status_unless_settled(
        &self,
        order_id: uuid::Uuid,
        status: glowcart::domain::PaymentStatus,
    ) -> glowcart::error::Result<bool> {
        self.inner.set_payment_status_unless_settled(order_id, status).await
    }

    async fn update_order_status(
        &self,
        order: &glowcart::domain::Order,
        expected: glowcart::domain::OrderStatus,
    ) -> glowcart::error::Result<bool> {
        self.inner.update_order_status(order, expected).await
    }

    async fn find_order(
        &self,
        id: uuid::Uuid,
    ) -> glowcart::error::Result<Option<glowcart::domain::Order>> {
        self.inner.find_order(id).await
    }

    async fn find_order_by_gateway_ref(
        &self,
        gateway_order_id: &str,
    ) -> glowcart::error::Result<Option<glowcart::domain::Order>> {
        self.inner.find_order_by_gateway_ref(gateway_order_id).await
    }

    async fn orders_for_user(
        &self,
        user_id: uuid::Uuid,
    ) -> glowcart::error::Result<Vec<glowcart::domain::Order>> {
        self.inner.orders_for_user(user_id).await
    }

    async fn list_orders(
        &self,
        offset: i64,
        limit: i64,
    ) -> glowcart::error::Result<Vec<glowcart::domain::Order>> {
        self.inner.list_orders(offset, limit).await
    }
}

#[tokio::test]
async fn losing_the_reservation_race_leaves_no_partial_deduction() {
    use std::sync::Arc;
    use glowcart::services::{CartService, EventPublisher, OrderService};

    let memory = Arc::new(glowcart::store::MemoryStore::new());
    let caller = customer();
    let (p1, s1) = seed_catalog(&memory, 500, None, 2).await;
    let (p2, s2) = seed_catalog(&memory, 300, None, 1).await;

    // Catalog reads claim one more unit of the second shade than the ledger
    // holds, so validation passes and the reservation fails.
    let racy: Arc<dyn Store> = Arc::new(RacyStore { inner: memory.clone(), inflated: s2 });
    let cart = CartService::new(racy.clone());
    let orders = OrderService::new(racy, EventPublisher::disabled());

    cart.add_line(caller.user_id, p1, s1, 2).await.unwrap();
    cart.add_line(caller.user_id, p2, s2, 2).await.unwrap();

    let err = orders
        .create_order_from_cart(caller.user_id, address(), PaymentMethod::Cod)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::CheckoutValidationFailed(_)));

    // The first shade's reservation was unwound and nothing was committed.
    assert_eq!(memory.stock_of(s1).await, Some(2));
    assert_eq!(memory.stock_of(s2).await, Some(1));
    assert_eq!(orders.my_orders(caller.user_id).await.unwrap().len(), 0);
    assert_eq!(cart.get_cart(caller.user_id).await.unwrap().items.len(), 2);
}

/// Delegating store that parks order lookups at a barrier, so two status
/// changes both read the order while it is still `processing`.
struct GatedStore {
    inner: std::sync::Arc<glowcart::store::MemoryStore>,
    gate: tokio::sync::Barrier,
}

#[async_trait::async_trait]
impl Store for GatedStore {
    async fn find_active_product(
        &self,
        id: uuid::Uuid,
    ) -> glowcart::error::Result<Option<glowcart::domain::Product>> {
        self.inner.find_active_product(id).await
    }

    async fn find_active_shade(
        &self,
        id: uuid::Uuid,
        product_id: uuid::Uuid,
    ) -> glowcart::error::Result<Option<glowcart::domain::Shade>> {
        self.inner.find_active_shade(id, product_id).await
    }

    async fn reserve_stock(&self, shade_id: uuid::Uuid, qty: i32) -> glowcart::error::Result<bool> {
        self.inner.reserve_stock(shade_id, qty).await
    }

    async fn restore_stock(&self, shade_id: uuid::Uuid, qty: i32) -> glowcart::error::Result<()> {
        self.inner.restore_stock(shade_id, qty).await
    }

    async fn load_cart(
        &self,
        user_id: uuid::Uuid,
    ) -> glowcart::error::Result<Option<glowcart::domain::Cart>> {
        self.inner.load_cart(user_id).await
    }

    async fn save_cart(&self, cart: &glowcart::domain::Cart) -> glowcart::error::Result<()> {
        self.inner.save_cart(cart).await
    }

    async fn insert_order(&self, order: &glowcart::domain::Order) -> glowcart::error::Result<()> {
        self.inner.insert_order(order).await
    }

    async fn delete_order(&self, id: uuid::Uuid) -> glowcart::error::Result<()> {
        self.inner.delete_order(id).await
    }

    async fn update_order(&self, order: &glowcart::domain::Order) -> glowcart::error::Result<()> {
        self.inner.update_order(order).await
    }

    async fn settle_payment(
        &self,
        order_id: uuid::Uuid,
        gateway_payment_id: &str,
        paid_at: chrono::DateTime<chrono::Utc>,
    ) -> glowcart::error::Result<bool> {
        self.inner.settle_payment(order_id, gateway_payment_id, paid_at).await
    }

    async fn set_payment_status_unless_settled(
        &self,
        order_id: uuid::Uuid,
        status: glowcart::domain::PaymentStatus,
    ) -> glowcart::error::Result<bool> {
        self.inner.set_payment_status_unless_settled(order_id, status).await
    }

    async fn update_order_status(
        &self,
        order: &glowcart::domain::Order,
        expected: glowcart::domain::OrderStatus,
    ) -> glowcart::error::Result<bool> {
        self.inner.update_order_status(order, expected).await
    }

    async fn find_order(
        &self,
        id: uuid::Uuid,
    ) -> glowcart::error::Result<Option<glowcart::domain::Order>> {
        let order = self.inner.find_order(id).await?;
        self.gate.wait().await;
        Ok(order)
    }

    async fn find_order_by_gateway_ref(
        &self,
        gateway_order_id: &str,
    ) -> glowcart::error::Result<Option<glowcart::domain::Order>> {
        self.inner.find_order_by_gateway_ref(gateway_order_id).await
    }

    async fn orders_for_user(
        &self,
        user_id: uuid::Uuid,
    ) -> glowcart::error::Result<Vec<glowcart::domain::Order>> {
        self.inner.orders_for_user(user_id).await
    }

    async fn list_orders(
        &self,
        offset: i64,
        limit: i64,
    ) -> glowcart::error::Result<Vec<glowcart::domain::Order>> {
        self.inner.list_orders(offset, limit).await
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_cancels_restore_stock_exactly_once() {
    use std::sync::Arc;
    use glowcart::services::{CartService, EventPublisher, OrderService};

    let memory = Arc::new(glowcart::store::MemoryStore::new());
    let caller = customer();
    let (product, shade) = seed_catalog(&memory, 500, None, 3).await;

    let cart = CartService::new(memory.clone());
    let setup = OrderService::new(memory.clone(), EventPublisher::disabled());
    cart.add_line(caller.user_id, product, shade, 2).await.unwrap();
    let order = setup
        .create_order_from_cart(caller.user_id, address(), PaymentMethod::Cod)
        .await
        .unwrap();
    assert_eq!(memory.stock_of(shade).await, Some(1));

    // Both cancels read the order as `processing` before either writes.
    let gated: Arc<dyn Store> = Arc::new(GatedStore {
        inner: memory.clone(),
        gate: tokio::sync::Barrier::new(2),
    });
    let orders = Arc::new(OrderService::new(gated, EventPublisher::disabled()));
    let tasks: Vec<_> = (0..2)
        .map(|_| {
            let orders = orders.clone();
            let caller = caller.clone();
            let order_id = order.id;
            tokio::spawn(async move { orders.cancel_order(&caller, order_id).await })
        })
        .collect();
    let outcomes: Vec<_> = join_all(tasks).await.into_iter().map(|r| r.unwrap()).collect();

    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(outcomes
        .iter()
        .any(|r| matches!(r, Err(ApiError::IllegalTransition { .. }))));
    // The loser never ran the restore: every reserved unit came back once.
    assert_eq!(memory.stock_of(shade).await, Some(3));
    let stored = memory.find_order(order.id).await.unwrap().unwrap();
    assert_eq!(stored.order_status, OrderStatus::Cancelled);
}
