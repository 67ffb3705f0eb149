//! Cart Consistency Manager.
//!
//! Owns the user's in-progress selection and reconciles it against live
//! catalog state. Never touches the stock ledger: availability is checked
//! here, but stock only leaves the pool at checkout.

use std::sync::Arc;

use uuid::Uuid;

use crate::domain::{resolve_price, Cart, CartLine, IssueCode, LineIssue};
use crate::error::{ApiError, Result};
use crate::store::Store;

pub struct CartService {
    store: Arc<dyn Store>,
}

impl CartService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Returns the user's cart, or an empty one if none exists yet. Carts are
    /// created lazily on first add, so the empty view is not persisted.
    pub async fn get_cart(&self, user_id: Uuid) -> Result<Cart> {
        Ok(self
            .store
            .load_cart(user_id)
            .await?
            .unwrap_or_else(|| Cart::new(user_id)))
    }

    pub async fn add_line(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        shade_id: Uuid,
        quantity: i32,
    ) -> Result<Cart> {
        if quantity < 1 {
            return Err(ApiError::Validation("quantity must be at least 1".into()));
        }
        let product = self
            .store
            .find_active_product(product_id)
            .await?
            .ok_or(ApiError::NotFound("product"))?;
        let shade = self
            .store
            .find_active_shade(shade_id, product_id)
            .await?
            .ok_or(ApiError::NotFound("shade"))?;

        let mut cart = self.get_cart(user_id).await?;
        // The existing line counts against stock: adding 2 on top of 3 needs
        // 5. A sum that does not fit i32 cannot fit stock either.
        let already = cart.quantity_of(product_id, shade_id);
        if already
            .checked_add(quantity)
            .map_or(true, |total| shade.stock < total)
        {
            return Err(ApiError::InsufficientStock {
                name: format!("{} - {}", product.name, shade.shade_name),
            });
        }
        cart.add_line(CartLine {
            product_id,
            shade_id,
            quantity,
            price: resolve_price(&product, &shade),
        });
        self.store.save_cart(&cart).await?;
        Ok(cart)
    }

    /// Sets a line's quantity; 0 removes the line.
    pub async fn update_line(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        shade_id: Uuid,
        quantity: i32,
    ) -> Result<Cart> {
        if quantity < 0 {
            return Err(ApiError::Validation("quantity must not be negative".into()));
        }
        let mut cart = self
            .store
            .load_cart(user_id)
            .await?
            .ok_or(ApiError::NotFound("cart"))?;
        if quantity > 0 {
            let product = self
                .store
                .find_active_product(product_id)
                .await?
                .ok_or(ApiError::NotFound("product"))?;
            let shade = self
                .store
                .find_active_shade(shade_id, product_id)
                .await?
                .ok_or(ApiError::NotFound("shade"))?;
            if shade.stock < quantity {
                return Err(ApiError::InsufficientStock {
                    name: format!("{} - {}", product.name, shade.shade_name),
                });
            }
        }
        cart.set_quantity(product_id, shade_id, quantity)
            .map_err(|_| ApiError::NotFound("cart line"))?;
        self.store.save_cart(&cart).await?;
        Ok(cart)
    }

    pub async fn remove_line(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        shade_id: Uuid,
    ) -> Result<Cart> {
        let mut cart = self
            .store
            .load_cart(user_id)
            .await?
            .ok_or(ApiError::NotFound("cart"))?;
        cart.remove_line(product_id, shade_id)
            .map_err(|_| ApiError::NotFound("cart line"))?;
        self.store.save_cart(&cart).await?;
        Ok(cart)
    }

    /// Carts are never deleted, only emptied.
    pub async fn clear_cart(&self, user_id: Uuid) -> Result<Cart> {
        let mut cart = self.get_cart(user_id).await?;
        cart.clear();
        self.store.save_cart(&cart).await?;
        Ok(cart)
    }

    /// Strict pre-checkout validation. Any blocking issue leaves the cart
    /// untouched and returns the complete issue set; warnings alone update
    /// the cart to the validated line set and accept.
    pub async fn validate_for_checkout(&self, user_id: Uuid) -> Result<(Cart, Vec<LineIssue>)> {
        let mut cart = self
            .store
            .load_cart(user_id)
            .await?
            .ok_or(ApiError::NotFound("cart"))?;
        let (validated, issues) = validate_lines(self.store.as_ref(), &cart).await?;
        if issues.iter().any(|i| i.code.is_blocking()) {
            return Err(ApiError::CheckoutValidationFailed(issues));
        }
        if !issues.is_empty() {
            cart.replace_lines(validated);
            self.store.save_cart(&cart).await?;
        }
        Ok((cart, issues))
    }

    /// Non-blocking reconciliation for cart-page display. Self-heals the cart
    /// against the live catalog and reports what changed.
    pub async fn refresh(&self, user_id: Uuid) -> Result<(Cart, Vec<LineIssue>)> {
        let mut cart = self.get_cart(user_id).await?;
        let mut kept = Vec::with_capacity(cart.items.len());
        let mut warnings = Vec::new();

        for line in &cart.items {
            let issue = |code, message: String| LineIssue {
                code,
                product_id: line.product_id,
                shade_id: line.shade_id,
                message,
            };
            let Some(product) = self.store.find_active_product(line.product_id).await? else {
                warnings.push(issue(
                    IssueCode::ProductRemoved,
                    "product is no longer available".into(),
                ));
                continue;
            };
            let Some(shade) = self
                .store
                .find_active_shade(line.shade_id, line.product_id)
                .await?
            else {
                warnings.push(issue(
                    IssueCode::ShadeRemoved,
                    format!("shade of {} is no longer available", product.name),
                ));
                continue;
            };
            if shade.stock == 0 {
                warnings.push(issue(
                    IssueCode::OutOfStock,
                    format!("{} - {} is out of stock", product.name, shade.shade_name),
                ));
                continue;
            }
            let mut quantity = line.quantity;
            if shade.stock < quantity {
                quantity = shade.stock;
                warnings.push(issue(
                    IssueCode::QuantityAdjusted,
                    format!("quantity reduced to {quantity} available"),
                ));
            }
            let price = resolve_price(&product, &shade);
            if price != line.price {
                warnings.push(issue(IssueCode::PriceUpdated, "price has changed".into()));
            }
            kept.push(CartLine {
                product_id: line.product_id,
                shade_id: line.shade_id,
                quantity,
                price,
            });
        }

        cart.replace_lines(kept);
        self.store.save_cart(&cart).await?;
        if !warnings.is_empty() {
            tracing::info!(user_id = %user_id, changes = warnings.len(), "cart refreshed");
        }
        Ok((cart, warnings))
    }
}

/// Re-checks every line against live product/shade state. Returns the
/// validated line set (with refreshed prices) plus every issue found; the
/// caller decides whether blocking issues abort. Shared by the pre-checkout
/// validation endpoint and order creation.
pub(crate) async fn validate_lines(
    store: &dyn Store,
    cart: &Cart,
) -> Result<(Vec<CartLine>, Vec<LineIssue>)> {
    let mut validated = Vec::with_capacity(cart.items.len());
    let mut issues = Vec::new();

    for line in &cart.items {
        let issue = |code, message: String| LineIssue {
            code,
            product_id: line.product_id,
            shade_id: line.shade_id,
            message,
        };
        let Some(product) = store.find_active_product(line.product_id).await? else {
            issues.push(issue(
                IssueCode::ProductInactive,
                "product is no longer available".into(),
            ));
            continue;
        };
        let Some(shade) = store.find_active_shade(line.shade_id, line.product_id).await? else {
            issues.push(issue(
                IssueCode::ShadeInactive,
                format!("shade of {} is no longer available", product.name),
            ));
            continue;
        };
        if shade.stock < line.quantity {
            issues.push(issue(
                IssueCode::InsufficientStock,
                format!("insufficient stock for {} - {}", product.name, shade.shade_name),
            ));
            continue;
        }
        let price = resolve_price(&product, &shade);
        if price != line.price {
            issues.push(issue(IssueCode::PriceUpdated, "price has changed".into()));
        }
        validated.push(CartLine {
            product_id: line.product_id,
            shade_id: line.shade_id,
            quantity: line.quantity,
            price,
        });
    }

    Ok((validated, issues))
}
