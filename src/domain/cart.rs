//! Cart aggregate.
//!
//! One cart per user. Lines capture the price at add-time; `total_price` is
//! always recomputed from the lines and never trusted as stored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    pub user_id: Uuid,
    pub items: Vec<CartLine>,
    /// Minor units; invariant: equals Σ price × quantity over `items`.
    pub total_price: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub product_id: Uuid,
    pub shade_id: Uuid,
    pub quantity: i32,
    pub price: i64,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CartError {
    #[error("cart line not found")]
    LineNotFound,
}

impl Cart {
    pub fn new(user_id: Uuid) -> Self {
        let now = Utc::now();
        Self { user_id, items: vec![], total_price: 0, created_at: now, updated_at: now }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Quantity already in the cart for a given shade, 0 if absent. Used by
    /// the add-path stock check, which must count the existing line.
    pub fn quantity_of(&self, product_id: Uuid, shade_id: Uuid) -> i32 {
        self.line(product_id, shade_id).map_or(0, |l| l.quantity)
    }

    pub fn line(&self, product_id: Uuid, shade_id: Uuid) -> Option<&CartLine> {
        self.items
            .iter()
            .find(|l| l.product_id == product_id && l.shade_id == shade_id)
    }

    /// Merges into an existing line for the same product+shade or appends.
    /// Merged quantities saturate rather than wrap; callers bound them
    /// against stock before they get here.
    pub fn add_line(&mut self, line: CartLine) {
        match self
            .items
            .iter_mut()
            .find(|l| l.product_id == line.product_id && l.shade_id == line.shade_id)
        {
            Some(existing) => existing.quantity = existing.quantity.saturating_add(line.quantity),
            None => self.items.push(line),
        }
        self.recompute();
    }

    /// Sets the quantity of an existing line; 0 removes the line.
    pub fn set_quantity(
        &mut self,
        product_id: Uuid,
        shade_id: Uuid,
        quantity: i32,
    ) -> Result<(), CartError> {
        let line = self
            .items
            .iter_mut()
            .find(|l| l.product_id == product_id && l.shade_id == shade_id)
            .ok_or(CartError::LineNotFound)?;
        if quantity == 0 {
            self.items
                .retain(|l| !(l.product_id == product_id && l.shade_id == shade_id));
        } else {
            line.quantity = quantity;
        }
        self.recompute();
        Ok(())
    }

    pub fn remove_line(&mut self, product_id: Uuid, shade_id: Uuid) -> Result<(), CartError> {
        let before = self.items.len();
        self.items
            .retain(|l| !(l.product_id == product_id && l.shade_id == shade_id));
        if self.items.len() == before {
            return Err(CartError::LineNotFound);
        }
        self.recompute();
        Ok(())
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.recompute();
    }

    /// Swaps in a validated/refreshed line set wholesale.
    pub fn replace_lines(&mut self, lines: Vec<CartLine>) {
        self.items = lines;
        self.recompute();
    }

    fn recompute(&mut self) {
        self.total_price = self
            .items
            .iter()
            .map(|l| l.price * i64::from(l.quantity))
            .sum();
        self.updated_at = Utc::now();
    }
}

/// One per-line problem found while validating or refreshing a cart.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LineIssue {
    pub code: IssueCode,
    pub product_id: Uuid,
    pub shade_id: Uuid,
    pub message: String,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueCode {
    // Blocking: checkout must not proceed.
    ProductInactive,
    ShadeInactive,
    InsufficientStock,
    // Warnings: cart self-heals and continues.
    PriceUpdated,
    ProductRemoved,
    ShadeRemoved,
    QuantityAdjusted,
    OutOfStock,
}

impl IssueCode {
    pub fn is_blocking(self) -> bool {
        matches!(
            self,
            Self::ProductInactive | Self::ShadeInactive | Self::InsufficientStock
        )
    }
}
