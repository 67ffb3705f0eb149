//! Catalog read models.
//!
//! Products and shades are owned by the catalog side of the shop; the
//! checkout engine only reads them, and the sole field it ever mutates is
//! `Shade::stock`, exclusively through the store's conditional
//! reserve/restore primitives.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub brand: String,
    /// Price in minor units (paise).
    pub base_price: i64,
    pub discounted_price: Option<i64>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A purchasable variant of a product. Carries its own stock count and an
/// optional price override.
#[derive(Clone, Debug, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Shade {
    pub id: Uuid,
    pub product_id: Uuid,
    pub shade_name: String,
    pub stock: i32,
    pub price: Option<i64>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Price resolution, applied identically by cart add, validate, refresh and
/// checkout: shade override, else product discounted price, else base price.
pub fn resolve_price(product: &Product, shade: &Shade) -> i64 {
    shade
        .price
        .or(product.discounted_price)
        .unwrap_or(product.base_price)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(base: i64, discounted: Option<i64>) -> Product {
        Product {
            id: Uuid::now_v7(),
            name: "Velvet Matte".into(),
            brand: "Glow".into(),
            base_price: base,
            discounted_price: discounted,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn shade(product_id: Uuid, price: Option<i64>) -> Shade {
        Shade {
            id: Uuid::now_v7(),
            product_id,
            shade_name: "Rosewood".into(),
            stock: 10,
            price,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn shade_price_wins() {
        let p = product(1000, Some(800));
        let s = shade(p.id, Some(750));
        assert_eq!(resolve_price(&p, &s), 750);
    }

    #[test]
    fn discounted_beats_base() {
        let p = product(1000, Some(800));
        let s = shade(p.id, None);
        assert_eq!(resolve_price(&p, &s), 800);
    }

    #[test]
    fn base_is_fallback() {
        let p = product(1000, None);
        let s = shade(p.id, None);
        assert_eq!(resolve_price(&p, &s), 1000);
    }
}
