//! Cart rows, API models and owner identity.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use storehouse_core::{CartId, CartItemId, ProductId, VariantId};

/// Who a cart belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum CartOwner {
    /// A signed-in user.
    User(Uuid),
    /// A visitor identified only by the id stored in their session.
    Anonymous(String),
}

impl CartOwner {
    #[must_use]
    pub const fn user_id(&self) -> Option<Uuid> {
        match self {
            Self::User(id) => Some(*id),
            Self::Anonymous(_) => None,
        }
    }

    #[must_use]
    pub fn anonymous_id(&self) -> Option<&str> {
        match self {
            Self::User(_) => None,
            Self::Anonymous(id) => Some(id),
        }
    }
}

impl std::fmt::Display for CartOwner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User(id) => write!(f, "user:{id}"),
            Self::Anonymous(id) => write!(f, "anonymous:{id}"),
        }
    }
}

/// A `carts` row.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct CartRow {
    pub id: CartId,
    pub user_id: Option<Uuid>,
    pub anonymous_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A `cart_items` row joined with the product it refers to.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct CartItemRow {
    pub id: CartItemId,
    pub cart_id: CartId,
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub product_name: String,
    pub product_slug: String,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A cart line as served by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub id: CartItemId,
    pub cart_id: CartId,
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub name: String,
    pub slug: String,
    pub image_url: Option<String>,
    pub quantity: i32,
    /// Price captured when the line was first added.
    pub unit_price: Decimal,
    pub line_total: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<CartItemRow> for CartItem {
    fn from(row: CartItemRow) -> Self {
        Self {
            id: row.id,
            cart_id: row.cart_id,
            product_id: row.product_id,
            variant_id: row.variant_id,
            name: row.product_name,
            slug: row.product_slug,
            image_url: row.image_url,
            quantity: row.quantity,
            unit_price: row.unit_price,
            line_total: row.unit_price * Decimal::from(row.quantity),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// A cart with its lines and totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    /// `None` until the first item is added.
    pub id: Option<CartId>,
    pub items: Vec<CartItem>,
    pub subtotal: Decimal,
    pub item_count: i64,
}

impl Cart {
    /// A cart that has not been persisted yet.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            id: None,
            items: Vec::new(),
            subtotal: Decimal::ZERO,
            item_count: 0,
        }
    }

    /// Assemble a cart and compute its totals.
    #[must_use]
    pub fn new(id: CartId, items: Vec<CartItem>) -> Self {
        let subtotal = items.iter().map(|item| item.line_total).sum();
        let item_count = items.iter().map(|item| i64::from(item.quantity)).sum();

        Self {
            id: Some(id),
            items,
            subtotal,
            item_count,
        }
    }
}

/// A line to insert into a cart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCartItem {
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub quantity: i32,
    pub unit_price: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: i32, quantity: i32, cents: i64) -> CartItemRow {
        CartItemRow {
            id: CartItemId::new(id),
            cart_id: CartId::new(1),
            product_id: ProductId::new(id),
            variant_id: None,
            quantity,
            unit_price: Decimal::new(cents, 2),
            product_name: "Mug".to_string(),
            product_slug: "mug".to_string(),
            image_url: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_totals() {
        let cart = Cart::new(
            CartId::new(1),
            vec![CartItem::from(row(1, 2, 1250)), CartItem::from(row(2, 1, 499))],
        );

        assert_eq!(cart.subtotal, Decimal::new(2999, 2));
        assert_eq!(cart.item_count, 3);
        assert_eq!(cart.items[0].line_total, Decimal::new(2500, 2));
    }

    #[test]
    fn test_empty_cart() {
        let cart = Cart::empty();
        assert_eq!(cart.subtotal, Decimal::ZERO);
        assert_eq!(cart.item_count, 0);
        assert!(cart.id.is_none());
    }

    #[test]
    fn test_owner_accessors() {
        let user = CartOwner::User(Uuid::nil());
        assert_eq!(user.user_id(), Some(Uuid::nil()));
        assert_eq!(user.anonymous_id(), None);

        let anon = CartOwner::Anonymous("abc".to_string());
        assert_eq!(anon.anonymous_id(), Some("abc"));
        assert_eq!(anon.to_string(), "anonymous:abc");
    }
}
