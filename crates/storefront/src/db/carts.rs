//! Cart repository.

use async_trait::async_trait;
use mockall::automock;
use sqlx::PgPool;

use storehouse_core::{CartId, CartItemId, ProductId, VariantId};

use super::RepositoryError;
use crate::models::{CartItem, CartItemRow, CartOwner, CartRow, NewCartItem};

const ITEM_SELECT: &str = r"
    SELECT ci.id, ci.cart_id, ci.product_id, ci.variant_id, ci.quantity, ci.unit_price,
           p.name AS product_name, p.slug AS product_slug, p.image_url,
           ci.created_at, ci.updated_at
    FROM cart_items ci
    JOIN products p ON p.id = ci.product_id
";

const CART_COLUMNS: &str = "id, user_id, anonymous_id, created_at, updated_at";

/// Data access for `carts` and `cart_items`.
///
/// Item operations take the owning cart id so that an item id from one cart
/// can never touch another cart's lines.
#[automock]
#[async_trait]
pub trait CartRepository: Send + Sync {
    async fn find_cart(&self, owner: CartOwner) -> Result<Option<CartRow>, RepositoryError>;

    /// Return the owner's cart, creating it on first use.
    async fn get_or_create_cart(&self, owner: CartOwner) -> Result<CartRow, RepositoryError>;

    /// Lines of a cart, oldest first.
    async fn items(&self, cart_id: CartId) -> Result<Vec<CartItem>, RepositoryError>;

    async fn get_item(
        &self,
        cart_id: CartId,
        item_id: CartItemId,
    ) -> Result<Option<CartItem>, RepositoryError>;

    /// The line for `(product, variant)`, if the cart has one.
    async fn find_item(
        &self,
        cart_id: CartId,
        product_id: ProductId,
        variant_id: Option<VariantId>,
    ) -> Result<Option<CartItem>, RepositoryError>;

    async fn insert_item(
        &self,
        cart_id: CartId,
        item: NewCartItem,
    ) -> Result<CartItem, RepositoryError>;

    async fn set_quantity(
        &self,
        cart_id: CartId,
        item_id: CartItemId,
        quantity: i32,
    ) -> Result<Option<CartItem>, RepositoryError>;

    /// Returns the number of rows deleted (0 or 1).
    async fn delete_item(&self, cart_id: CartId, item_id: CartItemId)
    -> Result<u64, RepositoryError>;

    async fn clear(&self, cart_id: CartId) -> Result<u64, RepositoryError>;

    /// Move every line of `from` into `into`, summing quantities of matching
    /// lines up to `max_quantity`, then delete `from`. Returns the number of
    /// lines moved.
    async fn merge(
        &self,
        from: CartId,
        into: CartId,
        max_quantity: i32,
    ) -> Result<u64, RepositoryError>;
}

/// `PostgreSQL` implementation of [`CartRepository`].
#[derive(Debug, Clone)]
pub struct PgCartRepository {
    pool: PgPool,
}

impl PgCartRepository {
    /// Create a new cart repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_item(
        &self,
        cart_id: CartId,
        item_id: CartItemId,
    ) -> Result<Option<CartItem>, RepositoryError> {
        let row = sqlx::query_as::<_, CartItemRow>(&format!(
            "{ITEM_SELECT} WHERE ci.cart_id = $1 AND ci.id = $2"
        ))
        .bind(cart_id)
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(CartItem::from))
    }
}

#[async_trait]
impl CartRepository for PgCartRepository {
    async fn find_cart(&self, owner: CartOwner) -> Result<Option<CartRow>, RepositoryError> {
        let row = match &owner {
            CartOwner::User(user_id) => {
                sqlx::query_as::<_, CartRow>(&format!(
                    "SELECT {CART_COLUMNS} FROM carts WHERE user_id = $1"
                ))
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?
            }
            CartOwner::Anonymous(anonymous_id) => {
                sqlx::query_as::<_, CartRow>(&format!(
                    "SELECT {CART_COLUMNS} FROM carts WHERE anonymous_id = $1"
                ))
                .bind(anonymous_id)
                .fetch_optional(&self.pool)
                .await?
            }
        };

        Ok(row)
    }

    async fn get_or_create_cart(&self, owner: CartOwner) -> Result<CartRow, RepositoryError> {
        // Partial unique indexes on user_id and anonymous_id make this a
        // no-op when the cart already exists.
        sqlx::query(
            r"
            INSERT INTO carts (user_id, anonymous_id)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            ",
        )
        .bind(owner.user_id())
        .bind(owner.anonymous_id())
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::from_sqlx)?;

        self.find_cart(owner).await?.ok_or(RepositoryError::NotFound)
    }

    async fn items(&self, cart_id: CartId) -> Result<Vec<CartItem>, RepositoryError> {
        let rows = sqlx::query_as::<_, CartItemRow>(&format!(
            "{ITEM_SELECT} WHERE ci.cart_id = $1 ORDER BY ci.created_at, ci.id"
        ))
        .bind(cart_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(CartItem::from).collect())
    }

    async fn get_item(
        &self,
        cart_id: CartId,
        item_id: CartItemId,
    ) -> Result<Option<CartItem>, RepositoryError> {
        self.fetch_item(cart_id, item_id).await
    }

    async fn find_item(
        &self,
        cart_id: CartId,
        product_id: ProductId,
        variant_id: Option<VariantId>,
    ) -> Result<Option<CartItem>, RepositoryError> {
        let row = sqlx::query_as::<_, CartItemRow>(&format!(
            r"{ITEM_SELECT}
            WHERE ci.cart_id = $1
              AND ci.product_id = $2
              AND ci.variant_id IS NOT DISTINCT FROM $3"
        ))
        .bind(cart_id)
        .bind(product_id)
        .bind(variant_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(CartItem::from))
    }

    async fn insert_item(
        &self,
        cart_id: CartId,
        item: NewCartItem,
    ) -> Result<CartItem, RepositoryError> {
        let item_id: CartItemId = sqlx::query_scalar(
            r"
            INSERT INTO cart_items (cart_id, product_id, variant_id, quantity, unit_price)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            ",
        )
        .bind(cart_id)
        .bind(item.product_id)
        .bind(item.variant_id)
        .bind(item.quantity)
        .bind(item.unit_price)
        .fetch_one(&self.pool)
        .await
        .map_err(RepositoryError::from_sqlx)?;

        sqlx::query("UPDATE carts SET updated_at = now() WHERE id = $1")
            .bind(cart_id)
            .execute(&self.pool)
            .await?;

        self.fetch_item(cart_id, item_id)
            .await?
            .ok_or(RepositoryError::NotFound)
    }

    async fn set_quantity(
        &self,
        cart_id: CartId,
        item_id: CartItemId,
        quantity: i32,
    ) -> Result<Option<CartItem>, RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE cart_items SET quantity = $3, updated_at = now()
            WHERE cart_id = $1 AND id = $2
            ",
        )
        .bind(cart_id)
        .bind(item_id)
        .bind(quantity)
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::from_sqlx)?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.fetch_item(cart_id, item_id).await
    }

    async fn delete_item(
        &self,
        cart_id: CartId,
        item_id: CartItemId,
    ) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM cart_items WHERE cart_id = $1 AND id = $2")
            .bind(cart_id)
            .bind(item_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn clear(&self, cart_id: CartId) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
            .bind(cart_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn merge(
        &self,
        from: CartId,
        into: CartId,
        max_quantity: i32,
    ) -> Result<u64, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let moved = sqlx::query(
            r"
            INSERT INTO cart_items (cart_id, product_id, variant_id, quantity, unit_price)
            SELECT $2, product_id, variant_id, LEAST(quantity, $3), unit_price
            FROM cart_items
            WHERE cart_id = $1
            ON CONFLICT (cart_id, product_id, variant_id)
            DO UPDATE SET quantity = LEAST(cart_items.quantity + EXCLUDED.quantity, $3),
                          updated_at = now()
            ",
        )
        .bind(from)
        .bind(into)
        .bind(max_quantity)
        .execute(&mut *tx)
        .await
        .map_err(RepositoryError::from_sqlx)?
        .rows_affected();

        sqlx::query("DELETE FROM carts WHERE id = $1")
            .bind(from)
            .execute(&mut *tx)
            .await?;

        sqlx::query("UPDATE carts SET updated_at = now() WHERE id = $1")
            .bind(into)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(moved)
    }
}
