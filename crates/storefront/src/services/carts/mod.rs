//! Cart service.
//!
//! Carts are stored server-side and keyed by [`CartOwner`]. A cart row is
//! only created when the first item is added; reading a cart that does not
//! exist yet returns an empty cart.
//!
//! Removing a line is a single idempotent delete. Transient database
//! failures are retried with the configured [`RetryPolicy`]; nothing else
//! is retried.

mod error;

pub use error::CartServiceError;

use std::sync::Arc;

use tracing::instrument;
use uuid::Uuid;

use storehouse_core::retry::RetryPolicy;
use storehouse_core::{CartId, CartItemId, ProductId, VariantId};

use super::retry::retry_transient;
use crate::db::{CartRepository, ProductRepository};
use crate::models::{Cart, CartOwner, NewCartItem};

/// Largest quantity of a single line.
pub const MAX_LINE_QUANTITY: i32 = 99;

/// Cart operations.
#[derive(Clone)]
pub struct CartService {
    carts: Arc<dyn CartRepository>,
    products: Arc<dyn ProductRepository>,
    retry: RetryPolicy,
}

impl std::fmt::Debug for CartService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CartService")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl CartService {
    /// Create a new cart service with the default retry policy.
    #[must_use]
    pub fn new(carts: Arc<dyn CartRepository>, products: Arc<dyn ProductRepository>) -> Self {
        Self {
            carts,
            products,
            retry: RetryPolicy::default(),
        }
    }

    /// Replace the retry policy used for item removal.
    #[must_use]
    pub const fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// The owner's cart, empty if they have none yet.
    ///
    /// # Errors
    ///
    /// Returns `CartServiceError::Fetch` if a query fails.
    #[instrument(skip(self), fields(owner = %owner))]
    pub async fn get_cart(&self, owner: &CartOwner) -> Result<Cart, CartServiceError> {
        let Some(cart) = self
            .carts
            .find_cart(owner.clone())
            .await
            .map_err(CartServiceError::Fetch)?
        else {
            return Ok(Cart::empty());
        };

        self.load(cart.id).await
    }

    async fn load(&self, cart_id: CartId) -> Result<Cart, CartServiceError> {
        let items = self
            .carts
            .items(cart_id)
            .await
            .map_err(CartServiceError::Fetch)?;
        Ok(Cart::new(cart_id, items))
    }

    /// Add `quantity` of a product, merging into an existing line for the
    /// same product and variant. New lines capture the current price.
    ///
    /// # Errors
    ///
    /// Returns `CartServiceError::ProductUnavailable` for inactive products
    /// and `CartServiceError::InsufficientStock` when the resulting line
    /// quantity exceeds stock.
    #[instrument(skip(self), fields(owner = %owner, product_id = %product_id))]
    pub async fn add_item(
        &self,
        owner: &CartOwner,
        product_id: ProductId,
        variant_id: Option<VariantId>,
        quantity: i32,
    ) -> Result<Cart, CartServiceError> {
        validate_quantity(quantity, 1)?;

        let product = self
            .products
            .get(product_id)
            .await
            .map_err(CartServiceError::Fetch)?
            .ok_or(CartServiceError::ProductNotFound(product_id))?;
        if !product.is_active {
            return Err(CartServiceError::ProductUnavailable(product_id));
        }

        let cart = self
            .carts
            .get_or_create_cart(owner.clone())
            .await
            .map_err(CartServiceError::Update)?;

        let existing = self
            .carts
            .find_item(cart.id, product_id, variant_id)
            .await
            .map_err(CartServiceError::Fetch)?;

        let current = existing.as_ref().map_or(0, |item| item.quantity);
        let requested = current.saturating_add(quantity);
        validate_quantity(requested, 1)?;
        check_stock(product_id, requested, product.stock)?;

        match existing {
            Some(item) => {
                self.carts
                    .set_quantity(cart.id, item.id, requested)
                    .await
                    .map_err(CartServiceError::Update)?;
            }
            None => {
                let new_item = NewCartItem {
                    product_id,
                    variant_id,
                    quantity,
                    unit_price: product.price,
                };
                self.carts
                    .insert_item(cart.id, new_item)
                    .await
                    .map_err(CartServiceError::Update)?;
            }
        }

        tracing::info!(cart_id = %cart.id, quantity = requested, "Cart line added");
        self.load(cart.id).await
    }

    /// Set a line's quantity. Zero removes the line.
    ///
    /// # Errors
    ///
    /// Returns `CartServiceError::ItemNotFound` if the line is not in the
    /// owner's cart, `CartServiceError::InsufficientStock` if `quantity`
    /// exceeds stock.
    #[instrument(skip(self), fields(owner = %owner, item_id = %item_id))]
    pub async fn update_item(
        &self,
        owner: &CartOwner,
        item_id: CartItemId,
        quantity: i32,
    ) -> Result<Cart, CartServiceError> {
        validate_quantity(quantity, 0)?;
        if quantity == 0 {
            return self.remove_item(owner, item_id).await;
        }

        let cart = self
            .carts
            .find_cart(owner.clone())
            .await
            .map_err(CartServiceError::Fetch)?
            .ok_or(CartServiceError::ItemNotFound(item_id))?;

        let item = self
            .carts
            .get_item(cart.id, item_id)
            .await
            .map_err(CartServiceError::Fetch)?
            .ok_or(CartServiceError::ItemNotFound(item_id))?;

        let product = self
            .products
            .get(item.product_id)
            .await
            .map_err(CartServiceError::Fetch)?
            .ok_or(CartServiceError::ProductNotFound(item.product_id))?;
        check_stock(item.product_id, quantity, product.stock)?;

        self.carts
            .set_quantity(cart.id, item_id, quantity)
            .await
            .map_err(CartServiceError::Update)?
            .ok_or(CartServiceError::ItemNotFound(item_id))?;

        self.load(cart.id).await
    }

    /// Remove a line. Removing a line that is already gone succeeds.
    ///
    /// # Errors
    ///
    /// Returns `CartServiceError::Update` if the delete keeps failing after
    /// retries, or fails permanently.
    #[instrument(skip(self), fields(owner = %owner, item_id = %item_id))]
    pub async fn remove_item(
        &self,
        owner: &CartOwner,
        item_id: CartItemId,
    ) -> Result<Cart, CartServiceError> {
        let Some(cart) = self
            .carts
            .find_cart(owner.clone())
            .await
            .map_err(CartServiceError::Fetch)?
        else {
            return Ok(Cart::empty());
        };

        let carts = &self.carts;
        let removed = retry_transient(self.retry, "remove_cart_item", || {
            carts.delete_item(cart.id, item_id)
        })
        .await
        .map_err(CartServiceError::Update)?;

        if removed == 0 {
            tracing::debug!(cart_id = %cart.id, "Cart line already removed");
        } else {
            tracing::info!(cart_id = %cart.id, "Cart line removed");
        }

        self.load(cart.id).await
    }

    /// Remove every line from the owner's cart.
    ///
    /// # Errors
    ///
    /// Returns `CartServiceError::Update` if the delete fails.
    #[instrument(skip(self), fields(owner = %owner))]
    pub async fn clear_cart(&self, owner: &CartOwner) -> Result<Cart, CartServiceError> {
        let Some(cart) = self
            .carts
            .find_cart(owner.clone())
            .await
            .map_err(CartServiceError::Fetch)?
        else {
            return Ok(Cart::empty());
        };

        let removed = self
            .carts
            .clear(cart.id)
            .await
            .map_err(CartServiceError::Update)?;

        tracing::info!(cart_id = %cart.id, removed, "Cart cleared");
        Ok(Cart::new(cart.id, Vec::new()))
    }

    /// Fold an anonymous cart into a user's cart after sign-in.
    ///
    /// Quantities of lines present in both carts are summed and capped at
    /// [`MAX_LINE_QUANTITY`], the user's price snapshot is kept, and the
    /// anonymous cart is deleted. Stock is not re-checked here.
    ///
    /// # Errors
    ///
    /// Returns `CartServiceError::Update` if the merge fails; nothing is
    /// changed in that case.
    #[instrument(skip(self))]
    pub async fn merge_carts(
        &self,
        anonymous_id: &str,
        user_id: Uuid,
    ) -> Result<Cart, CartServiceError> {
        let user = CartOwner::User(user_id);

        let Some(anonymous) = self
            .carts
            .find_cart(CartOwner::Anonymous(anonymous_id.to_string()))
            .await
            .map_err(CartServiceError::Fetch)?
        else {
            return self.get_cart(&user).await;
        };

        let target = self
            .carts
            .get_or_create_cart(user)
            .await
            .map_err(CartServiceError::Update)?;

        let moved = self
            .carts
            .merge(anonymous.id, target.id, MAX_LINE_QUANTITY)
            .await
            .map_err(CartServiceError::Update)?;

        tracing::info!(
            from = %anonymous.id,
            into = %target.id,
            moved,
            "Anonymous cart merged"
        );
        self.load(target.id).await
    }
}

fn validate_quantity(quantity: i32, min: i32) -> Result<(), CartServiceError> {
    if (min..=MAX_LINE_QUANTITY).contains(&quantity) {
        Ok(())
    } else {
        Err(CartServiceError::Validation(format!(
            "quantity must be between {min} and {MAX_LINE_QUANTITY}"
        )))
    }
}

const fn check_stock(
    product_id: ProductId,
    requested: i32,
    available: i32,
) -> Result<(), CartServiceError> {
    if requested > available {
        return Err(CartServiceError::InsufficientStock {
            product_id,
            requested,
            available,
        });
    }
    Ok(())
}
