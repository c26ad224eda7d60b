//! Cart service error types.

use thiserror::Error;

use storehouse_core::{CartItemId, ProductId};

use crate::db::RepositoryError;

/// Errors that can occur during cart operations.
#[derive(Debug, Error)]
pub enum CartServiceError {
    #[error("Failed to fetch cart: {0}")]
    Fetch(#[source] RepositoryError),

    #[error("Failed to update cart: {0}")]
    Update(#[source] RepositoryError),

    #[error("product not found: {0}")]
    ProductNotFound(ProductId),

    /// The product exists but is not for sale.
    #[error("product {0} is not available")]
    ProductUnavailable(ProductId),

    #[error("only {available} of product {product_id} in stock, {requested} requested")]
    InsufficientStock {
        product_id: ProductId,
        requested: i32,
        available: i32,
    },

    #[error("cart item not found: {0}")]
    ItemNotFound(CartItemId),

    #[error("{0}")]
    Validation(String),
}
