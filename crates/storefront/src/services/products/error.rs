//! Product service error types.

use thiserror::Error;

use storehouse_core::catalog::CursorError;

use crate::db::RepositoryError;

/// Errors that can occur during product operations.
#[derive(Debug, Error)]
pub enum ProductServiceError {
    #[error("Failed to fetch products: {0}")]
    Fetch(#[source] RepositoryError),

    #[error("Failed to create product: {0}")]
    Create(#[source] RepositoryError),

    #[error("Failed to update product: {0}")]
    Update(#[source] RepositoryError),

    #[error("Failed to delete product: {0}")]
    Delete(#[source] RepositoryError),

    #[error("product not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Validation(String),

    /// The pagination cursor could not be decoded.
    #[error("invalid cursor: {0}")]
    InvalidCursor(#[from] CursorError),

    /// Slug or SKU already taken.
    #[error("a product with this slug or SKU already exists")]
    Duplicate,
}

impl ProductServiceError {
    pub(crate) fn from_write(
        error: RepositoryError,
        wrap: fn(RepositoryError) -> Self,
    ) -> Self {
        match error {
            RepositoryError::Conflict(_) => Self::Duplicate,
            RepositoryError::InvalidReference(_) => {
                Self::Validation("one or more categories do not exist".to_string())
            }
            other => wrap(other),
        }
    }
}
