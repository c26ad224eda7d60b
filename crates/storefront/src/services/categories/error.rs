//! Category service error types.

use thiserror::Error;

use storehouse_core::CategoryId;

use crate::db::RepositoryError;

/// Errors that can occur during category operations.
#[derive(Debug, Error)]
pub enum CategoryServiceError {
    #[error("Failed to fetch categories: {0}")]
    Fetch(#[source] RepositoryError),

    #[error("Failed to create category: {0}")]
    Create(#[source] RepositoryError),

    #[error("Failed to update category: {0}")]
    Update(#[source] RepositoryError),

    #[error("Failed to delete category: {0}")]
    Delete(#[source] RepositoryError),

    /// No category has this id or slug.
    #[error("category not found: {0}")]
    NotFound(String),

    /// Input failed validation.
    #[error("{0}")]
    Validation(String),

    /// Slug already taken.
    #[error("a category with this slug already exists")]
    DuplicateSlug,

    /// The new parent is the category itself or one of its descendants.
    #[error("category {id} cannot be moved under {parent}: that would create a cycle")]
    Cycle { id: CategoryId, parent: CategoryId },

    /// Categories with children cannot be deleted.
    #[error("category {id} has {children} child categories")]
    HasChildren { id: CategoryId, children: i64 },
}

impl CategoryServiceError {
    pub(crate) fn not_found(id: CategoryId) -> Self {
        Self::NotFound(id.to_string())
    }

    /// Translate constraint violations from a write into client errors.
    pub(crate) fn from_write(
        error: RepositoryError,
        wrap: fn(RepositoryError) -> Self,
    ) -> Self {
        match error {
            RepositoryError::Conflict(_) => Self::DuplicateSlug,
            RepositoryError::InvalidReference(_) => {
                Self::Validation("parent category does not exist".to_string())
            }
            other => wrap(other),
        }
    }
}
