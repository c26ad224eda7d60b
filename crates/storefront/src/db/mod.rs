//! Database operations for the storefront `PostgreSQL` database.
//!
//! # Tables
//!
//! - `categories` - Category tree, visibility and homepage highlighting
//! - `products` - Catalog entries
//! - `product_categories` - Product to category links
//! - `carts` / `cart_items` - Server-side carts keyed by user or anonymous id
//! - `tower_sessions.session` - Tower-sessions storage
//!
//! Every repository is a trait with a `Pg*` implementation so services can
//! be exercised against mocks or in-memory stores.
//!
//! # Migrations
//!
//! Migrations are stored in `crates/storefront/migrations/` and run via:
//! ```bash
//! cargo run -p storehouse-cli -- migrate
//! ```

pub mod carts;
pub mod categories;
pub mod products;

use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::error::{DatabaseError, ErrorKind};
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

pub use carts::{CartRepository, MockCartRepository, PgCartRepository};
pub use categories::{CategoryRepository, MockCategoryRepository, PgCategoryRepository};
pub use products::{MockProductRepository, PgProductRepository, ProductRepository};

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., duplicate slug).
    #[error("constraint violation: {0}")]
    Conflict(String),

    /// A referenced row does not exist.
    #[error("invalid reference: {0}")]
    InvalidReference(String),

    /// The requested parent is the row itself or one of its descendants.
    #[error("parent assignment would create a cycle")]
    Cycle,
}

impl RepositoryError {
    /// Map constraint violations to their own variants, everything else to
    /// `Database`.
    pub(crate) fn from_sqlx(error: sqlx::Error) -> Self {
        let kind = error.as_database_error().map(DatabaseError::kind);
        let detail = error
            .as_database_error()
            .and_then(DatabaseError::constraint)
            .unwrap_or("unknown constraint")
            .to_string();

        match kind {
            Some(ErrorKind::UniqueViolation) => Self::Conflict(detail),
            Some(ErrorKind::ForeignKeyViolation) => Self::InvalidReference(detail),
            Some(ErrorKind::CheckViolation) => Self::DataCorruption(detail),
            _ => Self::Database(error),
        }
    }

    /// Whether retrying the same operation could succeed.
    ///
    /// Connection drops, pool timeouts, serialization failures and deadlocks
    /// are transient. Constraint violations and missing rows are not.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Database(
                sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed,
            ) => true,
            // 40001 serialization_failure, 40P01 deadlock_detected
            Self::Database(sqlx::Error::Database(db)) => {
                matches!(db.code().as_deref(), Some("40001" | "40P01"))
            }
            _ => false,
        }
    }
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}
