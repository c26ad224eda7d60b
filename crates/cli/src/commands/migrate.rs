//! Database migration commands.
//!
//! # Usage
//!
//! ```bash
//! sh-cli migrate
//! ```
//!
//! # Environment Variables
//!
//! - `STOREFRONT_DATABASE_URL` - `PostgreSQL` connection string (falls back
//!   to `DATABASE_URL`)
//!
//! Migration files live in `crates/storefront/migrations/` and are embedded
//! at compile time.

use secrecy::ExposeSecret;
use sqlx::PgPool;
use thiserror::Error;

use super::database_url;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("{0}")]
    MissingEnvVar(&'static str),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Run storefront database migrations.
///
/// # Errors
///
/// Returns an error if the database URL is missing, the connection fails or
/// a migration fails to apply.
pub async fn storefront() -> Result<(), MigrationError> {
    let database_url = database_url().map_err(MigrationError::MissingEnvVar)?;

    tracing::info!("Connecting to storefront database...");
    let pool = PgPool::connect(database_url.expose_secret()).await?;

    tracing::info!("Running storefront migrations...");
    sqlx::migrate!("../storefront/migrations").run(&pool).await?;

    tracing::info!("Storefront migrations complete!");
    Ok(())
}
