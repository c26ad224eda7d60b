//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::StorefrontConfig;
use crate::db::{
    CartRepository, CategoryRepository, PgCartRepository, PgCategoryRepository,
    PgProductRepository, ProductRepository,
};
use crate::payments::PaymentService;
use crate::services::{CartService, CategoryService, ProductService};

/// The data-access seams the services are built on.
#[derive(Clone)]
pub struct Repositories {
    pub categories: Arc<dyn CategoryRepository>,
    pub products: Arc<dyn ProductRepository>,
    pub carts: Arc<dyn CartRepository>,
}

impl Repositories {
    /// `PostgreSQL`-backed repositories sharing one pool.
    #[must_use]
    pub fn postgres(pool: &PgPool) -> Self {
        Self {
            categories: Arc::new(PgCategoryRepository::new(pool.clone())),
            products: Arc::new(PgProductRepository::new(pool.clone())),
            carts: Arc::new(PgCartRepository::new(pool.clone())),
        }
    }
}

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc`. Services are built once at
/// startup and handed to handlers from here.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    pool: PgPool,
    categories: CategoryService,
    products: ProductService,
    carts: CartService,
    payments: PaymentService,
}

impl AppState {
    /// Create application state backed by `PostgreSQL`.
    #[must_use]
    pub fn new(config: StorefrontConfig, pool: PgPool, payments: PaymentService) -> Self {
        let repositories = Repositories::postgres(&pool);
        Self::with_repositories(config, pool, repositories, payments)
    }

    /// Create application state over the given repositories.
    ///
    /// `pool` is only used for the readiness probe.
    #[must_use]
    pub fn with_repositories(
        config: StorefrontConfig,
        pool: PgPool,
        repositories: Repositories,
        payments: PaymentService,
    ) -> Self {
        let categories = CategoryService::new(repositories.categories);
        let products = ProductService::new(Arc::clone(&repositories.products));
        let carts = CartService::new(repositories.carts, repositories.products);

        Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                categories,
                products,
                carts,
                payments,
            }),
        }
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get a reference to the database connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    #[must_use]
    pub fn categories(&self) -> &CategoryService {
        &self.inner.categories
    }

    #[must_use]
    pub fn products(&self) -> &ProductService {
        &self.inner.products
    }

    #[must_use]
    pub fn carts(&self) -> &CartService {
        &self.inner.carts
    }

    #[must_use]
    pub fn payments(&self) -> &PaymentService {
        &self.inner.payments
    }
}
