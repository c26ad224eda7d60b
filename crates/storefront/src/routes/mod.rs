//! HTTP route handlers for the storefront JSON API.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                          - Liveness
//! GET  /health/ready                    - Database readiness
//!
//! # Catalog
//! GET  /api/categories                  - Flat category list
//! GET  /api/categories/tree             - Nested category tree
//! GET  /api/categories/highlighted      - Homepage categories
//! GET  /api/categories/{id}
//! GET  /api/categories/slug/{slug}
//! GET  /api/products                    - Filtered, paginated listing
//! GET  /api/products/featured
//! GET  /api/products/{id}
//! GET  /api/products/slug/{slug}
//! GET  /api/catalog                     - Product page + category tree
//!
//! # Cart (session-owned)
//! GET  /api/cart
//! POST /api/cart/add | update | remove | clear
//!
//! # Payments
//! GET  /api/payments/config
//! POST /api/payments/create-intent | process | verify | cancel
//! GET  /api/payments/receipt/{id}
//! POST /api/webhooks/square | stripe
//!
//! # Admin (bearer token)
//! /api/admin/categories/...
//! /api/admin/products/...
//! /api/admin/payments/...
//! ```

pub mod admin;
pub mod cart;
pub mod catalog;
pub mod categories;
pub mod extract;
pub mod health;
pub mod payments;
pub mod products;
pub mod webhooks;

use axum::{
    Router,
    routing::{get, post, put},
};

use crate::middleware::{api_rate_limiter, payment_rate_limiter};
use crate::state::AppState;

/// Whether route groups get per-IP rate limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimits {
    Enabled,
    Disabled,
}

/// Create the category routes router.
pub fn category_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(categories::index))
        .route("/tree", get(categories::tree))
        .route("/highlighted", get(categories::highlighted))
        .route("/{id}", get(categories::show))
        .route("/slug/{slug}", get(categories::show_by_slug))
}

/// Create the product routes router.
pub fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(products::index))
        .route("/featured", get(products::featured))
        .route("/{id}", get(products::show))
        .route("/slug/{slug}", get(products::show_by_slug))
}

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show))
        .route("/add", post(cart::add))
        .route("/update", post(cart::update))
        .route("/remove", post(cart::remove))
        .route("/clear", post(cart::clear))
}

/// Create the payment routes router.
pub fn payment_routes() -> Router<AppState> {
    Router::new()
        .route("/config", get(payments::client_config))
        .route("/create-intent", post(payments::create_intent))
        .route("/process", post(payments::process))
        .route("/verify", post(payments::verify))
        .route("/cancel", post(payments::cancel))
        .route("/receipt/{id}", get(payments::receipt))
}

/// Create the webhook routes router.
pub fn webhook_routes() -> Router<AppState> {
    Router::new()
        .route("/square", post(webhooks::square))
        .route("/stripe", post(webhooks::stripe))
}

/// Create the admin routes router.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/categories", post(admin::create_category))
        .route(
            "/categories/{id}",
            put(admin::update_category).delete(admin::delete_category),
        )
        .route("/categories/highlight", post(admin::highlight_categories))
        .route("/categories/{id}/priority", post(admin::set_priority))
        .route("/categories/{id}/visibility", post(admin::set_visibility))
        .route("/categories/reorder", post(admin::reorder_categories))
        .route("/products", post(admin::create_product))
        .route(
            "/products/{id}",
            put(admin::update_product).delete(admin::delete_product),
        )
        .route("/products/{id}/categories", put(admin::set_product_categories))
        .route("/payments/active-provider", post(admin::set_active_provider))
        .route("/payments/refund", post(admin::refund))
}

/// Create all routes for the storefront.
pub fn routes(rate_limits: RateLimits) -> Router<AppState> {
    let mut api = Router::new()
        .nest("/categories", category_routes())
        .nest("/products", product_routes())
        .route("/catalog", get(catalog::index))
        .nest("/cart", cart_routes())
        .nest("/admin", admin_routes());
    let mut payments = payment_routes();

    if rate_limits == RateLimits::Enabled {
        api = api.layer(api_rate_limiter());
        payments = payments.layer(payment_rate_limiter());
    }

    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .nest(
            "/api",
            api.nest("/payments", payments)
                .nest("/webhooks", webhook_routes()),
        )
}
