//! Product route handlers.

use axum::{Json, extract::State};
use tracing::instrument;

use storehouse_core::ProductId;

use super::categories::LimitParams;
use super::extract::{ApiPath, ApiQuery};
use crate::error::{AppError, Result};
use crate::models::{Product, ProductListParams, ProductPage};
use crate::services::ProductService;
use crate::state::AppState;

/// GET /api/products
///
/// Cursor mode by default; `page` switches to numbered pages with totals.
#[instrument(skip(state, params))]
pub async fn index(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<ProductListParams>,
) -> Result<Json<ProductPage>> {
    let query = ProductService::parse_query(params)?;
    Ok(Json(state.products().list_products(query).await?))
}

/// GET /api/products/featured
#[instrument(skip(state))]
pub async fn featured(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<LimitParams>,
) -> Result<Json<Vec<Product>>> {
    Ok(Json(state.products().featured_products(params.limit).await?))
}

/// Inactive products are not served to shoppers.
fn visible(product: Product) -> Result<Json<Product>> {
    if product.is_active {
        Ok(Json(product))
    } else {
        Err(AppError::NotFound(format!("product {}", product.id)))
    }
}

/// GET /api/products/{id}
#[instrument(skip(state), fields(id = %id))]
pub async fn show(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<ProductId>,
) -> Result<Json<Product>> {
    visible(state.products().get_product(id).await?)
}

/// GET /api/products/slug/{slug}
#[instrument(skip(state))]
pub async fn show_by_slug(
    State(state): State<AppState>,
    ApiPath(slug): ApiPath<String>,
) -> Result<Json<Product>> {
    visible(state.products().get_product_by_slug(&slug).await?)
}
