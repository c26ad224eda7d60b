//! Combined catalog endpoint: one product page plus the category tree.

use axum::{Json, extract::State};
use serde::Serialize;
use tracing::instrument;

use storehouse_core::catalog::CategoryNode;

use super::extract::ApiQuery;
use crate::error::{AppError, Result};
use crate::models::{Category, CategoryFilter, ProductListParams, ProductPage};
use crate::services::ProductService;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogResponse {
    pub products: ProductPage,
    /// Active, visible categories.
    pub categories: Vec<CategoryNode<Category>>,
}

/// GET /api/catalog
///
/// Accepts the same query parameters as `/api/products`. The product page
/// and the category tree are fetched concurrently.
#[instrument(skip(state, params))]
pub async fn index(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<ProductListParams>,
) -> Result<Json<CatalogResponse>> {
    let query = ProductService::parse_query(params)?;
    let filter = CategoryFilter {
        active_only: true,
        ..CategoryFilter::default()
    };

    let (products, categories) = tokio::try_join!(
        async {
            state
                .products()
                .list_products(query)
                .await
                .map_err(AppError::from)
        },
        async {
            state
                .categories()
                .category_tree(filter)
                .await
                .map_err(AppError::from)
        },
    )?;

    Ok(Json(CatalogResponse {
        products,
        categories,
    }))
}
