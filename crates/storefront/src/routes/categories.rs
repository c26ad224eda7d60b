//! Category route handlers.

use axum::{Json, extract::State};
use serde::Deserialize;
use tracing::instrument;

use storehouse_core::CategoryId;
use storehouse_core::catalog::CategoryNode;

use super::extract::{ApiPath, ApiQuery};
use crate::error::Result;
use crate::models::{Category, CategoryFilter};
use crate::state::AppState;

/// Query parameters for the category tree.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TreeParams {
    pub active_only: bool,
}

/// A `?limit=` query.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LimitParams {
    pub limit: Option<u32>,
}

/// GET /api/categories
#[instrument(skip(state))]
pub async fn index(
    State(state): State<AppState>,
    ApiQuery(filter): ApiQuery<CategoryFilter>,
) -> Result<Json<Vec<Category>>> {
    Ok(Json(state.categories().list_categories(filter).await?))
}

/// GET /api/categories/tree
#[instrument(skip(state))]
pub async fn tree(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<TreeParams>,
) -> Result<Json<Vec<CategoryNode<Category>>>> {
    let filter = CategoryFilter {
        active_only: params.active_only,
        ..CategoryFilter::default()
    };
    Ok(Json(state.categories().category_tree(filter).await?))
}

/// GET /api/categories/highlighted
#[instrument(skip(state))]
pub async fn highlighted(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<LimitParams>,
) -> Result<Json<Vec<Category>>> {
    Ok(Json(
        state
            .categories()
            .highlighted_categories(params.limit)
            .await?,
    ))
}

/// GET /api/categories/{id}
#[instrument(skip(state), fields(id = %id))]
pub async fn show(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<CategoryId>,
) -> Result<Json<Category>> {
    Ok(Json(state.categories().get_category(id).await?))
}

/// GET /api/categories/slug/{slug}
#[instrument(skip(state))]
pub async fn show_by_slug(
    State(state): State<AppState>,
    ApiPath(slug): ApiPath<String>,
) -> Result<Json<Category>> {
    Ok(Json(state.categories().get_category_by_slug(&slug).await?))
}
