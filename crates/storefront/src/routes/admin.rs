//! Admin route handlers.
//!
//! Every handler takes [`RequireAdmin`], so a request without the admin
//! bearer token never reaches a service.

use axum::{Json, extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::instrument;

use storehouse_core::{CategoryId, ProductId};

use super::extract::{ApiJson, ApiPath};
use crate::error::{Result, add_breadcrumb};
use crate::middleware::RequireAdmin;
use crate::models::{Category, CategoryUpdate, NewCategory, NewProduct, Product, ProductUpdate};
use crate::payments::{PaymentAmount, RefundResult};
use crate::state::AppState;

// =============================================================================
// Request / response bodies
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct HighlightRequest {
    pub ids: Vec<CategoryId>,
    pub highlighted: bool,
}

/// Number of rows a bulk operation touched.
#[derive(Debug, Serialize)]
pub struct UpdatedCount {
    pub updated: u64,
}

#[derive(Debug, Deserialize)]
pub struct PriorityRequest {
    pub priority: i32,
}

#[derive(Debug, Deserialize)]
pub struct VisibilityRequest {
    pub visible: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReorderEntry {
    pub id: CategoryId,
    pub sort_order: i32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductCategoriesRequest {
    pub category_ids: Vec<CategoryId>,
}

#[derive(Debug, Deserialize)]
pub struct ActiveProviderRequest {
    pub provider: String,
    #[serde(default)]
    pub settings: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct ActiveProviderResponse {
    pub provider: String,
    pub providers: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundRequest {
    pub payment_id: String,
    #[serde(default)]
    pub amount: Option<PaymentAmount>,
    #[serde(default)]
    pub provider: Option<String>,
}

// =============================================================================
// Categories
// =============================================================================

/// POST /api/admin/categories
#[instrument(skip(state, input))]
pub async fn create_category(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    ApiJson(input): ApiJson<NewCategory>,
) -> Result<(StatusCode, Json<Category>)> {
    let category = state.categories().create_category(input).await?;
    Ok((StatusCode::CREATED, Json(category)))
}

/// PUT /api/admin/categories/{id}
#[instrument(skip(state, update))]
pub async fn update_category(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<CategoryId>,
    ApiJson(update): ApiJson<CategoryUpdate>,
) -> Result<Json<Category>> {
    Ok(Json(state.categories().update_category(id, update).await?))
}

/// DELETE /api/admin/categories/{id}
#[instrument(skip(state))]
pub async fn delete_category(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<CategoryId>,
) -> Result<StatusCode> {
    state.categories().delete_category(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/admin/categories/highlight
#[instrument(skip(state, request), fields(count = request.ids.len()))]
pub async fn highlight_categories(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    ApiJson(request): ApiJson<HighlightRequest>,
) -> Result<Json<UpdatedCount>> {
    let updated = state
        .categories()
        .update_highlight_status(request.ids, request.highlighted)
        .await?;
    Ok(Json(UpdatedCount { updated }))
}

/// POST /api/admin/categories/{id}/priority
#[instrument(skip(state))]
pub async fn set_priority(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<CategoryId>,
    ApiJson(request): ApiJson<PriorityRequest>,
) -> Result<Json<Category>> {
    Ok(Json(
        state
            .categories()
            .update_highlight_priority(id, request.priority)
            .await?,
    ))
}

/// POST /api/admin/categories/{id}/visibility
#[instrument(skip(state))]
pub async fn set_visibility(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<CategoryId>,
    ApiJson(request): ApiJson<VisibilityRequest>,
) -> Result<Json<Category>> {
    Ok(Json(
        state
            .categories()
            .set_visibility(id, request.visible)
            .await?,
    ))
}

/// POST /api/admin/categories/reorder
#[instrument(skip(state, entries), fields(count = entries.len()))]
pub async fn reorder_categories(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    ApiJson(entries): ApiJson<Vec<ReorderEntry>>,
) -> Result<Json<UpdatedCount>> {
    let order = entries.into_iter().map(|e| (e.id, e.sort_order)).collect();
    let updated = state.categories().reorder_categories(order).await?;
    Ok(Json(UpdatedCount { updated }))
}

// =============================================================================
// Products
// =============================================================================

/// POST /api/admin/products
#[instrument(skip(state, input))]
pub async fn create_product(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    ApiJson(input): ApiJson<NewProduct>,
) -> Result<(StatusCode, Json<Product>)> {
    let product = state.products().create_product(input).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

/// PUT /api/admin/products/{id}
#[instrument(skip(state, update))]
pub async fn update_product(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<ProductId>,
    ApiJson(update): ApiJson<ProductUpdate>,
) -> Result<Json<Product>> {
    Ok(Json(state.products().update_product(id, update).await?))
}

/// DELETE /api/admin/products/{id}
#[instrument(skip(state))]
pub async fn delete_product(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<ProductId>,
) -> Result<StatusCode> {
    state.products().delete_product(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /api/admin/products/{id}/categories
#[instrument(skip(state, request))]
pub async fn set_product_categories(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<ProductId>,
    ApiJson(request): ApiJson<ProductCategoriesRequest>,
) -> Result<Json<Product>> {
    Ok(Json(
        state
            .products()
            .set_product_categories(id, request.category_ids)
            .await?,
    ))
}

// =============================================================================
// Payments
// =============================================================================

/// POST /api/admin/payments/active-provider
#[instrument(skip(state, request), fields(provider = %request.provider))]
pub async fn set_active_provider(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    ApiJson(request): ApiJson<ActiveProviderRequest>,
) -> Result<Json<ActiveProviderResponse>> {
    let payments = state.payments();
    payments
        .set_active_provider(&request.provider, request.settings)
        .await?;

    Ok(Json(ActiveProviderResponse {
        provider: request.provider,
        providers: payments.providers(),
    }))
}

/// POST /api/admin/payments/refund
#[instrument(skip(state, request), fields(payment_id = %request.payment_id))]
pub async fn refund(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    ApiJson(request): ApiJson<RefundRequest>,
) -> Result<Json<RefundResult>> {
    add_breadcrumb(
        "payments",
        "Refund requested",
        Some(&[("payment_id", request.payment_id.as_str())]),
    );
    Ok(Json(
        state
            .payments()
            .refund_payment(
                &request.payment_id,
                request.amount,
                request.provider.as_deref(),
            )
            .await?,
    ))
}
