//! Cart route handlers.
//!
//! The cart owner comes from the session (see [`SessionCart`]); clients
//! never name a cart id. Every mutation returns the updated cart.

use axum::{Json, extract::State};
use serde::Deserialize;
use tracing::instrument;

use storehouse_core::{CartItemId, ProductId, VariantId};

use super::extract::ApiJson;
use crate::error::{Result, add_breadcrumb};
use crate::middleware::SessionCart;
use crate::models::Cart;
use crate::state::AppState;

/// Add-to-cart request body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddItemRequest {
    pub product_id: ProductId,
    #[serde(default)]
    pub variant_id: Option<VariantId>,
    #[serde(default = "default_quantity")]
    pub quantity: i32,
}

const fn default_quantity() -> i32 {
    1
}

/// Quantity update request body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateItemRequest {
    pub item_id: CartItemId,
    pub quantity: i32,
}

/// Line removal request body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveItemRequest {
    pub item_id: CartItemId,
}

/// GET /api/cart
#[instrument(skip(state, owner))]
pub async fn show(
    State(state): State<AppState>,
    SessionCart(owner): SessionCart,
) -> Result<Json<Cart>> {
    Ok(Json(state.carts().get_cart(&owner).await?))
}

/// POST /api/cart/add
#[instrument(skip(state, owner), fields(product_id = %request.product_id))]
pub async fn add(
    State(state): State<AppState>,
    SessionCart(owner): SessionCart,
    ApiJson(request): ApiJson<AddItemRequest>,
) -> Result<Json<Cart>> {
    let cart = state
        .carts()
        .add_item(
            &owner,
            request.product_id,
            request.variant_id,
            request.quantity,
        )
        .await?;

    let product_id = request.product_id.to_string();
    add_breadcrumb(
        "cart",
        "Added item",
        Some(&[("product_id", product_id.as_str())]),
    );
    Ok(Json(cart))
}

/// POST /api/cart/update
///
/// A quantity of 0 removes the line.
#[instrument(skip(state, owner), fields(item_id = %request.item_id))]
pub async fn update(
    State(state): State<AppState>,
    SessionCart(owner): SessionCart,
    ApiJson(request): ApiJson<UpdateItemRequest>,
) -> Result<Json<Cart>> {
    Ok(Json(
        state
            .carts()
            .update_item(&owner, request.item_id, request.quantity)
            .await?,
    ))
}

/// POST /api/cart/remove
///
/// Removing a line that is already gone succeeds.
#[instrument(skip(state, owner), fields(item_id = %request.item_id))]
pub async fn remove(
    State(state): State<AppState>,
    SessionCart(owner): SessionCart,
    ApiJson(request): ApiJson<RemoveItemRequest>,
) -> Result<Json<Cart>> {
    Ok(Json(
        state.carts().remove_item(&owner, request.item_id).await?,
    ))
}

/// POST /api/cart/clear
#[instrument(skip(state, owner))]
pub async fn clear(
    State(state): State<AppState>,
    SessionCart(owner): SessionCart,
) -> Result<Json<Cart>> {
    Ok(Json(state.carts().clear_cart(&owner).await?))
}
