//! Payment provider webhooks.
//!
//! Signatures are checked against the raw body before anything is parsed.
//! Verified events are logged; order state lives outside this service.

use axum::{Json, body::Bytes, extract::State, http::HeaderMap};
use chrono::Utc;
use secrecy::ExposeSecret;
use serde_json::{Value, json};
use tracing::instrument;

use crate::error::{AppError, Result};
use crate::payments::webhook::{
    WebhookError, WebhookEvent, parse_square_event, parse_stripe_event, verify_square_signature,
    verify_stripe_signature,
};
use crate::state::AppState;

pub const SQUARE_SIGNATURE_HEADER: &str = "x-square-hmacsha256-signature";
pub const STRIPE_SIGNATURE_HEADER: &str = "stripe-signature";

fn header<'a>(headers: &'a HeaderMap, name: &str) -> std::result::Result<&'a str, WebhookError> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .ok_or(WebhookError::MissingSignature)
}

fn acknowledge(event: &WebhookEvent) -> Json<Value> {
    tracing::info!(
        provider = %event.provider,
        event_type = %event.event_type,
        payment_id = ?event.payment_id,
        status = ?event.status,
        "Payment webhook received"
    );
    Json(json!({ "received": true }))
}

/// POST /api/webhooks/square
#[instrument(skip_all)]
pub async fn square(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>> {
    let config = state
        .config()
        .payments
        .square
        .as_ref()
        .ok_or_else(|| AppError::NotFound("square webhooks are not configured".to_string()))?;

    let signature = header(&headers, SQUARE_SIGNATURE_HEADER)?;
    verify_square_signature(
        config.webhook_signature_key.expose_secret(),
        &config.webhook_url,
        &body,
        signature,
    )?;

    let event = parse_square_event(&body)?;
    Ok(acknowledge(&event))
}

/// POST /api/webhooks/stripe
#[instrument(skip_all)]
pub async fn stripe(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>> {
    let config = state
        .config()
        .payments
        .stripe
        .as_ref()
        .ok_or_else(|| AppError::NotFound("stripe webhooks are not configured".to_string()))?;

    let signature = header(&headers, STRIPE_SIGNATURE_HEADER)?;
    verify_stripe_signature(
        config.webhook_secret.expose_secret(),
        signature,
        &body,
        Utc::now().timestamp(),
    )?;

    let event = parse_stripe_event(&body)?;
    Ok(acknowledge(&event))
}
