//! Webhook signature verification and event parsing for Square and Stripe.
//!
//! Both vendors sign with HMAC-SHA256:
//! - Square signs `notification_url || body` and sends the base64 digest in
//!   `x-square-hmacsha256-signature`.
//! - Stripe signs `"{t}.{body}"` and sends `t=...,v1=...` in
//!   `Stripe-Signature`. Timestamps older than five minutes are rejected.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use serde::Serialize;
use serde_json::Value;
use sha2::Sha256;
use thiserror::Error;

use storehouse_core::PaymentStatus;

use super::{square, stripe};

/// Allowed clock skew for Stripe signatures, in seconds.
pub const STRIPE_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("missing signature header")]
    MissingSignature,

    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error("invalid webhook payload: {0}")]
    InvalidPayload(String),
}

/// A payment state change reported by a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEvent {
    pub provider: String,
    pub event_type: String,
    /// Payment the event refers to, if any.
    pub payment_id: Option<String>,
    /// Mapped status, if the event carries one we understand.
    pub status: Option<PaymentStatus>,
}

fn signer(secret: &[u8], parts: &[&[u8]]) -> Result<Hmac<Sha256>, WebhookError> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret)
        .map_err(|e| WebhookError::InvalidSignature(e.to_string()))?;
    for part in parts {
        mac.update(part);
    }
    Ok(mac)
}

/// Verify a Square notification signature.
///
/// # Errors
///
/// Returns `WebhookError::InvalidSignature` if the signature does not match.
pub fn verify_square_signature(
    signature_key: &str,
    notification_url: &str,
    body: &[u8],
    signature: &str,
) -> Result<(), WebhookError> {
    let mac = signer(
        signature_key.as_bytes(),
        &[notification_url.as_bytes(), body],
    )?;
    let expected = STANDARD.encode(mac.finalize().into_bytes());

    if !constant_time_compare(&expected, signature.trim()) {
        return Err(WebhookError::InvalidSignature(
            "Signature mismatch".to_string(),
        ));
    }

    tracing::debug!("Square webhook signature verified");
    Ok(())
}

/// Verify a `Stripe-Signature` header against `body` at time `now`.
///
/// Any one matching `v1` signature is accepted, so secrets can be rolled.
///
/// # Errors
///
/// Returns `WebhookError::InvalidSignature` if the header is malformed, the
/// timestamp is outside [`STRIPE_TOLERANCE_SECS`] or no signature matches.
pub fn verify_stripe_signature(
    secret: &str,
    header: &str,
    body: &[u8],
    now: i64,
) -> Result<(), WebhookError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = Some(value),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let timestamp =
        timestamp.ok_or_else(|| WebhookError::InvalidSignature("Missing timestamp".to_string()))?;
    let ts: i64 = timestamp
        .parse()
        .map_err(|_| WebhookError::InvalidSignature("Invalid timestamp".to_string()))?;
    if signatures.is_empty() {
        return Err(WebhookError::InvalidSignature(
            "Missing v1 signature".to_string(),
        ));
    }

    // Check timestamp to prevent replay attacks
    if (now - ts).abs() > STRIPE_TOLERANCE_SECS {
        return Err(WebhookError::InvalidSignature(
            "Request timestamp too old".to_string(),
        ));
    }

    let mac = signer(secret.as_bytes(), &[timestamp.as_bytes(), b".", body])?;
    let expected = hex::encode(mac.finalize().into_bytes());

    if !signatures
        .iter()
        .any(|candidate| constant_time_compare(&expected, candidate))
    {
        return Err(WebhookError::InvalidSignature(
            "Signature mismatch".to_string(),
        ));
    }

    tracing::debug!("Stripe webhook signature verified");
    Ok(())
}

/// Constant-time string comparison to prevent timing attacks.
pub(crate) fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result: u8 = 0;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }

    result == 0
}

fn parse_json(body: &[u8]) -> Result<Value, WebhookError> {
    serde_json::from_slice(body).map_err(|e| WebhookError::InvalidPayload(e.to_string()))
}

fn event_type(event: &Value) -> Result<String, WebhookError> {
    event
        .get("type")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| WebhookError::InvalidPayload("missing event type".to_string()))
}

fn str_at<'a>(value: &'a Value, pointer: &str) -> Option<&'a str> {
    value.pointer(pointer).and_then(Value::as_str)
}

/// Parse a verified Square notification.
///
/// # Errors
///
/// Returns `WebhookError::InvalidPayload` if the body is not a Square event.
pub fn parse_square_event(body: &[u8]) -> Result<WebhookEvent, WebhookError> {
    let event = parse_json(body)?;
    let event_type = event_type(&event)?;

    let (payment_id, status) = if event_type.starts_with("refund.") {
        (
            str_at(&event, "/data/object/refund/payment_id"),
            str_at(&event, "/data/object/refund/status").and_then(square::map_refund_status),
        )
    } else {
        (
            str_at(&event, "/data/object/payment/id"),
            str_at(&event, "/data/object/payment/status").and_then(square::map_payment_status),
        )
    };

    Ok(WebhookEvent {
        provider: "square".to_string(),
        event_type,
        payment_id: payment_id.map(str::to_string),
        status,
    })
}

/// Parse a verified Stripe event.
///
/// # Errors
///
/// Returns `WebhookError::InvalidPayload` if the body is not a Stripe event.
pub fn parse_stripe_event(body: &[u8]) -> Result<WebhookEvent, WebhookError> {
    let event = parse_json(body)?;
    let event_type = event_type(&event)?;
    let object = event.pointer("/data/object").unwrap_or(&Value::Null);

    let (payment_id, status) = match str_at(object, "/object") {
        Some("payment_intent") => (
            str_at(object, "/id"),
            str_at(object, "/status").and_then(|s| {
                stripe::map_intent_status(s, object.get("last_payment_error").is_some_and(|e| !e.is_null()))
            }),
        ),
        Some("charge") if event_type == "charge.refunded" => (
            str_at(object, "/payment_intent"),
            Some(PaymentStatus::Refunded),
        ),
        Some("refund") => (
            str_at(object, "/payment_intent"),
            str_at(object, "/status").and_then(stripe::map_refund_status),
        ),
        _ => (None, None),
    };

    Ok(WebhookEvent {
        provider: "stripe".to_string(),
        event_type,
        payment_id: payment_id.map(str::to_string),
        status,
    })
}
