//! Value types passed to and returned from payment adapters.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use storehouse_core::{PaymentStatus, Price};

/// An amount to charge, in the currency's standard unit.
pub type PaymentAmount = Price;

/// Customer-side details needed to complete a payment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PaymentInfo {
    /// Provider to route to, overriding the active one.
    pub provider: Option<String>,
    /// Card nonce (Square) or payment method id (Stripe).
    pub source_id: Option<String>,
    pub customer_email: Option<String>,
    pub idempotency_key: Option<String>,
    /// Square buyer verification (SCA) token.
    pub verification_token: Option<String>,
}

/// Options for creating a payment intent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CreatePaymentOptions {
    pub provider: Option<String>,
    pub description: Option<String>,
    pub customer_email: Option<String>,
    /// Merchant-side order number, passed through to the provider.
    pub order_reference: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

/// A payment waiting to be processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntent {
    pub id: String,
    pub provider: String,
    /// Handed to the client SDK; only some providers issue one.
    pub client_secret: Option<String>,
    pub status: PaymentStatus,
    pub amount: PaymentAmount,
}

/// Outcome of processing, verifying or cancelling a payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentResult {
    pub payment_id: String,
    pub provider: String,
    pub status: PaymentStatus,
    pub amount: Option<PaymentAmount>,
    pub receipt_url: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

/// Outcome of a refund.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundResult {
    pub refund_id: String,
    pub payment_id: String,
    pub provider: String,
    pub status: PaymentStatus,
    pub amount: Option<PaymentAmount>,
}
