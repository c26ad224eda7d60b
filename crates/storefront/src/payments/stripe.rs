//! Stripe payments adapter (`PaymentIntents` API, `v1`).
//!
//! Stripe takes form-encoded request bodies and returns JSON. Amounts are
//! sent in minor units with a lowercase currency code.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Map, Value, json};

use storehouse_core::{CurrencyCode, PaymentStatus};

use super::PaymentError;
use super::provider::{PaymentProvider, settings_object};
use super::types::{
    CreatePaymentOptions, PaymentAmount, PaymentInfo, PaymentIntent, PaymentResult, RefundResult,
};
use crate::config::StripeConfig;

const PROVIDER_ID: &str = "stripe";
const API_BASE: &str = "https://api.stripe.com";

/// Map a Stripe `PaymentIntent` status.
///
/// An intent that fell back to `requires_payment_method` after an attempt
/// carries a `last_payment_error` and counts as failed.
pub(crate) fn map_intent_status(status: &str, has_payment_error: bool) -> Option<PaymentStatus> {
    match status {
        "requires_payment_method" if has_payment_error => Some(PaymentStatus::Failed),
        "requires_payment_method" | "requires_confirmation" | "requires_action" => {
            Some(PaymentStatus::Pending)
        }
        "processing" | "requires_capture" => Some(PaymentStatus::Processing),
        "succeeded" => Some(PaymentStatus::Completed),
        "canceled" => Some(PaymentStatus::Cancelled),
        _ => None,
    }
}

/// Map a Stripe refund status.
pub(crate) fn map_refund_status(status: &str) -> Option<PaymentStatus> {
    match status {
        "succeeded" => Some(PaymentStatus::Refunded),
        "pending" | "requires_action" => Some(PaymentStatus::Pending),
        "failed" | "canceled" => Some(PaymentStatus::Failed),
        _ => None,
    }
}

/// Stripe adapter.
pub struct StripeProvider {
    client: reqwest::Client,
    secret_key: SecretString,
    publishable_key: String,
    base_url: String,
}

impl std::fmt::Debug for StripeProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeProvider")
            .field("publishable_key", &self.publishable_key)
            .field("secret_key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl StripeProvider {
    /// Create a Stripe adapter from configuration.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError::Http` if the HTTP client fails to build.
    pub fn new(config: &StripeConfig) -> Result<Self, PaymentError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            secret_key: config.secret_key.clone(),
            publishable_key: config.publishable_key.clone(),
            base_url: API_BASE.to_string(),
        })
    }

    /// Send requests to `base_url` instead of Stripe.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn send<T: for<'de> Deserialize<'de>>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, PaymentError> {
        let response = request
            .bearer_auth(self.secret_key.expose_secret())
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            return serde_json::from_str(&body)
                .map_err(|e| PaymentError::InvalidResponse(e.to_string()));
        }

        let Ok(ErrorEnvelope { error }) = serde_json::from_str::<ErrorEnvelope>(&body) else {
            return Err(PaymentError::Api {
                status: status.as_u16(),
                message: body,
            });
        };
        let message = error.message.unwrap_or_else(|| error.kind.clone());

        match status.as_u16() {
            402 if error.kind == "card_error" => Err(PaymentError::Declined(message)),
            404 => Err(PaymentError::NotFound(message)),
            code => Err(PaymentError::Api {
                status: code,
                message,
            }),
        }
    }

    fn to_result(&self, intent: StripeIntent) -> Result<PaymentResult, PaymentError> {
        let status = map_intent_status(&intent.status, intent.last_payment_error.is_some())
            .ok_or_else(|| {
                PaymentError::InvalidResponse(format!("unknown intent status {}", intent.status))
            })?;

        Ok(PaymentResult {
            provider: self.id().to_string(),
            status,
            amount: Some(to_amount(intent.amount, &intent.currency)?),
            receipt_url: intent.latest_charge.and_then(|charge| match charge {
                LatestCharge::Expanded { receipt_url } => receipt_url,
                LatestCharge::Id(_) => None,
            }),
            created_at: DateTime::<Utc>::from_timestamp(intent.created, 0),
            payment_id: intent.id,
        })
    }
}

#[async_trait]
impl PaymentProvider for StripeProvider {
    fn id(&self) -> &str {
        PROVIDER_ID
    }

    async fn initialize(&self, settings: &Value) -> Result<(), PaymentError> {
        // Stripe has no runtime-tunable settings; still reject non-objects.
        settings_object(settings)?;
        Ok(())
    }

    async fn create_payment(
        &self,
        amount: PaymentAmount,
        options: &CreatePaymentOptions,
    ) -> Result<PaymentIntent, PaymentError> {
        let minor = amount
            .minor_units()
            .map_err(|e| PaymentError::InvalidRequest(e.to_string()))?;
        if minor == 0 {
            return Err(PaymentError::InvalidRequest(
                "amount must be positive".to_string(),
            ));
        }

        let mut form = vec![
            ("amount".to_string(), minor.to_string()),
            (
                "currency".to_string(),
                amount.currency_code.as_str().to_ascii_lowercase(),
            ),
            (
                "automatic_payment_methods[enabled]".to_string(),
                "true".to_string(),
            ),
        ];
        if let Some(description) = &options.description {
            form.push(("description".to_string(), description.clone()));
        }
        if let Some(email) = &options.customer_email {
            form.push(("receipt_email".to_string(), email.clone()));
        }
        if let Some(reference) = &options.order_reference {
            form.push(("metadata[order_reference]".to_string(), reference.clone()));
        }
        for (key, value) in &options.metadata {
            form.push((format!("metadata[{key}]"), value.clone()));
        }

        let intent: StripeIntent = self
            .send(
                self.client
                    .post(self.url("/v1/payment_intents"))
                    .form(&form),
            )
            .await?;
        let result = self.to_result(intent.clone())?;

        Ok(PaymentIntent {
            id: intent.id,
            provider: PROVIDER_ID.to_string(),
            client_secret: intent.client_secret,
            status: result.status,
            amount,
        })
    }

    async fn process_payment(
        &self,
        intent_id: &str,
        info: &PaymentInfo,
    ) -> Result<PaymentResult, PaymentError> {
        let mut form = Vec::new();
        if let Some(method) = &info.source_id {
            form.push(("payment_method", method.clone()));
        }
        if let Some(email) = &info.customer_email {
            form.push(("receipt_email", email.clone()));
        }

        let mut request = self
            .client
            .post(self.url(&format!("/v1/payment_intents/{intent_id}/confirm")))
            .form(&form);
        if let Some(key) = &info.idempotency_key {
            request = request.header("Idempotency-Key", key);
        }

        let intent: StripeIntent = self.send(request).await?;
        let result = self.to_result(intent)?;
        if result.status == PaymentStatus::Failed {
            return Err(PaymentError::Declined(format!(
                "payment intent {intent_id} failed"
            )));
        }

        tracing::info!(payment_id = %result.payment_id, status = %result.status, "Stripe payment confirmed");
        Ok(result)
    }

    async fn verify_payment(&self, payment_id: &str) -> Result<PaymentResult, PaymentError> {
        let intent: StripeIntent = self
            .send(
                self.client
                    .get(self.url(&format!("/v1/payment_intents/{payment_id}")))
                    .query(&[("expand[]", "latest_charge")]),
            )
            .await?;
        self.to_result(intent)
    }

    async fn cancel_payment(&self, payment_id: &str) -> Result<PaymentResult, PaymentError> {
        let intent: StripeIntent = self
            .send(
                self.client
                    .post(self.url(&format!("/v1/payment_intents/{payment_id}/cancel")))
                    .form(&[("cancellation_reason", "requested_by_customer")]),
            )
            .await?;
        self.to_result(intent)
    }

    async fn refund_payment(
        &self,
        payment_id: &str,
        amount: Option<PaymentAmount>,
    ) -> Result<RefundResult, PaymentError> {
        let mut form = vec![("payment_intent", payment_id.to_string())];
        if let Some(amount) = amount {
            let minor = amount
                .minor_units()
                .map_err(|e| PaymentError::InvalidRequest(e.to_string()))?;
            form.push(("amount", minor.to_string()));
        }

        let refund: StripeRefund = self
            .send(self.client.post(self.url("/v1/refunds")).form(&form))
            .await?;
        let status = map_refund_status(&refund.status).ok_or_else(|| {
            PaymentError::InvalidResponse(format!("unknown refund status {}", refund.status))
        })?;

        Ok(RefundResult {
            amount: Some(to_amount(refund.amount, &refund.currency)?),
            refund_id: refund.id,
            payment_id: refund
                .payment_intent
                .unwrap_or_else(|| payment_id.to_string()),
            provider: PROVIDER_ID.to_string(),
            status,
        })
    }

    fn client_config(&self) -> Map<String, Value> {
        let mut config = Map::new();
        config.insert("publishableKey".to_string(), json!(self.publishable_key));
        config
    }
}

fn to_amount(minor: i64, currency: &str) -> Result<PaymentAmount, PaymentError> {
    let currency = currency
        .parse::<CurrencyCode>()
        .map_err(|e| PaymentError::InvalidResponse(e.to_string()))?;
    Ok(PaymentAmount::from_minor_units(minor, currency))
}

#[derive(Debug, Clone, Deserialize)]
struct StripeIntent {
    id: String,
    status: String,
    amount: i64,
    currency: String,
    created: i64,
    #[serde(default)]
    client_secret: Option<String>,
    #[serde(default)]
    last_payment_error: Option<Value>,
    #[serde(default)]
    latest_charge: Option<LatestCharge>,
}

/// `latest_charge` is an id unless expanded.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum LatestCharge {
    Id(String),
    Expanded { receipt_url: Option<String> },
}

#[derive(Debug, Deserialize)]
struct StripeRefund {
    id: String,
    status: String,
    amount: i64,
    currency: String,
    #[serde(default)]
    payment_intent: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: StripeApiError,
}

#[derive(Debug, Deserialize)]
struct StripeApiError {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    message: Option<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn provider() -> StripeProvider {
        StripeProvider::new(&StripeConfig {
            secret_key: SecretString::from("sk_test_51Hx".to_string()),
            publishable_key: "pk_test_51Hx".to_string(),
            webhook_secret: SecretString::from("whsec_test".to_string()),
        })
        .unwrap()
    }

    #[test]
    fn test_intent_status_mapping() {
        assert_eq!(
            map_intent_status("requires_payment_method", false),
            Some(PaymentStatus::Pending)
        );
        assert_eq!(
            map_intent_status("requires_payment_method", true),
            Some(PaymentStatus::Failed)
        );
        assert_eq!(
            map_intent_status("requires_action", false),
            Some(PaymentStatus::Pending)
        );
        assert_eq!(
            map_intent_status("requires_capture", false),
            Some(PaymentStatus::Processing)
        );
        assert_eq!(
            map_intent_status("succeeded", false),
            Some(PaymentStatus::Completed)
        );
        assert_eq!(
            map_intent_status("canceled", false),
            Some(PaymentStatus::Cancelled)
        );
        assert_eq!(map_intent_status("paid", false), None);
    }

    #[test]
    fn test_refund_status_mapping() {
        assert_eq!(map_refund_status("succeeded"), Some(PaymentStatus::Refunded));
        assert_eq!(map_refund_status("pending"), Some(PaymentStatus::Pending));
        assert_eq!(map_refund_status("canceled"), Some(PaymentStatus::Failed));
    }

    #[test]
    fn test_expanded_intent_maps_receipt() {
        let intent: StripeIntent = serde_json::from_value(json!({
            "id": "pi_123",
            "object": "payment_intent",
            "status": "succeeded",
            "amount": 4250,
            "currency": "eur",
            "created": 1_767_225_600,
            "latest_charge": {"id": "ch_1", "receipt_url": "https://pay.stripe.com/receipts/ch_1"}
        }))
        .unwrap();

        let result = provider().to_result(intent).unwrap();
        assert_eq!(result.status, PaymentStatus::Completed);
        let amount = result.amount.unwrap();
        assert_eq!(amount.currency_code, CurrencyCode::EUR);
        assert_eq!(amount.amount, rust_decimal::Decimal::new(4250, 2));
        assert_eq!(
            result.receipt_url.as_deref(),
            Some("https://pay.stripe.com/receipts/ch_1")
        );
        assert!(result.created_at.is_some());
    }

    #[test]
    fn test_unexpanded_charge_has_no_receipt() {
        let intent: StripeIntent = serde_json::from_value(json!({
            "id": "pi_123",
            "status": "processing",
            "amount": 100,
            "currency": "usd",
            "created": 1_767_225_600,
            "latest_charge": "ch_1"
        }))
        .unwrap();

        let result = provider().to_result(intent).unwrap();
        assert_eq!(result.status, PaymentStatus::Processing);
        assert!(result.receipt_url.is_none());
    }

    #[test]
    fn test_client_config_exposes_publishable_key_only() {
        let config = Value::Object(provider().client_config());
        assert_eq!(config["publishableKey"], "pk_test_51Hx");
        assert!(!config.to_string().contains("sk_test"));
    }
}
