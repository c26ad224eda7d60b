//! Square payments adapter (REST API `v2`).
//!
//! Square has no payment-intent object: a payment is created and charged in
//! one call. [`SquareProvider::create_payment`] therefore records a local
//! pending intent, and [`SquareProvider::process_payment`] charges it with
//! the card nonce, using the intent id as the idempotency key so a retried
//! request never charges twice.

use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use moka::future::Cache;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use storehouse_core::{CurrencyCode, PaymentStatus};

use super::PaymentError;
use super::provider::{PaymentProvider, settings_object, string_setting};
use super::types::{
    CreatePaymentOptions, PaymentAmount, PaymentInfo, PaymentIntent, PaymentResult, RefundResult,
};
use crate::config::{SquareConfig, SquareEnvironment};

const PROVIDER_ID: &str = "square";

/// Square API version pinned by this adapter.
const API_VERSION: &str = "2025-01-23";

/// How long an unprocessed intent is remembered.
const INTENT_TTL: Duration = Duration::from_secs(60 * 60);

/// Map a Square payment status.
pub(crate) fn map_payment_status(status: &str) -> Option<PaymentStatus> {
    match status {
        "PENDING" => Some(PaymentStatus::Pending),
        "APPROVED" => Some(PaymentStatus::Processing),
        "COMPLETED" => Some(PaymentStatus::Completed),
        "CANCELED" => Some(PaymentStatus::Cancelled),
        "FAILED" => Some(PaymentStatus::Failed),
        _ => None,
    }
}

/// Map a Square refund status.
pub(crate) fn map_refund_status(status: &str) -> Option<PaymentStatus> {
    match status {
        "PENDING" => Some(PaymentStatus::Pending),
        "COMPLETED" => Some(PaymentStatus::Refunded),
        "REJECTED" | "FAILED" => Some(PaymentStatus::Failed),
        _ => None,
    }
}

#[derive(Debug, Clone)]
struct SquareSettings {
    location_id: String,
    environment: SquareEnvironment,
}

#[derive(Debug, Clone)]
struct PendingIntent {
    amount: PaymentAmount,
    options: CreatePaymentOptions,
}

/// Square adapter.
pub struct SquareProvider {
    client: reqwest::Client,
    access_token: SecretString,
    application_id: String,
    settings: RwLock<SquareSettings>,
    base_url: Option<String>,
    intents: Cache<String, PendingIntent>,
}

impl std::fmt::Debug for SquareProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SquareProvider")
            .field("application_id", &self.application_id)
            .field("access_token", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl SquareProvider {
    /// Create a Square adapter from configuration.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError::Http` if the HTTP client fails to build.
    pub fn new(config: &SquareConfig) -> Result<Self, PaymentError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            access_token: config.access_token.clone(),
            application_id: config.application_id.clone(),
            settings: RwLock::new(SquareSettings {
                location_id: config.location_id.clone(),
                environment: config.environment,
            }),
            base_url: None,
            intents: Cache::builder()
                .max_capacity(10_000)
                .time_to_live(INTENT_TTL)
                .build(),
        })
    }

    /// Send requests to `base_url` instead of Square.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    fn settings(&self) -> SquareSettings {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn url(&self, path: &str) -> String {
        let base = self
            .base_url
            .clone()
            .unwrap_or_else(|| self.settings().environment.api_base().to_string());
        format!("{}{path}", base.trim_end_matches('/'))
    }

    async fn send<T: for<'de> Deserialize<'de>>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, PaymentError> {
        let response = request
            .bearer_auth(self.access_token.expose_secret())
            .header("Square-Version", API_VERSION)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            return serde_json::from_str(&body)
                .map_err(|e| PaymentError::InvalidResponse(e.to_string()));
        }

        let errors = serde_json::from_str::<ErrorEnvelope>(&body)
            .map(|e| e.errors)
            .unwrap_or_default();
        if status.as_u16() == 404 {
            return Err(PaymentError::NotFound(describe(&errors)));
        }
        if errors.iter().any(SquareApiError::is_decline) {
            return Err(PaymentError::Declined(describe(&errors)));
        }
        Err(PaymentError::Api {
            status: status.as_u16(),
            message: if errors.is_empty() { body } else { describe(&errors) },
        })
    }

    async fn fetch_payment(&self, payment_id: &str) -> Result<SquarePayment, PaymentError> {
        let envelope: PaymentEnvelope = self
            .send(self.client.get(self.url(&format!("/v2/payments/{payment_id}"))))
            .await?;
        Ok(envelope.payment)
    }

    fn to_result(&self, payment: SquarePayment) -> Result<PaymentResult, PaymentError> {
        let status = map_payment_status(&payment.status).ok_or_else(|| {
            PaymentError::InvalidResponse(format!("unknown payment status {}", payment.status))
        })?;

        Ok(PaymentResult {
            payment_id: payment.id,
            provider: self.id().to_string(),
            status,
            amount: payment.amount_money.map(Money::into_amount).transpose()?,
            receipt_url: payment.receipt_url,
            created_at: payment.created_at,
        })
    }
}

#[async_trait]
impl PaymentProvider for SquareProvider {
    fn id(&self) -> &str {
        PROVIDER_ID
    }

    async fn initialize(&self, settings: &Value) -> Result<(), PaymentError> {
        let settings = settings_object(settings)?;
        let location_id = string_setting(settings, "locationId")?;
        let environment = string_setting(settings, "environment")?
            .map(|e| {
                e.parse::<SquareEnvironment>()
                    .map_err(|_| PaymentError::Configuration(format!("unknown environment {e}")))
            })
            .transpose()?;

        let mut current = self.settings.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(location_id) = location_id {
            if location_id.trim().is_empty() {
                return Err(PaymentError::Configuration(
                    "locationId must not be empty".to_string(),
                ));
            }
            current.location_id = location_id;
        }
        if let Some(environment) = environment {
            current.environment = environment;
        }

        tracing::debug!(
            location_id = %current.location_id,
            environment = current.environment.as_str(),
            "Square settings applied"
        );
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

        let id = format!("sq_intent_{}", Uuid::new_v4().simple());
        self.intents
            .insert(
                id.clone(),
                PendingIntent {
                    amount,
                    options: options.clone(),
                },
            )
            .await;

        Ok(PaymentIntent {
            id,
            provider: PROVIDER_ID.to_string(),
            client_secret: None,
            status: PaymentStatus::Pending,
            amount,
        })
    }

    async fn process_payment(
        &self,
        intent_id: &str,
        info: &PaymentInfo,
    ) -> Result<PaymentResult, PaymentError> {
        let intent = self
            .intents
            .get(intent_id)
            .await
            .ok_or_else(|| PaymentError::NotFound(intent_id.to_string()))?;
        let source_id = info
            .source_id
            .as_deref()
            .ok_or_else(|| PaymentError::InvalidRequest("sourceId is required".to_string()))?;

        let mut body = json!({
            "source_id": source_id,
            "idempotency_key": info.idempotency_key.as_deref().unwrap_or(intent_id),
            "amount_money": Money::from_amount(intent.amount)?,
            "location_id": self.settings().location_id,
        });
        let email = info
            .customer_email
            .as_ref()
            .or(intent.options.customer_email.as_ref());
        let optional = [
            ("verification_token", info.verification_token.as_ref()),
            ("buyer_email_address", email),
            ("note", intent.options.description.as_ref()),
            ("reference_id", intent.options.order_reference.as_ref()),
        ];
        if let Some(object) = body.as_object_mut() {
            for (key, value) in optional {
                if let Some(value) = value {
                    object.insert(key.to_string(), json!(value));
                }
            }
        }

        let envelope: PaymentEnvelope = self
            .send(self.client.post(self.url("/v2/payments")).json(&body))
            .await?;
        self.intents.invalidate(intent_id).await;

        let result = self.to_result(envelope.payment)?;
        if result.status == PaymentStatus::Failed {
            return Err(PaymentError::Declined(format!(
                "payment {} failed",
                result.payment_id
            )));
        }

        tracing::info!(payment_id = %result.payment_id, status = %result.status, "Square payment processed");
        Ok(result)
    }

    async fn verify_payment(&self, payment_id: &str) -> Result<PaymentResult, PaymentError> {
        let payment = self.fetch_payment(payment_id).await?;
        self.to_result(payment)
    }

    async fn cancel_payment(&self, payment_id: &str) -> Result<PaymentResult, PaymentError> {
        if self.intents.contains_key(payment_id) {
            // Never sent to Square; dropping it is the whole cancellation.
            let intent = self.intents.remove(payment_id).await;
            return Ok(PaymentResult {
                payment_id: payment_id.to_string(),
                provider: PROVIDER_ID.to_string(),
                status: PaymentStatus::Cancelled,
                amount: intent.map(|i| i.amount),
                receipt_url: None,
                created_at: None,
            });
        }

        let envelope: PaymentEnvelope = self
            .send(
                self.client
                    .post(self.url(&format!("/v2/payments/{payment_id}/cancel")))
                    .json(&json!({})),
            )
            .await?;
        self.to_result(envelope.payment)
    }

    async fn refund_payment(
        &self,
        payment_id: &str,
        amount: Option<PaymentAmount>,
    ) -> Result<RefundResult, PaymentError> {
        // Square requires an explicit amount; default to the full payment.
        let money = match amount {
            Some(amount) => Money::from_amount(amount)?,
            None => self
                .fetch_payment(payment_id)
                .await?
                .amount_money
                .ok_or_else(|| {
                    PaymentError::InvalidResponse("payment has no amount".to_string())
                })?,
        };

        let body = json!({
            "idempotency_key": refund_idempotency_key(payment_id, &money),
            "payment_id": payment_id,
            "amount_money": money,
        });
        let envelope: RefundEnvelope = self
            .send(self.client.post(self.url("/v2/refunds")).json(&body))
            .await?;
        let refund = envelope.refund;

        let status = map_refund_status(&refund.status).ok_or_else(|| {
            PaymentError::InvalidResponse(format!("unknown refund status {}", refund.status))
        })?;

        Ok(RefundResult {
            refund_id: refund.id,
            payment_id: refund.payment_id,
            provider: PROVIDER_ID.to_string(),
            status,
            amount: refund.amount_money.map(Money::into_amount).transpose()?,
        })
    }

    fn client_config(&self) -> Map<String, Value> {
        let settings = self.settings();
        let mut config = Map::new();
        config.insert("applicationId".to_string(), json!(self.application_id));
        config.insert("locationId".to_string(), json!(settings.location_id));
        config.insert(
            "environment".to_string(),
            json!(settings.environment.as_str()),
        );
        config
    }
}

#[derive(Debug, Clone, serde::Serialize, Deserialize)]
struct Money {
    amount: i64,
    currency: String,
}

impl Money {
    fn from_amount(amount: PaymentAmount) -> Result<Self, PaymentError> {
        Ok(Self {
            amount: amount
                .minor_units()
                .map_err(|e| PaymentError::InvalidRequest(e.to_string()))?,
            currency: amount.currency_code.as_str().to_string(),
        })
    }

    fn into_amount(self) -> Result<PaymentAmount, PaymentError> {
        let currency = self
            .currency
            .parse::<CurrencyCode>()
            .map_err(|e| PaymentError::InvalidResponse(e.to_string()))?;
        Ok(PaymentAmount::from_minor_units(self.amount, currency))
    }
}

#[derive(Debug, Deserialize)]
struct SquarePayment {
    id: String,
    status: String,
    amount_money: Option<Money>,
    receipt_url: Option<String>,
    created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct SquareRefund {
    id: String,
    status: String,
    payment_id: String,
    amount_money: Option<Money>,
}

#[derive(Debug, Deserialize)]
struct PaymentEnvelope {
    payment: SquarePayment,
}

#[derive(Debug, Deserialize)]
struct RefundEnvelope {
    refund: SquareRefund,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    errors: Vec<SquareApiError>,
}

#[derive(Debug, Deserialize)]
struct SquareApiError {
    category: String,
    code: String,
    #[serde(default)]
    detail: Option<String>,
}

impl SquareApiError {
    fn is_decline(&self) -> bool {
        self.category == "PAYMENT_METHOD_ERROR"
    }
}

/// Stable key for refunding `money` of `payment_id`, so a retried refund
/// request is deduplicated by Square. Fits Square's 45 character limit.
fn refund_idempotency_key(payment_id: &str, money: &Money) -> String {
    let digest = Sha256::new()
        .chain_update(payment_id.as_bytes())
        .chain_update(b":")
        .chain_update(money.amount.to_string().as_bytes())
        .chain_update(money.currency.as_bytes())
        .finalize();
    let prefix: Vec<u8> = digest.iter().take(20).copied().collect();
    format!("rf_{}", hex::encode(prefix))
}

fn describe(errors: &[SquareApiError]) -> String {
    errors
        .iter()
        .map(|e| e.detail.clone().unwrap_or_else(|| e.code.clone()))
        .collect::<Vec<_>>()
        .join("; ")
}
