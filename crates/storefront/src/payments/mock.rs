//! In-memory payment adapter for development and tests.
//!
//! Deterministic: a source id starting with the decline prefix (`fail` by
//! default) is declined, everything else completes immediately.

use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use moka::future::Cache;
use serde_json::{Map, Value, json};
use uuid::Uuid;

use storehouse_core::PaymentStatus;

use super::PaymentError;
use super::provider::{PaymentProvider, bool_setting, settings_object, string_setting};
use super::types::{
    CreatePaymentOptions, PaymentAmount, PaymentInfo, PaymentIntent, PaymentResult, RefundResult,
};

const PROVIDER_ID: &str = "mock";
const DEFAULT_DECLINE_PREFIX: &str = "fail";

/// How long a mock payment can be processed, verified or refunded.
const PAYMENT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone)]
struct MockSettings {
    decline_all: bool,
    decline_prefix: String,
}

impl Default for MockSettings {
    fn default() -> Self {
        Self {
            decline_all: false,
            decline_prefix: DEFAULT_DECLINE_PREFIX.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
struct MockPayment {
    amount: PaymentAmount,
    status: PaymentStatus,
    created_at: DateTime<Utc>,
}

/// In-memory payment adapter. Payments expire after a day.
pub struct MockProvider {
    settings: RwLock<MockSettings>,
    payments: Cache<String, Arc<Mutex<MockPayment>>>,
}

impl std::fmt::Debug for MockProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockProvider")
            .field("payments", &self.payments.entry_count())
            .finish_non_exhaustive()
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::with_payment_ttl(PAYMENT_TTL)
    }
}

impl MockProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with_payment_ttl(ttl: Duration) -> Self {
        Self {
            settings: RwLock::default(),
            payments: Cache::builder()
                .max_capacity(10_000)
                .time_to_live(ttl)
                .build(),
        }
    }

    fn result(&self, id: &str, payment: &MockPayment) -> PaymentResult {
        PaymentResult {
            payment_id: id.to_string(),
            provider: self.id().to_string(),
            status: payment.status,
            amount: Some(payment.amount),
            receipt_url: payment
                .status
                .is_paid()
                .then(|| format!("https://payments.mock/receipts/{id}")),
            created_at: Some(payment.created_at),
        }
    }

    async fn with_payment<T>(
        &self,
        id: &str,
        f: impl FnOnce(&mut MockPayment) -> Result<T, PaymentError>,
    ) -> Result<T, PaymentError> {
        let payment = self
            .payments
            .get(id)
            .await
            .ok_or_else(|| PaymentError::NotFound(id.to_string()))?;
        let mut payment = payment.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut payment)
    }
}

#[async_trait]
impl PaymentProvider for MockProvider {
    fn id(&self) -> &str {
        PROVIDER_ID
    }

    async fn initialize(&self, settings: &Value) -> Result<(), PaymentError> {
        let settings = settings_object(settings)?;
        let decline_all = bool_setting(settings, "declineAll")?;
        let decline_prefix = string_setting(settings, "declinePrefix")?;

        let mut current = self.settings.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(decline_all) = decline_all {
            current.decline_all = decline_all;
        }
        if let Some(prefix) = decline_prefix {
            current.decline_prefix = prefix;
        }
        Ok(())
    }

    async fn create_payment(
        &self,
        amount: PaymentAmount,
        _options: &CreatePaymentOptions,
    ) -> Result<PaymentIntent, PaymentError> {
        if amount.amount.is_sign_negative() || amount.amount.is_zero() {
            return Err(PaymentError::InvalidRequest(
                "amount must be positive".to_string(),
            ));
        }

        let id = format!("mock_pi_{}", Uuid::new_v4().simple());
        let payment = MockPayment {
            amount,
            status: PaymentStatus::Pending,
            created_at: Utc::now(),
        };
        self.payments
            .insert(id.clone(), Arc::new(Mutex::new(payment)))
            .await;

        Ok(PaymentIntent {
            client_secret: Some(format!("{id}_secret")),
            id,
            provider: PROVIDER_ID.to_string(),
            status: PaymentStatus::Pending,
            amount,
        })
    }

    async fn process_payment(
        &self,
        intent_id: &str,
        info: &PaymentInfo,
    ) -> Result<PaymentResult, PaymentError> {
        let settings = self
            .settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let source = info.source_id.as_deref().unwrap_or("mock-card");
        let declined = settings.decline_all || source.starts_with(&settings.decline_prefix);

        self.with_payment(intent_id, |payment| {
            if payment.status != PaymentStatus::Pending {
                return Err(PaymentError::InvalidRequest(format!(
                    "payment is already {}",
                    payment.status
                )));
            }
            if declined {
                payment.status = PaymentStatus::Failed;
                return Err(PaymentError::Declined(
                    "the mock card was declined".to_string(),
                ));
            }
            payment.status = PaymentStatus::Completed;
            Ok(self.result(intent_id, payment))
        })
        .await
    }

    async fn verify_payment(&self, payment_id: &str) -> Result<PaymentResult, PaymentError> {
        self.with_payment(payment_id, |payment| Ok(self.result(payment_id, payment)))
            .await
    }

    async fn cancel_payment(&self, payment_id: &str) -> Result<PaymentResult, PaymentError> {
        self.with_payment(payment_id, |payment| {
            if payment.status != PaymentStatus::Pending {
                return Err(PaymentError::InvalidRequest(format!(
                    "cannot cancel a {} payment",
                    payment.status
                )));
            }
            payment.status = PaymentStatus::Cancelled;
            Ok(self.result(payment_id, payment))
        })
        .await
    }

    async fn refund_payment(
        &self,
        payment_id: &str,
        amount: Option<PaymentAmount>,
    ) -> Result<RefundResult, PaymentError> {
        self.with_payment(payment_id, |payment| {
            if payment.status != PaymentStatus::Completed {
                return Err(PaymentError::InvalidRequest(format!(
                    "cannot refund a {} payment",
                    payment.status
                )));
            }
            let refund = amount.unwrap_or(payment.amount);
            if refund.currency_code != payment.amount.currency_code
                || refund.amount > payment.amount.amount
                || refund.amount <= rust_decimal::Decimal::ZERO
            {
                return Err(PaymentError::InvalidRequest(
                    "refund amount is out of range".to_string(),
                ));
            }
            payment.status = PaymentStatus::Refunded;

            Ok(RefundResult {
                refund_id: format!("mock_re_{}", Uuid::new_v4().simple()),
                payment_id: payment_id.to_string(),
                provider: PROVIDER_ID.to_string(),
                status: PaymentStatus::Refunded,
                amount: Some(refund),
            })
        })
        .await
    }

    fn client_config(&self) -> Map<String, Value> {
        let mut config = Map::new();
        config.insert("environment".to_string(), json!("mock"));
        config
    }
}
