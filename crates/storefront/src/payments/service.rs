//! Provider registry and request routing.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use moka::future::Cache;
use serde_json::{Map, Value, json};
use tracing::instrument;

use super::provider::PaymentProvider;
use super::{MockProvider, PaymentError, SquareProvider, StripeProvider};
use super::types::{
    CreatePaymentOptions, PaymentAmount, PaymentInfo, PaymentIntent, PaymentResult, RefundResult,
};
use crate::config::PaymentsConfig;

/// How long an intent or payment id remembers which provider created it.
const ROUTE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Routes payment operations to registered providers.
///
/// Provider resolution order for every call:
/// 1. an explicitly named provider,
/// 2. the provider that created the intent or payment (remembered for a day),
/// 3. the active provider,
/// 4. the configured default.
#[derive(Clone)]
pub struct PaymentService {
    inner: Arc<PaymentServiceInner>,
}

struct PaymentServiceInner {
    providers: RwLock<HashMap<String, Arc<dyn PaymentProvider>>>,
    active: RwLock<Option<String>>,
    default_provider: Option<String>,
    routes: Cache<String, String>,
}

impl std::fmt::Debug for PaymentService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentService")
            .field("providers", &self.providers())
            .field("active", &self.active_provider_id())
            .field("default_provider", &self.inner.default_provider)
            .finish_non_exhaustive()
    }
}

impl PaymentService {
    /// Create an empty registry.
    #[must_use]
    pub fn new(default_provider: Option<String>) -> Self {
        Self {
            inner: Arc::new(PaymentServiceInner {
                providers: RwLock::new(HashMap::new()),
                active: RwLock::new(None),
                default_provider,
                routes: Cache::builder()
                    .max_capacity(100_000)
                    .time_to_live(ROUTE_TTL)
                    .build(),
            }),
        }
    }

    /// Build a registry with every configured adapter.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError::Http` if an adapter's HTTP client fails to build.
    pub fn from_config(config: &PaymentsConfig) -> Result<Self, PaymentError> {
        let service = Self::new(Some(config.default_provider.clone()));

        if let Some(square) = &config.square {
            service.register_provider(Arc::new(SquareProvider::new(square)?));
        }
        if let Some(stripe) = &config.stripe {
            service.register_provider(Arc::new(StripeProvider::new(stripe)?));
        }
        if config.mock_enabled {
            service.register_provider(Arc::new(MockProvider::new()));
        }

        Ok(service)
    }

    /// Register an adapter under its id, replacing any previous one.
    pub fn register_provider(&self, provider: Arc<dyn PaymentProvider>) {
        let id = provider.id().to_string();
        let previous = self
            .inner
            .providers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.clone(), provider);

        if previous.is_some() {
            tracing::debug!(provider = %id, "Payment provider replaced");
        } else {
            tracing::info!(provider = %id, "Payment provider registered");
        }
    }

    /// Ids of all registered providers, sorted.
    #[must_use]
    pub fn providers(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .inner
            .providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    #[must_use]
    pub fn active_provider_id(&self) -> Option<String> {
        self.inner
            .active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Make `id` the active provider, applying `settings` first.
    ///
    /// The active provider is left unchanged if the settings are rejected.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError::UnknownProvider` if `id` is not registered, or
    /// the adapter's error if it rejects `settings`.
    #[instrument(skip(self, settings))]
    pub async fn set_active_provider(
        &self,
        id: &str,
        settings: Option<Value>,
    ) -> Result<(), PaymentError> {
        let provider = self.get(id)?;
        if let Some(settings) = settings {
            provider.initialize(&settings).await?;
        }

        *self
            .inner
            .active
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(id.to_string());
        tracing::info!(provider = %id, "Active payment provider changed");
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Arc<dyn PaymentProvider>, PaymentError> {
        self.inner
            .providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
            .ok_or_else(|| PaymentError::UnknownProvider(id.to_string()))
    }

    async fn resolve(
        &self,
        explicit: Option<&str>,
        payment_id: Option<&str>,
    ) -> Result<Arc<dyn PaymentProvider>, PaymentError> {
        if let Some(id) = explicit {
            return self.get(id);
        }
        if let Some(payment_id) = payment_id
            && let Some(id) = self.inner.routes.get(payment_id).await
        {
            return self.get(&id);
        }
        if let Some(id) = self.active_provider_id() {
            return self.get(&id);
        }
        match &self.inner.default_provider {
            Some(id) => self.get(id),
            None => Err(PaymentError::NoProvider),
        }
    }

    async fn remember(&self, payment_id: &str, provider: &str) {
        self.inner
            .routes
            .insert(payment_id.to_string(), provider.to_string())
            .await;
    }

    /// Create a payment intent.
    ///
    /// # Errors
    ///
    /// Returns a routing error or the adapter's error.
    #[instrument(skip(self, options), fields(amount = %amount.amount, currency = %amount.currency_code))]
    pub async fn create_payment(
        &self,
        amount: PaymentAmount,
        options: &CreatePaymentOptions,
    ) -> Result<PaymentIntent, PaymentError> {
        let provider = self.resolve(options.provider.as_deref(), None).await?;
        let intent = provider.create_payment(amount, options).await?;
        self.remember(&intent.id, provider.id()).await;

        tracing::info!(intent_id = %intent.id, provider = provider.id(), "Payment intent created");
        Ok(intent)
    }

    /// Process a payment intent.
    ///
    /// # Errors
    ///
    /// Returns a routing error or the adapter's error, including
    /// `PaymentError::Declined`.
    #[instrument(skip(self, info))]
    pub async fn process_payment(
        &self,
        intent_id: &str,
        info: &PaymentInfo,
    ) -> Result<PaymentResult, PaymentError> {
        let provider = self
            .resolve(info.provider.as_deref(), Some(intent_id))
            .await?;
        let result = match provider.process_payment(intent_id, info).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(intent_id = %intent_id, provider = provider.id(), error = %e, "Payment processing failed");
                return Err(e);
            }
        };
        if result.payment_id != intent_id {
            self.remember(&result.payment_id, provider.id()).await;
        }

        tracing::info!(payment_id = %result.payment_id, status = %result.status, "Payment processed");
        Ok(result)
    }

    /// Fetch the current state of a payment.
    ///
    /// # Errors
    ///
    /// Returns a routing error or the adapter's error.
    #[instrument(skip(self))]
    pub async fn verify_payment(
        &self,
        payment_id: &str,
        provider: Option<&str>,
    ) -> Result<PaymentResult, PaymentError> {
        self.resolve(provider, Some(payment_id))
            .await?
            .verify_payment(payment_id)
            .await
    }

    /// Cancel a payment that has not completed.
    ///
    /// # Errors
    ///
    /// Returns a routing error or the adapter's error.
    #[instrument(skip(self))]
    pub async fn cancel_payment(
        &self,
        payment_id: &str,
        provider: Option<&str>,
    ) -> Result<PaymentResult, PaymentError> {
        self.resolve(provider, Some(payment_id))
            .await?
            .cancel_payment(payment_id)
            .await
    }

    /// Refund a payment in full, or partially when `amount` is given.
    ///
    /// # Errors
    ///
    /// Returns a routing error or the adapter's error.
    #[instrument(skip(self, amount))]
    pub async fn refund_payment(
        &self,
        payment_id: &str,
        amount: Option<PaymentAmount>,
        provider: Option<&str>,
    ) -> Result<RefundResult, PaymentError> {
        let refund = self
            .resolve(provider, Some(payment_id))
            .await?
            .refund_payment(payment_id, amount)
            .await?;

        tracing::info!(refund_id = %refund.refund_id, payment_id = %payment_id, "Payment refunded");
        Ok(refund)
    }

    /// Client SDK configuration for a provider, tagged with its id.
    ///
    /// # Errors
    ///
    /// Returns a routing error.
    pub async fn client_config(
        &self,
        provider: Option<&str>,
    ) -> Result<Map<String, Value>, PaymentError> {
        let provider = self.resolve(provider, None).await?;
        let mut config = provider.client_config();
        config.insert("provider".to_string(), json!(provider.id()));
        Ok(config)
    }
}
