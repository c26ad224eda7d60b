//! The capability set every payment adapter implements.

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::PaymentError;
use super::types::{
    CreatePaymentOptions, PaymentAmount, PaymentInfo, PaymentIntent, PaymentResult, RefundResult,
};

/// A payment vendor adapter.
///
/// Adapters return vendor statuses already mapped into
/// [`PaymentStatus`](storehouse_core::PaymentStatus) and report declines as
/// [`PaymentError::Declined`] rather than as a failed result.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Registry key, e.g. `"square"`.
    fn id(&self) -> &str;

    /// Apply runtime settings. Unknown keys are ignored.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError::Configuration` if `settings` is not an object
    /// or a known key has the wrong type or value.
    async fn initialize(&self, settings: &Value) -> Result<(), PaymentError>;

    async fn create_payment(
        &self,
        amount: PaymentAmount,
        options: &CreatePaymentOptions,
    ) -> Result<PaymentIntent, PaymentError>;

    async fn process_payment(
        &self,
        intent_id: &str,
        info: &PaymentInfo,
    ) -> Result<PaymentResult, PaymentError>;

    async fn verify_payment(&self, payment_id: &str) -> Result<PaymentResult, PaymentError>;

    async fn cancel_payment(&self, payment_id: &str) -> Result<PaymentResult, PaymentError>;

    /// Refund `amount`, or the full payment when `None`.
    async fn refund_payment(
        &self,
        payment_id: &str,
        amount: Option<PaymentAmount>,
    ) -> Result<RefundResult, PaymentError>;

    /// Public configuration for client SDKs. Never contains secrets.
    fn client_config(&self) -> Map<String, Value>;
}

/// Read an optional string setting.
pub(crate) fn string_setting(
    settings: &Map<String, Value>,
    key: &str,
) -> Result<Option<String>, PaymentError> {
    match settings.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(PaymentError::Configuration(format!(
            "{key} must be a string"
        ))),
    }
}

/// Read an optional boolean setting.
pub(crate) fn bool_setting(
    settings: &Map<String, Value>,
    key: &str,
) -> Result<Option<bool>, PaymentError> {
    match settings.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(_) => Err(PaymentError::Configuration(format!(
            "{key} must be a boolean"
        ))),
    }
}

/// The settings object, or a configuration error.
pub(crate) fn settings_object(settings: &Value) -> Result<&Map<String, Value>, PaymentError> {
    settings
        .as_object()
        .ok_or_else(|| PaymentError::Configuration("settings must be an object".to_string()))
}
