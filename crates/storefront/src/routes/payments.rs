//! Payment route handlers.
//!
//! Thin wrappers over [`PaymentService`](crate::payments::PaymentService):
//! every call may name a provider, otherwise the service routes it.

use axum::{Json, extract::State};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::instrument;

use storehouse_core::PaymentStatus;

use super::extract::{ApiJson, ApiPath, ApiQuery};
use crate::error::{AppError, Result};
use crate::payments::{
    CreatePaymentOptions, PaymentAmount, PaymentInfo, PaymentIntent, PaymentResult,
};
use crate::state::AppState;

/// `?provider=` query.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ProviderParams {
    pub provider: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateIntentRequest {
    pub amount: PaymentAmount,
    #[serde(flatten)]
    pub options: CreatePaymentOptions,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessRequest {
    pub intent_id: String,
    #[serde(flatten)]
    pub info: PaymentInfo,
}

/// Body for verify and cancel.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRef {
    pub payment_id: String,
    #[serde(default)]
    pub provider: Option<String>,
}

/// GET /api/payments/config
#[instrument(skip(state))]
pub async fn client_config(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<ProviderParams>,
) -> Result<Json<Map<String, Value>>> {
    Ok(Json(
        state
            .payments()
            .client_config(params.provider.as_deref())
            .await?,
    ))
}

/// POST /api/payments/create-intent
#[instrument(skip(state, request))]
pub async fn create_intent(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<CreateIntentRequest>,
) -> Result<Json<PaymentIntent>> {
    Ok(Json(
        state
            .payments()
            .create_payment(request.amount, &request.options)
            .await?,
    ))
}

/// POST /api/payments/process
#[instrument(skip(state, request), fields(intent_id = %request.intent_id))]
pub async fn process(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<ProcessRequest>,
) -> Result<Json<PaymentResult>> {
    Ok(Json(
        state
            .payments()
            .process_payment(&request.intent_id, &request.info)
            .await?,
    ))
}

/// POST /api/payments/verify
#[instrument(skip(state))]
pub async fn verify(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<PaymentRef>,
) -> Result<Json<PaymentResult>> {
    Ok(Json(
        state
            .payments()
            .verify_payment(&request.payment_id, request.provider.as_deref())
            .await?,
    ))
}

/// POST /api/payments/cancel
#[instrument(skip(state))]
pub async fn cancel(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<PaymentRef>,
) -> Result<Json<PaymentResult>> {
    Ok(Json(
        state
            .payments()
            .cancel_payment(&request.payment_id, request.provider.as_deref())
            .await?,
    ))
}

/// GET /api/payments/receipt/{id}
///
/// Only payments that went through have a receipt.
#[instrument(skip(state))]
pub async fn receipt(
    State(state): State<AppState>,
    ApiPath(payment_id): ApiPath<String>,
    ApiQuery(params): ApiQuery<ProviderParams>,
) -> Result<Json<PaymentResult>> {
    let result = state
        .payments()
        .verify_payment(&payment_id, params.provider.as_deref())
        .await?;

    if !matches!(
        result.status,
        PaymentStatus::Completed | PaymentStatus::Refunded
    ) {
        return Err(AppError::NotFound(format!(
            "no receipt for a {} payment",
            result.status
        )));
    }
    Ok(Json(result))
}
