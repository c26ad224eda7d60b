//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures errors to Sentry before
//! responding to the client. All route handlers should return `Result<T, AppError>`.
//! Bodies are always JSON: `{"error": "..."}`.

use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::db::RepositoryError;
use crate::payments::PaymentError;
use crate::payments::webhook::WebhookError;
use crate::services::{CartServiceError, CategoryServiceError, ProductServiceError};

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    #[error(transparent)]
    Category(#[from] CategoryServiceError),

    #[error(transparent)]
    Product(#[from] ProductServiceError),

    #[error(transparent)]
    Cart(#[from] CartServiceError),

    /// Payment provider operation failed.
    #[error(transparent)]
    Payment(#[from] PaymentError),

    /// Webhook could not be authenticated or parsed.
    #[error(transparent)]
    Webhook(#[from] WebhookError),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Caller is not authenticated.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Caller is authenticated but not allowed.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Category(err) => match err {
                CategoryServiceError::NotFound(_) => StatusCode::NOT_FOUND,
                CategoryServiceError::Validation(_) | CategoryServiceError::Cycle { .. } => {
                    StatusCode::BAD_REQUEST
                }
                CategoryServiceError::DuplicateSlug | CategoryServiceError::HasChildren { .. } => {
                    StatusCode::CONFLICT
                }
                CategoryServiceError::Fetch(_)
                | CategoryServiceError::Create(_)
                | CategoryServiceError::Update(_)
                | CategoryServiceError::Delete(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Product(err) => match err {
                ProductServiceError::NotFound(_) => StatusCode::NOT_FOUND,
                ProductServiceError::Validation(_) | ProductServiceError::InvalidCursor(_) => {
                    StatusCode::BAD_REQUEST
                }
                ProductServiceError::Duplicate => StatusCode::CONFLICT,
                ProductServiceError::Fetch(_)
                | ProductServiceError::Create(_)
                | ProductServiceError::Update(_)
                | ProductServiceError::Delete(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Cart(err) => match err {
                CartServiceError::ProductNotFound(_) | CartServiceError::ItemNotFound(_) => {
                    StatusCode::NOT_FOUND
                }
                CartServiceError::Validation(_) => StatusCode::BAD_REQUEST,
                CartServiceError::ProductUnavailable(_)
                | CartServiceError::InsufficientStock { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                CartServiceError::Fetch(_) | CartServiceError::Update(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            Self::Payment(err) => match err {
                PaymentError::UnknownProvider(_)
                | PaymentError::Configuration(_)
                | PaymentError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
                PaymentError::NotFound(_) => StatusCode::NOT_FOUND,
                PaymentError::Declined(_) => StatusCode::UNPROCESSABLE_ENTITY,
                PaymentError::NoProvider => StatusCode::INTERNAL_SERVER_ERROR,
                PaymentError::Http(_) | PaymentError::Api { .. } | PaymentError::InvalidResponse(_) => {
                    StatusCode::BAD_GATEWAY
                }
            },
            Self::Webhook(err) => match err {
                WebhookError::MissingSignature | WebhookError::InvalidSignature(_) => {
                    StatusCode::UNAUTHORIZED
                }
                WebhookError::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            },
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Message safe to show to clients.
    fn public_message(&self, status: StatusCode) -> String {
        match status {
            StatusCode::INTERNAL_SERVER_ERROR => "Internal server error".to_string(),
            StatusCode::BAD_GATEWAY => "Payment provider error".to_string(),
            _ => match self {
                Self::Category(err) => err.to_string(),
                Self::Product(err) => err.to_string(),
                Self::Cart(err) => err.to_string(),
                Self::Payment(err) => err.to_string(),
                Self::Webhook(_) => "Invalid webhook".to_string(),
                _ => self.to_string(),
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Capture server errors to Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        } else if matches!(self, Self::Webhook(_)) {
            tracing::warn!(error = %self, "Webhook rejected");
        }

        let body = Json(json!({ "error": self.public_message(status) }));
        (status, body).into_response()
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from a user ID.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Add a breadcrumb for user actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of user actions
/// leading up to an error.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("cart", "Added item", Some(&[("product_id", "123")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}
