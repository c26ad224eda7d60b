//! Payment provider integration.
//!
//! [`PaymentService`] is a registry of [`PaymentProvider`] adapters with one
//! active provider and a configured default. Every call is routed to one
//! adapter and forwarded unchanged; adapters translate their vendor's
//! status vocabulary into the shared
//! [`PaymentStatus`](storehouse_core::PaymentStatus) before returning.
//!
//! # Adapters
//!
//! - [`square::SquareProvider`] - Square payments API (`/v2`)
//! - [`stripe::StripeProvider`] - Stripe `PaymentIntents` API (`/v1`)
//! - [`mock::MockProvider`] - In-memory, deterministic, for development
//!
//! Webhook signature checks for both vendors live in [`webhook`].

pub mod mock;
pub mod provider;
pub mod service;
pub mod square;
pub mod stripe;
pub mod types;
pub mod webhook;

use thiserror::Error;

pub use mock::MockProvider;
pub use provider::PaymentProvider;
pub use service::PaymentService;
pub use square::SquareProvider;
pub use stripe::StripeProvider;
pub use types::{
    CreatePaymentOptions, PaymentAmount, PaymentInfo, PaymentIntent, PaymentResult, RefundResult,
};

/// Errors from the payment layer.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// No provider was named and none is active or configured as default.
    #[error("no payment provider is available")]
    NoProvider,

    #[error("unknown payment provider: {0}")]
    UnknownProvider(String),

    /// Adapter settings were rejected.
    #[error("invalid provider configuration: {0}")]
    Configuration(String),

    /// The request is malformed before it reaches the provider.
    #[error("invalid payment request: {0}")]
    InvalidRequest(String),

    /// The intent or payment id is unknown to the provider.
    #[error("payment not found: {0}")]
    NotFound(String),

    /// The provider declined the payment.
    #[error("payment declined: {0}")]
    Declined(String),

    /// Transport failure talking to the provider.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider answered with an error status.
    #[error("provider error: {status} - {message}")]
    Api { status: u16, message: String },

    /// The provider answered with a payload we could not interpret.
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
}
