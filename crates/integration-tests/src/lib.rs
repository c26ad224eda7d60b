//! Test harness for driving the storefront in-process.
//!
//! The storefront router is built over in-memory repositories, a
//! tower-sessions `MemoryStore` and the mock payment adapter, then exercised
//! with `tower::ServiceExt::oneshot`. No database or network is needed: the
//! `PgPool` is created lazily and only the readiness probe ever touches it.
//!
//! ```bash
//! cargo test -p storehouse-integration-tests
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]
#![allow(clippy::missing_panics_doc, clippy::unwrap_used)]

pub mod memory;

use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{HeaderMap, Method, Request, StatusCode, header},
};
use secrecy::SecretString;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use tower::ServiceExt;
use tower_sessions::MemoryStore;

use storehouse_storefront::config::{
    PaymentsConfig, SquareConfig, SquareEnvironment, StorefrontConfig, StripeConfig,
};
use storehouse_storefront::middleware::session_layer;
use storehouse_storefront::payments::{MockProvider, PaymentService};
use storehouse_storefront::state::Repositories;
use storehouse_storefront::{AppState, RateLimits, app};

pub use memory::{InMemoryCartRepository, InMemoryCategoryRepository, InMemoryProductRepository};

pub const ADMIN_TOKEN: &str = "test-admin-token-with-enough-entropy-9f8e7d";
pub const SQUARE_SIGNATURE_KEY: &str = "square-webhook-signature-key";
pub const SQUARE_WEBHOOK_URL: &str = "https://shop.example.com/api/webhooks/square";
pub const STRIPE_WEBHOOK_SECRET: &str = "whsec_test_secret";

/// Configuration with the mock provider as default and webhook secrets for
/// both real providers.
#[must_use]
pub fn test_config() -> StorefrontConfig {
    StorefrontConfig {
        // Nothing listens here; the readiness probe is expected to fail.
        database_url: SecretString::from("postgres://storehouse@127.0.0.1:1/storehouse"),
        host: IpAddr::V4(Ipv4Addr::LOCALHOST),
        port: 3000,
        base_url: "http://localhost:3000".to_string(),
        session_secret: SecretString::from("test-session-secret-that-is-long-enough-0123"),
        admin_api_token: SecretString::from(ADMIN_TOKEN),
        payments: PaymentsConfig {
            default_provider: "mock".to_string(),
            mock_enabled: true,
            square: Some(SquareConfig {
                access_token: SecretString::from("sq-token"),
                application_id: "sandbox-sq0idb-test".to_string(),
                location_id: "L123".to_string(),
                environment: SquareEnvironment::Sandbox,
                webhook_signature_key: SecretString::from(SQUARE_SIGNATURE_KEY),
                webhook_url: SQUARE_WEBHOOK_URL.to_string(),
            }),
            stripe: Some(StripeConfig {
                secret_key: SecretString::from("sk_test_123"),
                publishable_key: "pk_test_123".to_string(),
                webhook_secret: SecretString::from(STRIPE_WEBHOOK_SECRET),
            }),
        },
        sentry_dsn: None,
    }
}

/// A response reduced to what tests look at.
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

/// The storefront router plus a one-cookie jar.
pub struct TestApp {
    router: Router,
    cookie: Mutex<Option<String>>,
    pub categories: Arc<InMemoryCategoryRepository>,
    pub products: Arc<InMemoryProductRepository>,
    pub carts: Arc<InMemoryCartRepository>,
}

impl TestApp {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    #[must_use]
    pub fn with_config(config: StorefrontConfig) -> Self {
        let categories = Arc::new(InMemoryCategoryRepository::default());
        let products = Arc::new(InMemoryProductRepository::new(Arc::clone(&categories)));
        let carts = Arc::new(InMemoryCartRepository::new(Arc::clone(&products)));

        let repositories = Repositories {
            categories: categories.clone(),
            products: products.clone(),
            carts: carts.clone(),
        };

        let payments = PaymentService::new(Some(config.payments.default_provider.clone()));
        payments.register_provider(Arc::new(MockProvider::new()));

        let pool = PgPoolOptions::new()
            .acquire_timeout(Duration::from_millis(500))
            .connect_lazy("postgres://storehouse@127.0.0.1:1/storehouse")
            .unwrap();

        let sessions = session_layer(MemoryStore::default(), &config);
        let state = AppState::with_repositories(config, pool, repositories, payments);

        Self {
            router: app(state, sessions, RateLimits::Disabled),
            cookie: Mutex::new(None),
            categories,
            products,
            carts,
        }
    }

    /// Forget the session cookie, as a new visitor would.
    pub fn clear_cookies(&self) {
        *self.cookie.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// The current session cookie, if any.
    #[must_use]
    pub fn session_cookie(&self) -> Option<String> {
        self.cookie
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub async fn get(&self, uri: &str) -> TestResponse {
        self.send(Method::GET, uri, None, &[]).await
    }

    pub async fn post(&self, uri: &str, body: &Value) -> TestResponse {
        self.send(Method::POST, uri, Some(body.to_string()), &[])
            .await
    }

    pub async fn admin(&self, method: Method, uri: &str, body: Option<&Value>) -> TestResponse {
        let auth = format!("Bearer {ADMIN_TOKEN}");
        self.send(
            method,
            uri,
            body.map(ToString::to_string),
            &[(header::AUTHORIZATION.as_str(), auth.as_str())],
        )
        .await
    }

    /// Send a request, keeping whatever session cookie the server sets.
    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        body: Option<String>,
        headers: &[(&str, &str)],
    ) -> TestResponse {
        let mut request = Request::builder().method(method).uri(uri);
        if body.is_some() {
            request = request.header(header::CONTENT_TYPE, "application/json");
        }
        if let Some(cookie) = self.session_cookie() {
            request = request.header(header::COOKIE, cookie);
        }
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        let request = request
            .body(body.map_or_else(Body::empty, Body::from))
            .unwrap();

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();

        if let Some(set_cookie) = response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            && let Some(pair) = set_cookie.split(';').next()
        {
            *self.cookie.lock().unwrap_or_else(PoisonError::into_inner) = Some(pair.to_string());
        }

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };

        TestResponse {
            status,
            headers,
            body,
        }
    }
}

impl Default for TestApp {
    fn default() -> Self {
        Self::new()
    }
}
