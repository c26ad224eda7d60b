//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `STOREFRONT_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//! - `STOREFRONT_BASE_URL` - Public URL for the storefront
//! - `STOREFRONT_SESSION_SECRET` - Session signing secret (min 32 chars, high entropy)
//! - `ADMIN_API_TOKEN` - Bearer token for `/api/admin/*` (high entropy)
//!
//! ## Optional
//! - `STOREFRONT_HOST` - Bind address (default: 127.0.0.1)
//! - `STOREFRONT_PORT` - Listen port (default: 3000)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `PAYMENT_DEFAULT_PROVIDER` - `square`, `stripe` or `mock` (default: first configured)
//! - `PAYMENT_MOCK_ENABLED` - Register the in-memory mock provider (default: false)
//!
//! ## Square (all or none)
//! - `SQUARE_ACCESS_TOKEN`, `SQUARE_APPLICATION_ID`, `SQUARE_LOCATION_ID`
//! - `SQUARE_ENVIRONMENT` - `sandbox` or `production`
//! - `SQUARE_WEBHOOK_SIGNATURE_KEY`, `SQUARE_WEBHOOK_URL`
//!
//! ## Stripe (all or none)
//! - `STRIPE_SECRET_KEY`, `STRIPE_PUBLISHABLE_KEY`, `STRIPE_WEBHOOK_SECRET`

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use url::Url;

const MIN_SESSION_SECRET_LENGTH: usize = 32;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

const SQUARE_VARS: [&str; 6] = [
    "SQUARE_ACCESS_TOKEN",
    "SQUARE_APPLICATION_ID",
    "SQUARE_LOCATION_ID",
    "SQUARE_ENVIRONMENT",
    "SQUARE_WEBHOOK_SIGNATURE_KEY",
    "SQUARE_WEBHOOK_URL",
];

const STRIPE_VARS: [&str; 3] = [
    "STRIPE_SECRET_KEY",
    "STRIPE_PUBLISHABLE_KEY",
    "STRIPE_WEBHOOK_SECRET",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
    #[error("Incomplete {provider} configuration, missing: {}", missing.join(", "))]
    PartialProvider {
        provider: &'static str,
        missing: Vec<String>,
    },
}

/// Storefront application configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL for the storefront
    pub base_url: String,
    /// Session signing secret
    pub session_secret: SecretString,
    /// Bearer token guarding the admin API
    pub admin_api_token: SecretString,
    /// Payment provider configuration
    pub payments: PaymentsConfig,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
}

/// Which payment providers are configured and which one is the default.
#[derive(Debug, Clone)]
pub struct PaymentsConfig {
    pub default_provider: String,
    pub mock_enabled: bool,
    pub square: Option<SquareConfig>,
    pub stripe: Option<StripeConfig>,
}

/// Square API environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SquareEnvironment {
    Sandbox,
    Production,
}

impl SquareEnvironment {
    /// REST API base URL for this environment.
    #[must_use]
    pub const fn api_base(self) -> &'static str {
        match self {
            Self::Sandbox => "https://connect.squareupsandbox.com",
            Self::Production => "https://connect.squareup.com",
        }
    }

    /// Lowercase name as accepted in `SQUARE_ENVIRONMENT`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sandbox => "sandbox",
            Self::Production => "production",
        }
    }
}

impl std::str::FromStr for SquareEnvironment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sandbox" => Ok(Self::Sandbox),
            "production" => Ok(Self::Production),
            other => Err(format!("expected sandbox or production, got '{other}'")),
        }
    }
}

/// Square credentials.
///
/// Implements `Debug` manually to redact secret fields.
#[derive(Clone)]
pub struct SquareConfig {
    pub access_token: SecretString,
    /// Public application id handed to the Web Payments SDK
    pub application_id: String,
    pub location_id: String,
    pub environment: SquareEnvironment,
    pub webhook_signature_key: SecretString,
    /// Notification URL registered with Square; part of the signed payload
    pub webhook_url: String,
}

impl std::fmt::Debug for SquareConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SquareConfig")
            .field("access_token", &"[REDACTED]")
            .field("application_id", &self.application_id)
            .field("location_id", &self.location_id)
            .field("environment", &self.environment)
            .field("webhook_signature_key", &"[REDACTED]")
            .field("webhook_url", &self.webhook_url)
            .finish()
    }
}

/// Stripe credentials.
///
/// Implements `Debug` manually to redact secret fields.
#[derive(Clone)]
pub struct StripeConfig {
    pub secret_key: SecretString,
    /// Publishable key (safe to expose in browser)
    pub publishable_key: String,
    pub webhook_secret: SecretString,
}

impl std::fmt::Debug for StripeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeConfig")
            .field("secret_key", &"[REDACTED]")
            .field("publishable_key", &self.publishable_key)
            .field("webhook_secret", &"[REDACTED]")
            .finish()
    }
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("STOREFRONT_DATABASE_URL")?;
        let host = get_env_or_default("STOREFRONT_HOST", "127.0.0.1")
            .parse::<IpAddr>()
            .map_err(|e| {
                ConfigError::InvalidEnvVar("STOREFRONT_HOST".to_string(), e.to_string())
            })?;
        let port = get_env_or_default("STOREFRONT_PORT", "3000")
            .parse::<u16>()
            .map_err(|e| {
                ConfigError::InvalidEnvVar("STOREFRONT_PORT".to_string(), e.to_string())
            })?;
        let base_url = get_required_env("STOREFRONT_BASE_URL")?;
        validate_url(&base_url, "STOREFRONT_BASE_URL")?;
        let session_secret = get_validated_secret("STOREFRONT_SESSION_SECRET")?;
        validate_session_secret(&session_secret, "STOREFRONT_SESSION_SECRET")?;
        let admin_api_token = get_validated_secret("ADMIN_API_TOKEN")?;

        let payments = PaymentsConfig::from_lookup(|key| std::env::var(key).ok())?;
        let sentry_dsn = get_optional_env("SENTRY_DSN");

        Ok(Self {
            database_url,
            host,
            port,
            base_url,
            session_secret,
            admin_api_token,
            payments,
            sentry_dsn,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl PaymentsConfig {
    /// Build the payment configuration from a variable lookup.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::PartialProvider` when only some of a provider's
    /// variables are set, and `ConfigError::InvalidEnvVar` when the default
    /// provider is unknown or not configured.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let square = provider_group("square", SQUARE_VARS, &lookup)?
            .map(|[token, app, location, env, key, url]| {
                let environment = env.parse::<SquareEnvironment>().map_err(|e| {
                    ConfigError::InvalidEnvVar("SQUARE_ENVIRONMENT".to_string(), e)
                })?;
                validate_secret_strength(&token, "SQUARE_ACCESS_TOKEN")?;
                validate_url(&url, "SQUARE_WEBHOOK_URL")?;
                Ok::<_, ConfigError>(SquareConfig {
                    access_token: SecretString::from(token),
                    application_id: app,
                    location_id: location,
                    environment,
                    webhook_signature_key: SecretString::from(key),
                    webhook_url: url,
                })
            })
            .transpose()?;

        let stripe = provider_group("stripe", STRIPE_VARS, &lookup)?
            .map(|[secret, publishable, webhook]| {
                validate_secret_strength(&secret, "STRIPE_SECRET_KEY")?;
                Ok::<_, ConfigError>(StripeConfig {
                    secret_key: SecretString::from(secret),
                    publishable_key: publishable,
                    webhook_secret: SecretString::from(webhook),
                })
            })
            .transpose()?;

        let mock_enabled = match lookup("PAYMENT_MOCK_ENABLED") {
            Some(v) => v.parse::<bool>().map_err(|e| {
                ConfigError::InvalidEnvVar("PAYMENT_MOCK_ENABLED".to_string(), e.to_string())
            })?,
            None => false,
        };

        let configured: Vec<&str> = [
            square.as_ref().map(|_| "square"),
            stripe.as_ref().map(|_| "stripe"),
            mock_enabled.then_some("mock"),
        ]
        .into_iter()
        .flatten()
        .collect();

        let default_provider = match lookup("PAYMENT_DEFAULT_PROVIDER") {
            Some(requested) => {
                let requested = requested.to_ascii_lowercase();
                if !configured.contains(&requested.as_str()) {
                    return Err(ConfigError::InvalidEnvVar(
                        "PAYMENT_DEFAULT_PROVIDER".to_string(),
                        format!("provider '{requested}' is not configured"),
                    ));
                }
                requested
            }
            None => configured
                .first()
                .map(ToString::to_string)
                .ok_or_else(|| {
                    ConfigError::MissingEnvVar(
                        "SQUARE_*, STRIPE_* or PAYMENT_MOCK_ENABLED=true".to_string(),
                    )
                })?,
        };

        Ok(Self {
            default_provider,
            mock_enabled,
            square,
            stripe,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get database URL with fallback to generic `DATABASE_URL`.
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Read a provider's variables as a unit: all set, or none set.
fn provider_group<const N: usize>(
    provider: &'static str,
    keys: [&str; N],
    lookup: &impl Fn(&str) -> Option<String>,
) -> Result<Option<[String; N]>, ConfigError> {
    let values = keys.map(|key| lookup(key).filter(|v| !v.trim().is_empty()));

    if values.iter().all(Option::is_none) {
        return Ok(None);
    }

    let missing: Vec<String> = keys
        .iter()
        .zip(&values)
        .filter(|(_, value)| value.is_none())
        .map(|(key, _)| (*key).to_string())
        .collect();
    if !missing.is_empty() {
        return Err(ConfigError::PartialProvider { provider, missing });
    }

    Ok(Some(values.map(Option::unwrap_or_default)))
}

fn validate_url(value: &str, var_name: &str) -> Result<(), ConfigError> {
    Url::parse(value)
        .map(|_| ())
        .map_err(|e| ConfigError::InvalidEnvVar(var_name.to_string(), e.to_string()))
}

/// Validate that a session secret meets minimum length requirements.
fn validate_session_secret(secret: &SecretString, var_name: &str) -> Result<(), ConfigError> {
    let value = secret.expose_secret();
    if value.len() < MIN_SESSION_SECRET_LENGTH {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "must be at least {} characters (got {})",
                MIN_SESSION_SECRET_LENGTH,
                value.len()
            ),
        ));
    }
    Ok(())
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)]
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated secret."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const STRONG: &str = "aB3$xY9!mK2@nL5#pQ7&rT0*uW4^zC6";

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn square_vars() -> Vec<(&'static str, &'static str)> {
        vec![
            ("SQUARE_ACCESS_TOKEN", STRONG),
            ("SQUARE_APPLICATION_ID", "sandbox-sq0idb-app"),
            ("SQUARE_LOCATION_ID", "L8ZS1M0PQ"),
            ("SQUARE_ENVIRONMENT", "sandbox"),
            ("SQUARE_WEBHOOK_SIGNATURE_KEY", "sig-key"),
            ("SQUARE_WEBHOOK_URL", "https://shop.test/api/webhooks/square"),
        ]
    }

    #[test]
    fn test_shannon_entropy_empty() {
        assert!((shannon_entropy("") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shannon_entropy_two_chars() {
        let entropy = shannon_entropy("ab");
        assert!((entropy - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_validate_secret_strength_placeholder() {
        let result = validate_secret_strength("your-api-key-here", "TEST_VAR");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_validate_secret_strength_low_entropy() {
        let result = validate_secret_strength("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa", "TEST_VAR");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_validate_secret_strength_valid() {
        assert!(validate_secret_strength(STRONG, "TEST_VAR").is_ok());
    }

    #[test]
    fn test_validate_session_secret_too_short() {
        let secret = SecretString::from("short");
        assert!(validate_session_secret(&secret, "TEST_SESSION").is_err());
    }

    #[test]
    fn test_square_only_becomes_default() {
        let config = PaymentsConfig::from_lookup(lookup(&square_vars())).unwrap();

        assert_eq!(config.default_provider, "square");
        assert!(config.stripe.is_none());
        let square = config.square.unwrap();
        assert_eq!(square.environment, SquareEnvironment::Sandbox);
        assert_eq!(square.location_id, "L8ZS1M0PQ");
    }

    #[test]
    fn test_partial_square_is_rejected() {
        let mut vars = square_vars();
        vars.retain(|(k, _)| *k != "SQUARE_LOCATION_ID");

        let err = PaymentsConfig::from_lookup(lookup(&vars)).unwrap_err();

        match err {
            ConfigError::PartialProvider { provider, missing } => {
                assert_eq!(provider, "square");
                assert_eq!(missing, vec!["SQUARE_LOCATION_ID".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_partial_stripe_is_rejected() {
        let vars = [("STRIPE_SECRET_KEY", STRONG), ("PAYMENT_MOCK_ENABLED", "true")];
        let err = PaymentsConfig::from_lookup(lookup(&vars)).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::PartialProvider {
                provider: "stripe",
                ..
            }
        ));
    }

    #[test]
    fn test_no_provider_is_an_error() {
        let err = PaymentsConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(_)));
    }

    #[test]
    fn test_default_provider_must_be_configured() {
        let vars = [
            ("PAYMENT_MOCK_ENABLED", "true"),
            ("PAYMENT_DEFAULT_PROVIDER", "stripe"),
        ];
        let err = PaymentsConfig::from_lookup(lookup(&vars)).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar(ref k, _) if k == "PAYMENT_DEFAULT_PROVIDER"));
    }

    #[test]
    fn test_explicit_default_provider() {
        let mut vars = square_vars();
        vars.push(("PAYMENT_MOCK_ENABLED", "true"));
        vars.push(("PAYMENT_DEFAULT_PROVIDER", "Mock"));

        let config = PaymentsConfig::from_lookup(lookup(&vars)).unwrap();

        assert_eq!(config.default_provider, "mock");
        assert!(config.mock_enabled);
    }

    #[test]
    fn test_invalid_square_environment() {
        let mut vars = square_vars();
        vars.retain(|(k, _)| *k != "SQUARE_ENVIRONMENT");
        vars.push(("SQUARE_ENVIRONMENT", "staging"));

        let err = PaymentsConfig::from_lookup(lookup(&vars)).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar(ref k, _) if k == "SQUARE_ENVIRONMENT"));
    }

    #[test]
    fn test_provider_configs_debug_redacts_secrets() {
        let square = PaymentsConfig::from_lookup(lookup(&square_vars()))
            .unwrap()
            .square
            .unwrap();
        let stripe = StripeConfig {
            secret_key: SecretString::from("sk_test_hiddenvalue"),
            publishable_key: "pk_test_visible".to_string(),
            webhook_secret: SecretString::from("whsec_hiddenvalue"),
        };

        let square_debug = format!("{square:?}");
        let stripe_debug = format!("{stripe:?}");

        assert!(square_debug.contains("L8ZS1M0PQ"));
        assert!(!square_debug.contains(STRONG));
        assert!(!square_debug.contains("sig-key"));
        assert!(stripe_debug.contains("pk_test_visible"));
        assert!(!stripe_debug.contains("sk_test_hiddenvalue"));
        assert!(!stripe_debug.contains("whsec_hiddenvalue"));
    }
}
