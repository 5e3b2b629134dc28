//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `STOREFRONT_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//! - `STOREFRONT_BASE_URL` - Public production origin, last resort for redirect URLs
//!
//! ## Optional
//! - `STOREFRONT_HOST` - Bind address (default: 127.0.0.1)
//! - `STOREFRONT_PORT` - Listen port (default: 3000)
//! - `STOREFRONT_ENV` - `production` or `development` (default: production)
//! - `STORAGE_PUBLIC_URL` - Base URL for product image keys (default: `{BASE_URL}/media`)
//! - `PAYMENT_SECRET_KEY` - Gateway secret API key (`sk_...`)
//! - `PAYMENT_WEBHOOK_SECRET` - Webhook signing secret (`whsec_...`)
//! - `PAYMENT_API_BASE` - Gateway API base (default: <https://api.stripe.com>)
//! - `PAYMENT_API_VERSION` - Pinned gateway API version
//! - `PAYMENT_CURRENCY` - ISO 4217 code, lowercase (default: pln)
//! - `PAYMENT_METHOD_TYPES` - Comma-separated list (default: card,blik,p24)
//! - `PAYMENT_WEBHOOK_TOLERANCE_SECS` - Replay window for webhook signatures (default: 300)
//! - `CHECKOUT_MAX_ITEMS` - Maximum distinct cart lines (default: 50)
//! - `CHECKOUT_MAX_QUANTITY` - Maximum quantity per line (default: 99)
//! - `CHECKOUT_MAX_PAYLOAD_BYTES` - Maximum checkout request size (default: 65536)
//! - `CHECKOUT_MAX_SUBTOTAL` - Single-transaction ceiling (default: 100000)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment tag

use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use kestrel_core::{CartLimits, PricingRules};
use rust_decimal::Decimal;
use secrecy::SecretString;
use thiserror::Error;
use url::Url;

/// Payment methods offered when `PAYMENT_METHOD_TYPES` is unset.
pub const DEFAULT_PAYMENT_METHOD_TYPES: &[&str] = &["card", "blik", "p24"];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Production,
    Development,
}

impl Environment {
    /// Whether production-only rules apply (HTTPS origins, redacted errors).
    #[must_use]
    pub const fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(Self::Production),
            "development" | "dev" | "local" => Ok(Self::Development),
            other => Err(format!("expected production or development, got {other}")),
        }
    }
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
    /// Public production origin
    pub base_url: Url,
    /// Deployment environment
    pub environment: Environment,
    /// Base URL that image storage keys are resolved against
    pub storage_public_url: Url,
    /// Payment gateway configuration
    pub payments: PaymentConfig,
    /// Cart validation bounds
    pub cart_limits: CartLimits,
    /// Pricing rules (VAT, shipping, transaction ceiling)
    pub pricing: PricingRules,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment tag
    pub sentry_environment: Option<String>,
    /// Fraction of errors sent to Sentry
    pub sentry_sample_rate: f32,
    /// Fraction of transactions traced
    pub sentry_traces_sample_rate: f32,
}

/// Payment gateway configuration.
///
/// Credentials are optional at load time: a store without them still boots,
/// and checkout reports a gateway configuration error instead.
///
/// Implements `Debug` manually to redact secret fields.
#[derive(Clone)]
pub struct PaymentConfig {
    /// Secret API key
    pub secret_key: Option<SecretString>,
    /// Webhook signing secret
    pub webhook_secret: Option<SecretString>,
    /// Gateway API base URL
    pub api_base: Url,
    /// Pinned API version header
    pub api_version: Option<String>,
    /// Store currency (lowercase ISO 4217)
    pub currency: String,
    /// Payment method types offered at checkout
    pub method_types: Vec<String>,
    /// Maximum age of a webhook signature timestamp, in seconds
    pub webhook_tolerance_secs: i64,
}

impl std::fmt::Debug for PaymentConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |s: &Option<SecretString>| s.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("PaymentConfig")
            .field("secret_key", &redact(&self.secret_key))
            .field("webhook_secret", &redact(&self.webhook_secret))
            .field("api_base", &self.api_base.as_str())
            .field("api_version", &self.api_version)
            .field("currency", &self.currency)
            .field("method_types", &self.method_types)
            .field("webhook_tolerance_secs", &self.webhook_tolerance_secs)
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
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env(&lookup);

        let database_url = env
            .optional("STOREFRONT_DATABASE_URL")
            .or_else(|| env.optional("DATABASE_URL"))
            .map(SecretString::from)
            .ok_or_else(|| ConfigError::MissingEnvVar("STOREFRONT_DATABASE_URL".to_string()))?;
        let host = env.parsed_or("STOREFRONT_HOST", IpAddr::from([127, 0, 0, 1]))?;
        let port = env.parsed_or("STOREFRONT_PORT", 3000_u16)?;
        let base_url: Url = env.parsed("STOREFRONT_BASE_URL")?;
        let environment = env.parsed_or("STOREFRONT_ENV", Environment::Production)?;

        let storage_public_url = match env.optional("STORAGE_PUBLIC_URL") {
            Some(raw) => parse_var("STORAGE_PUBLIC_URL", &raw)?,
            None => base_url.join("media/").map_err(|e| {
                ConfigError::InvalidEnvVar("STOREFRONT_BASE_URL".to_string(), e.to_string())
            })?,
        };

        let payments = PaymentConfig::from_env(&env)?;

        let defaults = CartLimits::default();
        let cart_limits = CartLimits {
            max_items: env.parsed_or("CHECKOUT_MAX_ITEMS", defaults.max_items)?,
            max_quantity: env.parsed_or("CHECKOUT_MAX_QUANTITY", defaults.max_quantity)?,
            max_payload_bytes: env
                .parsed_or("CHECKOUT_MAX_PAYLOAD_BYTES", defaults.max_payload_bytes)?,
        };
        let pricing = PricingRules::with_max_subtotal(env.parsed_or(
            "CHECKOUT_MAX_SUBTOTAL",
            Decimal::from(PricingRules::DEFAULT_MAX_SUBTOTAL),
        )?);

        Ok(Self {
            database_url,
            host,
            port,
            base_url,
            environment,
            storage_public_url,
            payments,
            cart_limits,
            pricing,
            sentry_dsn: env.optional("SENTRY_DSN"),
            sentry_environment: env.optional("SENTRY_ENVIRONMENT"),
            sentry_sample_rate: env.parsed_or("SENTRY_SAMPLE_RATE", 1.0)?,
            sentry_traces_sample_rate: env.parsed_or("SENTRY_TRACES_SAMPLE_RATE", 0.1)?,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl PaymentConfig {
    fn from_env(env: &Env<'_>) -> Result<Self, ConfigError> {
        let method_types = env.optional("PAYMENT_METHOD_TYPES").map_or_else(
            || {
                DEFAULT_PAYMENT_METHOD_TYPES
                    .iter()
                    .map(ToString::to_string)
                    .collect()
            },
            |raw| parse_list(&raw),
        );
        if method_types.is_empty() {
            return Err(ConfigError::InvalidEnvVar(
                "PAYMENT_METHOD_TYPES".to_string(),
                "at least one payment method is required".to_string(),
            ));
        }

        Ok(Self {
            secret_key: env.optional("PAYMENT_SECRET_KEY").map(SecretString::from),
            webhook_secret: env.optional("PAYMENT_WEBHOOK_SECRET").map(SecretString::from),
            api_base: env.parsed_or(
                "PAYMENT_API_BASE",
                Url::parse("https://api.stripe.com").map_err(|e| {
                    ConfigError::InvalidEnvVar("PAYMENT_API_BASE".to_string(), e.to_string())
                })?,
            )?,
            api_version: env.optional("PAYMENT_API_VERSION"),
            currency: env
                .optional("PAYMENT_CURRENCY")
                .unwrap_or_else(|| "pln".to_string())
                .to_ascii_lowercase(),
            method_types,
            webhook_tolerance_secs: env.parsed_or("PAYMENT_WEBHOOK_TOLERANCE_SECS", 300)?,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Thin wrapper over a key lookup; empty values count as unset.
struct Env<'a>(&'a dyn Fn(&str) -> Option<String>);

impl Env<'_> {
    /// Get an optional variable.
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    /// Get and parse a required variable.
    fn parsed<T>(&self, key: &str) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let raw = self
            .optional(key)
            .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))?;
        parse_var(key, &raw)
    }

    /// Get and parse a variable, with a default when unset.
    fn parsed_or<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.optional(key)
            .map_or(Ok(default), |raw| parse_var(key, &raw))
    }
}

fn parse_var<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_ascii_lowercase)
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<StorefrontConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        StorefrontConfig::from_lookup(|key| map.get(key).cloned())
    }

    const MINIMAL: &[(&str, &str)] = &[
        ("STOREFRONT_DATABASE_URL", "postgres://localhost/kestrel"),
        ("STOREFRONT_BASE_URL", "https://sklep.example.pl"),
    ];

    #[test]
    fn test_minimal_config_defaults() {
        let config = load(MINIMAL).unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.environment, Environment::Production);
        assert_eq!(
            config.storage_public_url.as_str(),
            "https://sklep.example.pl/media/"
        );
        assert_eq!(config.payments.currency, "pln");
        assert_eq!(config.payments.method_types, vec!["card", "blik", "p24"]);
        assert!(config.payments.secret_key.is_none());
        assert_eq!(config.cart_limits, CartLimits::default());
        assert_eq!(config.pricing, PricingRules::default());
    }

    #[test]
    fn test_database_url_fallback() {
        let config = load(&[
            ("DATABASE_URL", "postgres://fly/db"),
            ("STOREFRONT_BASE_URL", "https://sklep.example.pl"),
        ])
        .unwrap();
        assert_eq!(config.database_url.expose_secret(), "postgres://fly/db");
    }

    #[test]
    fn test_missing_required() {
        let err = load(&[("STOREFRONT_DATABASE_URL", "postgres://localhost/kestrel")]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(key) if key == "STOREFRONT_BASE_URL"));
    }

    #[test]
    fn test_invalid_port() {
        let mut vars = MINIMAL.to_vec();
        vars.push(("STOREFRONT_PORT", "http"));
        assert!(matches!(load(&vars), Err(ConfigError::InvalidEnvVar(_, _))));
    }

    #[test]
    fn test_overrides() {
        let mut vars = MINIMAL.to_vec();
        vars.extend([
            ("STOREFRONT_ENV", "development"),
            ("PAYMENT_METHOD_TYPES", " Card , blik ,"),
            ("CHECKOUT_MAX_ITEMS", "10"),
            ("CHECKOUT_MAX_SUBTOTAL", "2500.00"),
            ("PAYMENT_CURRENCY", "EUR"),
        ]);
        let config = load(&vars).unwrap();
        assert!(!config.environment.is_production());
        assert_eq!(config.payments.method_types, vec!["card", "blik"]);
        assert_eq!(config.cart_limits.max_items, 10);
        assert_eq!(config.pricing.max_subtotal, Decimal::new(2500, 0));
        assert_eq!(config.payments.currency, "eur");
    }

    #[test]
    fn test_empty_method_list_rejected() {
        let mut vars = MINIMAL.to_vec();
        vars.push(("PAYMENT_METHOD_TYPES", " , "));
        assert!(matches!(load(&vars), Err(ConfigError::InvalidEnvVar(_, _))));
    }

    #[test]
    fn test_socket_addr() {
        let config = load(MINIMAL).unwrap();
        let addr = config.socket_addr();
        assert_eq!(addr.ip().to_string(), "127.0.0.1");
        assert_eq!(addr.port(), 3000);
    }

    #[test]
    fn test_payment_config_debug_redacts_secrets() {
        let mut vars = MINIMAL.to_vec();
        vars.extend([
            ("PAYMENT_SECRET_KEY", "sk_test_super_secret_value"),
            ("PAYMENT_WEBHOOK_SECRET", "whsec_super_secret_signing"),
        ]);
        let config = load(&vars).unwrap();
        let debug_output = format!("{:?}", config.payments);

        assert!(debug_output.contains("api.stripe.com"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("super_secret_value"));
        assert!(!debug_output.contains("super_secret_signing"));
    }
}
