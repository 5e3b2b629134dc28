//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::StorefrontConfig;
use crate::db::{CartRepository, OrderRepository, ProductRepository};
use crate::storage::PublicBucket;
use crate::stripe::{GatewayConfigError, StripeClient, WebhookVerifier};

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like database connections and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    pool: PgPool,
    /// Kept as a `Result` so a missing key fails checkout calls, not startup.
    gateway: Result<StripeClient, GatewayConfigError>,
    verifier: WebhookVerifier,
    storage: PublicBucket,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Arguments
    ///
    /// * `config` - Storefront configuration
    /// * `pool` - `PostgreSQL` connection pool
    #[must_use]
    pub fn new(config: StorefrontConfig, pool: PgPool) -> Self {
        let gateway = StripeClient::new(&config.payments);
        if let Err(e) = &gateway {
            tracing::warn!(error = %e, "Payment gateway not configured, checkout will be unavailable");
        }
        if config.payments.webhook_secret.is_none() {
            tracing::warn!("Webhook secret not configured, deliveries will be rejected");
        }

        let verifier = WebhookVerifier::new(
            config.payments.webhook_secret.clone(),
            config.payments.webhook_tolerance_secs,
        );
        let storage = PublicBucket::new(config.storage_public_url.clone());

        Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                gateway,
                verifier,
                storage,
            }),
        }
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get a reference to the database connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    /// The payment gateway client, or why it could not be built.
    ///
    /// # Errors
    ///
    /// Returns the `GatewayConfigError` recorded at startup.
    pub fn gateway(&self) -> Result<&StripeClient, GatewayConfigError> {
        self.inner.gateway.as_ref().map_err(Clone::clone)
    }

    /// Get a reference to the webhook signature verifier.
    #[must_use]
    pub fn verifier(&self) -> &WebhookVerifier {
        &self.inner.verifier
    }

    /// Get a reference to the public object storage.
    #[must_use]
    pub fn storage(&self) -> &PublicBucket {
        &self.inner.storage
    }

    /// Product catalog repository.
    #[must_use]
    pub fn products(&self) -> ProductRepository<'_> {
        ProductRepository::new(&self.inner.pool)
    }

    /// Order repository.
    #[must_use]
    pub fn orders(&self) -> OrderRepository<'_> {
        OrderRepository::new(&self.inner.pool)
    }

    /// Cart repository.
    #[must_use]
    pub fn carts(&self) -> CartRepository<'_> {
        CartRepository::new(&self.inner.pool)
    }
}
