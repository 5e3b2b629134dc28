//! Payment gateway client (Stripe-compatible wire format).
//!
//! # Architecture
//!
//! - Form-encoded `POST`s to `/v1/checkout/sessions` and `/v1/payment_intents`
//! - Every create call carries a fresh `Idempotency-Key`
//! - Webhook deliveries are authenticated with an HMAC-SHA256 signature over
//!   `"{timestamp}.{raw body}"` (see [`signature`])
//!
//! Checkout code depends on the [`PaymentGateway`] trait rather than on
//! [`StripeClient`] directly.
//!
//! # Example
//!
//! ```rust,ignore
//! use kestrel_storefront::stripe::{PaymentGateway, StripeClient};
//!
//! let client = StripeClient::new(&config.payments)?;
//! let session = client.create_checkout_session(&request).await?;
//! println!("redirect to {:?}", session.url);
//! ```

mod client;
pub mod form;
pub mod signature;
pub mod types;

use std::future::Future;

pub use client::StripeClient;
pub use signature::{SIGNATURE_HEADER, SignatureError, WebhookVerifier};
pub use types::*;

use thiserror::Error;

/// Payment method every gateway account supports.
pub const UNIVERSAL_PAYMENT_METHOD: &str = "card";

/// Errors returned by gateway API calls.
///
/// Variants follow the gateway's own error categories so callers can pick a
/// user-facing message without looking at provider text.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    /// The API key was rejected.
    #[error("gateway authentication failed: {0}")]
    Authentication(String),

    /// The request parameters were rejected.
    #[error("gateway rejected request: {message}")]
    InvalidRequest {
        /// Offending parameter, when the gateway names one.
        param: Option<String>,
        /// Machine-readable rejection code.
        code: Option<String>,
        /// Provider message (never shown to customers).
        message: String,
    },

    /// The gateway could not be reached.
    #[error("gateway connection failed: {0}")]
    Connection(String),

    /// Rate limited or temporarily unavailable.
    #[error("gateway temporarily unavailable (HTTP {status}): {message}")]
    Transient {
        /// HTTP status returned.
        status: u16,
        /// Provider message.
        message: String,
    },

    /// Any other API failure, including unreadable responses.
    #[error("gateway error (HTTP {status}): {message}")]
    Api {
        /// HTTP status returned.
        status: u16,
        /// Provider message.
        message: String,
    },
}

impl GatewayError {
    /// Whether the rejection is about the payment method type list.
    ///
    /// This is the only rejection that checkout retries, with the list
    /// narrowed to [`UNIVERSAL_PAYMENT_METHOD`].
    #[must_use]
    pub fn is_payment_method_rejection(&self) -> bool {
        match self {
            Self::InvalidRequest { param, message, .. } => {
                param
                    .as_deref()
                    .is_some_and(|p| p.starts_with("payment_method_types"))
                    || message.contains("payment_method_types")
            }
            _ => false,
        }
    }
}

/// Gateway credentials are missing or unusable.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayConfigError {
    #[error("PAYMENT_SECRET_KEY is not set")]
    MissingSecretKey,

    #[error("PAYMENT_SECRET_KEY must start with sk_")]
    MalformedSecretKey,

    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

/// Outbound payment gateway operations used by checkout.
pub trait PaymentGateway: Send + Sync {
    /// Create a hosted checkout session.
    fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> impl Future<Output = Result<CheckoutSession, GatewayError>> + Send;

    /// Create a payment intent for an embedded payment form.
    fn create_payment_intent(
        &self,
        request: &PaymentIntentRequest,
    ) -> impl Future<Output = Result<PaymentIntent, GatewayError>> + Send;
}
