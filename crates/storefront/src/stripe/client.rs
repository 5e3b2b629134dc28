//! Payment gateway HTTP client.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, warn};
use url::Url;
use uuid::Uuid;

use super::form::{Form, checkout_session_form, payment_intent_form};
use super::types::{
    ApiErrorBody, CheckoutSession, CheckoutSessionRequest, ErrorResponse, PaymentIntent,
    PaymentIntentRequest,
};
use super::{GatewayConfigError, GatewayError, PaymentGateway};
use crate::config::PaymentConfig;

/// Request timeout for gateway calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Payment gateway API client.
#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    secret_key: SecretString,
    api_base: Url,
    api_version: Option<String>,
}

impl std::fmt::Debug for StripeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeClient")
            .field("secret_key", &"[REDACTED]")
            .field("api_base", &self.api_base.as_str())
            .field("api_version", &self.api_version)
            .finish_non_exhaustive()
    }
}

impl StripeClient {
    /// Create a new gateway client.
    ///
    /// # Errors
    ///
    /// Returns `GatewayConfigError` if the secret key is missing or does not
    /// look like a secret key.
    pub fn new(config: &PaymentConfig) -> Result<Self, GatewayConfigError> {
        let secret_key = config
            .secret_key
            .clone()
            .ok_or(GatewayConfigError::MissingSecretKey)?;
        if !secret_key.expose_secret().starts_with("sk_") {
            return Err(GatewayConfigError::MalformedSecretKey);
        }

        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| GatewayConfigError::Client(e.to_string()))?;

        Ok(Self {
            client,
            secret_key,
            api_base: config.api_base.clone(),
            api_version: config.api_version.clone(),
        })
    }

    /// POST a form to `path` and decode the JSON response.
    async fn post_form<T: DeserializeOwned>(
        &self,
        path: &str,
        form: &Form,
    ) -> Result<T, GatewayError> {
        let url = self
            .api_base
            .join(path)
            .map_err(|e| GatewayError::Connection(format!("invalid gateway URL: {e}")))?;

        // A fresh key per call: a narrowed retry is a different request.
        let idempotency_key = Uuid::new_v4().to_string();

        let mut request = self
            .client
            .post(url)
            .bearer_auth(self.secret_key.expose_secret())
            .header("Idempotency-Key", &idempotency_key)
            .form(form.pairs());
        if let Some(version) = &self.api_version {
            request = request.header("Stripe-Version", version);
        }

        let response = request
            .send()
            .await
            .map_err(|e| GatewayError::Connection(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return response.json::<T>().await.map_err(|e| GatewayError::Api {
                status: status.as_u16(),
                message: format!("unreadable response: {e}"),
            });
        }

        let body = response.text().await.unwrap_or_default();
        let error = serde_json::from_str::<ErrorResponse>(&body)
            .map(|r| r.error)
            .unwrap_or_default();
        warn!(
            status = status.as_u16(),
            kind = ?error.kind,
            param = ?error.param,
            "Gateway request rejected"
        );

        Err(classify(status, error))
    }
}

impl PaymentGateway for StripeClient {
    #[instrument(skip(self, request), fields(lines = request.line_items.len()))]
    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession, GatewayError> {
        let session: CheckoutSession = self
            .post_form("v1/checkout/sessions", &checkout_session_form(request))
            .await?;
        debug!(session_id = %session.id, "Checkout session created");
        Ok(session)
    }

    #[instrument(skip(self, request), fields(amount = request.amount))]
    async fn create_payment_intent(
        &self,
        request: &PaymentIntentRequest,
    ) -> Result<PaymentIntent, GatewayError> {
        let intent: PaymentIntent = self
            .post_form("v1/payment_intents", &payment_intent_form(request))
            .await?;
        debug!(payment_intent_id = %intent.id, "Payment intent created");
        Ok(intent)
    }
}

/// Map an HTTP status and error body to a [`GatewayError`] category.
fn classify(status: StatusCode, body: ApiErrorBody) -> GatewayError {
    let message = body
        .message
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown").to_string());

    match (status.as_u16(), body.kind.as_deref()) {
        (401 | 403, _) | (_, Some("authentication_error")) => {
            GatewayError::Authentication(message)
        }
        (429 | 500..=599, _) => GatewayError::Transient {
            status: status.as_u16(),
            message,
        },
        (400 | 402 | 404, _) | (_, Some("invalid_request_error" | "card_error")) => {
            GatewayError::InvalidRequest {
                param: body.param,
                code: body.code,
                message,
            }
        }
        (status, _) => GatewayError::Api { status, message },
    }
}
