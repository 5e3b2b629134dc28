//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures server-class errors to
//! Sentry before responding to the client. All route handlers return
//! `Result<T, AppError>`.
//!
//! Every failure body has the same shape:
//!
//! ```json
//! { "error": "Cart is invalid", "code": "invalid_quantity", "debugId": "E_CART", "itemIndex": 2 }
//! ```

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use kestrel_core::ProductId;

use crate::config::Environment;
use crate::services::checkout::CheckoutError;
use crate::services::checkout::webhook::WebhookError;

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum AppError {
    /// Checkout pipeline failure.
    #[error("{error}")]
    Checkout {
        #[source]
        error: CheckoutError,
        /// Include raw error text in the response body.
        expose_detail: bool,
    },

    /// Webhook delivery rejected or not processed.
    #[error("Webhook error: {0}")]
    Webhook(#[from] WebhookError),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),
}

impl AppError {
    /// Wrap a checkout error; raw detail is only exposed in development.
    #[must_use]
    pub const fn checkout(error: CheckoutError, environment: Environment) -> Self {
        Self::Checkout {
            error,
            expose_detail: !environment.is_production(),
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::Checkout { error, .. } => error.status(),
            Self::Webhook(WebhookError::Signature(_) | WebhookError::Malformed(_)) => {
                StatusCode::BAD_REQUEST
            }
            // The gateway redelivers on non-2xx
            Self::Webhook(WebhookError::Repository(_)) => StatusCode::SERVICE_UNAVAILABLE,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }

    fn should_capture(&self) -> bool {
        match self {
            Self::Checkout { error, .. } => error.is_server_error(),
            Self::Webhook(WebhookError::Repository(_)) => true,
            Self::Webhook(_) | Self::NotFound(_) => false,
        }
    }

    fn body(&self) -> ErrorBody {
        match self {
            Self::Checkout {
                error,
                expose_detail,
            } => {
                let mut body = ErrorBody::new(error.user_message(), error.code(), error.debug_id());
                match error {
                    CheckoutError::Cart(cart) => body.item_index = cart.item_index(),
                    CheckoutError::ProductsUnavailable { missing } => {
                        body.missing_product_ids = Some(missing.clone());
                    }
                    CheckoutError::UnitAmountOutOfRange { product_id } => {
                        body.product_id = Some(*product_id);
                    }
                    _ => {}
                }
                if *expose_detail {
                    body.detail = Some(error.to_string());
                }
                body
            }
            Self::Webhook(WebhookError::Signature(_)) => ErrorBody::new(
                "Invalid signature".to_string(),
                "invalid_signature",
                "E_WEBHOOK_SIGNATURE",
            ),
            Self::Webhook(WebhookError::Malformed(_)) => ErrorBody::new(
                "Malformed event".to_string(),
                "malformed_event",
                "E_WEBHOOK_PAYLOAD",
            ),
            Self::Webhook(WebhookError::Repository(_)) => ErrorBody::new(
                "Internal server error".to_string(),
                "internal_error",
                "E_DATASTORE",
            ),
            Self::NotFound(what) => ErrorBody::new(format!("Not found: {what}"), "not_found", "E_NOT_FOUND"),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    error: String,
    code: &'static str,
    debug_id: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    item_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    missing_product_ids: Option<Vec<ProductId>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    product_id: Option<ProductId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

impl ErrorBody {
    const fn new(error: String, code: &'static str, debug_id: &'static str) -> Self {
        Self {
            error,
            code,
            debug_id,
            item_index: None,
            missing_product_ids: None,
            product_id: None,
            detail: None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = self.body();

        if self.should_capture() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                debug_id = body.debug_id,
                sentry_event_id = %event_id,
                "Request error"
            );
        } else {
            tracing::debug!(error = %self, code = body.code, "Request rejected");
        }

        (status, Json(body)).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;
