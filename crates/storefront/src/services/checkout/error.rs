//! Checkout error types.

use axum::http::StatusCode;
use thiserror::Error;

use kestrel_core::{CartError, PricingError, ProductId};

use super::catalog::CatalogError;
use super::origin::OriginError;
use crate::db::RepositoryError;
use crate::stripe::{GatewayConfigError, GatewayError};

/// Everything that can stop a checkout request.
///
/// Closed union: HTTP mapping matches on it exhaustively.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// Malformed cart, email or oversized payload.
    #[error(transparent)]
    Cart(#[from] CartError),

    /// Redirect origin unusable.
    #[error(transparent)]
    Origin(#[from] OriginError),

    /// Products missing, inactive or out of stock.
    #[error("products unavailable")]
    ProductsUnavailable { missing: Vec<ProductId> },

    /// Totals negative, overflowing or above the ceiling.
    #[error(transparent)]
    Pricing(#[from] PricingError),

    /// A unit price cannot be expressed as a gateway amount.
    #[error("unit amount for product {product_id} is out of range")]
    UnitAmountOutOfRange { product_id: ProductId },

    /// Gateway credentials missing or malformed.
    #[error(transparent)]
    GatewayConfig(#[from] GatewayConfigError),

    /// The gateway call failed.
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// Datastore failure.
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl CheckoutError {
    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Cart(CartError::PayloadTooLarge { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Cart(_)
            | Self::Origin(_)
            | Self::Pricing(_)
            | Self::UnitAmountOutOfRange { .. }
            | Self::Gateway(GatewayError::InvalidRequest { .. }) => StatusCode::BAD_REQUEST,
            Self::ProductsUnavailable { .. } => StatusCode::NOT_FOUND,
            Self::GatewayConfig(_)
            | Self::Gateway(GatewayError::Authentication(_))
            | Self::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Gateway(GatewayError::Connection(_) | GatewayError::Transient { .. }) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::Gateway(GatewayError::Api { .. }) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Stable machine-readable code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Cart(e) => e.code(),
            Self::Origin(_) => "invalid_origin",
            Self::ProductsUnavailable { .. } => "products_unavailable",
            Self::Pricing(_) => "invalid_totals",
            Self::UnitAmountOutOfRange { .. } => "invalid_line_amount",
            Self::GatewayConfig(_) | Self::Gateway(GatewayError::Authentication(_)) => {
                "payment_unavailable"
            }
            Self::Gateway(GatewayError::InvalidRequest { .. }) => "payment_rejected",
            Self::Gateway(GatewayError::Connection(_)) => "payment_unreachable",
            Self::Gateway(GatewayError::Transient { .. }) => "payment_busy",
            Self::Gateway(GatewayError::Api { .. }) => "payment_failed",
            Self::Repository(_) => "internal_error",
        }
    }

    /// Low-cardinality identifier for support correlation.
    #[must_use]
    pub const fn debug_id(&self) -> &'static str {
        match self {
            Self::Cart(_) => "E_CART",
            Self::Origin(_) => "E_ORIGIN",
            Self::ProductsUnavailable { .. } => "E_CATALOG",
            Self::Pricing(_) | Self::UnitAmountOutOfRange { .. } => "E_PRICING",
            Self::GatewayConfig(_) => "E_GATEWAY_CONFIG",
            Self::Gateway(GatewayError::Authentication(_)) => "E_GATEWAY_AUTH",
            Self::Gateway(GatewayError::InvalidRequest { .. }) => "E_GATEWAY_REQUEST",
            Self::Gateway(GatewayError::Connection(_)) => "E_GATEWAY_CONNECTION",
            Self::Gateway(GatewayError::Transient { .. }) => "E_GATEWAY_TRANSIENT",
            Self::Gateway(GatewayError::Api { .. }) => "E_GATEWAY",
            Self::Repository(_) => "E_DATASTORE",
        }
    }

    /// Message safe to show a customer. Provider text never appears here.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Cart(CartError::PayloadTooLarge { .. }) => "Request is too large".to_string(),
            Self::Cart(CartError::MissingEmail) => "Email address is required".to_string(),
            Self::Cart(CartError::InvalidEmail(_)) => "Email address is invalid".to_string(),
            Self::Cart(_) => "Cart is invalid".to_string(),
            Self::Origin(_) => "Request origin is invalid".to_string(),
            Self::ProductsUnavailable { .. } => {
                "Some products are no longer available".to_string()
            }
            Self::Pricing(PricingError::ExceedsMaximum { max, .. }) => {
                format!("Order total exceeds the maximum of {max}")
            }
            Self::Pricing(_) | Self::UnitAmountOutOfRange { .. } => {
                "Order total is invalid".to_string()
            }
            Self::GatewayConfig(_) | Self::Gateway(GatewayError::Authentication(_)) => {
                "Payments are temporarily unavailable".to_string()
            }
            Self::Gateway(GatewayError::InvalidRequest { .. }) => {
                "Payment could not be started, please review your order".to_string()
            }
            Self::Gateway(GatewayError::Connection(_) | GatewayError::Transient { .. }) => {
                "Payment provider is busy, please try again shortly".to_string()
            }
            Self::Gateway(GatewayError::Api { .. }) => "Payment could not be started".to_string(),
            Self::Repository(_) => "Internal server error".to_string(),
        }
    }

    /// Server-side failures worth an error report.
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        self.status().is_server_error() || matches!(self, Self::Gateway(GatewayError::Api { .. }))
    }
}

impl From<CatalogError> for CheckoutError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::ProductsUnavailable { missing } => Self::ProductsUnavailable { missing },
            CatalogError::Repository(e) => Self::Repository(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    #[test]
    fn test_client_errors() {
        let err = CheckoutError::from(CartError::PayloadTooLarge { size: 10, max: 5 });
        assert_eq!(err.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(err.code(), "payload_too_large");

        let err = CheckoutError::from(CartError::MissingEmail);
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.debug_id(), "E_CART");
        assert!(!err.is_server_error());

        let err = CheckoutError::ProductsUnavailable {
            missing: vec![ProductId::new(Uuid::nil())],
        };
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.code(), "products_unavailable");
    }

    #[test]
    fn test_gateway_rejections_hide_provider_text() {
        let cases = [
            (
                GatewayError::Authentication("Invalid API Key sk_live_xxx".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
                "E_GATEWAY_AUTH",
            ),
            (
                GatewayError::InvalidRequest {
                    param: Some("line_items".to_string()),
                    code: None,
                    message: "Invalid line_items".to_string(),
                },
                StatusCode::BAD_REQUEST,
                "E_GATEWAY_REQUEST",
            ),
            (
                GatewayError::Connection("dns error".to_string()),
                StatusCode::SERVICE_UNAVAILABLE,
                "E_GATEWAY_CONNECTION",
            ),
            (
                GatewayError::Transient {
                    status: 429,
                    message: "Too many requests".to_string(),
                },
                StatusCode::SERVICE_UNAVAILABLE,
                "E_GATEWAY_TRANSIENT",
            ),
        ];

        for (gateway_err, status, debug_id) in cases {
            let provider_text = gateway_err.to_string();
            let err = CheckoutError::from(gateway_err);
            assert_eq!(err.status(), status);
            assert_eq!(err.debug_id(), debug_id);
            assert!(!err.user_message().contains(&provider_text));
        }
    }

    #[test]
    fn test_config_error_is_server_error() {
        let err = CheckoutError::from(GatewayConfigError::MissingSecretKey);
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.code(), "payment_unavailable");
        assert!(err.is_server_error());
    }
}
