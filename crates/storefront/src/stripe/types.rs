//! Request, response and event types for the payment gateway API.
//!
//! Request types are encoded by [`super::form`]; response and event types are
//! deserialized from the gateway's JSON.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Key/value metadata attached to gateway objects.
///
/// The gateway stores values as strings of at most 500 characters.
pub type Metadata = BTreeMap<String, String>;

// =============================================================================
// Requests
// =============================================================================

/// One line of a hosted checkout session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayLineItem {
    /// Product name shown on the payment page.
    pub name: String,
    /// Optional description shown under the name.
    pub description: Option<String>,
    /// Absolute image URLs.
    pub images: Vec<String>,
    /// Unit price in minor currency units.
    pub unit_amount: i64,
    /// Number of units.
    pub quantity: u32,
}

/// Parameters for creating a hosted checkout session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSessionRequest {
    pub line_items: Vec<GatewayLineItem>,
    pub currency: String,
    pub customer_email: String,
    pub payment_method_types: Vec<String>,
    pub success_url: String,
    pub cancel_url: String,
    /// Metadata on the session object.
    pub metadata: Metadata,
    /// Metadata copied onto the session's underlying payment intent.
    pub payment_intent_metadata: Metadata,
}

/// Parameters for creating a payment intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentIntentRequest {
    /// Amount in minor currency units.
    pub amount: i64,
    pub currency: String,
    pub receipt_email: String,
    pub payment_method_types: Vec<String>,
    pub metadata: Metadata,
}

// =============================================================================
// Responses
// =============================================================================

/// A created checkout session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSession {
    /// Session ID (`cs_...`).
    pub id: String,
    /// Hosted payment page URL.
    pub url: Option<String>,
}

/// A created payment intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIntent {
    /// Intent ID (`pi_...`).
    pub id: String,
    /// Secret handed to the browser to confirm the payment.
    pub client_secret: Option<String>,
    /// Amount in minor currency units.
    pub amount: i64,
    pub currency: String,
}

/// Error envelope returned with non-2xx responses.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorResponse {
    pub error: ApiErrorBody,
}

/// Body of a gateway API error.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiErrorBody {
    /// Error category (`invalid_request_error`, `api_error`, ...).
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub code: Option<String>,
    pub param: Option<String>,
    pub message: Option<String>,
}

// =============================================================================
// Webhook Events
// =============================================================================

/// Webhook event type names the processor understands.
pub mod event_type {
    pub const CHECKOUT_SESSION_COMPLETED: &str = "checkout.session.completed";
    pub const CHECKOUT_SESSION_ASYNC_PAYMENT_SUCCEEDED: &str =
        "checkout.session.async_payment_succeeded";
    pub const CHECKOUT_SESSION_EXPIRED: &str = "checkout.session.expired";
    pub const PAYMENT_INTENT_SUCCEEDED: &str = "payment_intent.succeeded";
}

/// Webhook event envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct Event {
    /// Event ID (`evt_...`).
    pub id: String,
    /// Event type, e.g. `checkout.session.completed`.
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: EventData,
}

/// Payload of a webhook event.
#[derive(Debug, Clone, Deserialize)]
pub struct EventData {
    /// The object the event is about; its shape depends on the event type.
    pub object: Value,
}

/// Checkout session as delivered in webhook events.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionObject {
    pub id: String,
    /// Amount charged, in minor units.
    pub amount_total: Option<i64>,
    pub currency: Option<String>,
    /// `paid`, `unpaid` or `no_payment_required`.
    pub payment_status: Option<String>,
    pub customer_email: Option<String>,
    pub customer_details: Option<CustomerDetails>,
    pub shipping_details: Option<ShippingDetails>,
    pub payment_intent: Option<String>,
    pub metadata: Option<Metadata>,
}

impl SessionObject {
    /// Whether the gateway considers the session settled.
    ///
    /// `unpaid` means an asynchronous method (bank transfer, BLIK pending)
    /// has not cleared yet; the gateway sends a separate event when it does.
    #[must_use]
    pub fn is_paid(&self) -> bool {
        !matches!(self.payment_status.as_deref(), Some("unpaid"))
    }
}

/// Payment intent as delivered in webhook events.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaymentIntentObject {
    pub id: String,
    pub amount: Option<i64>,
    pub amount_received: Option<i64>,
    pub currency: Option<String>,
    pub receipt_email: Option<String>,
    pub shipping: Option<ShippingDetails>,
    pub metadata: Option<Metadata>,
}

/// Customer information collected on the payment page.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CustomerDetails {
    pub email: Option<String>,
    pub name: Option<String>,
    /// Billing address, kept opaque.
    pub address: Option<Value>,
}

/// Shipping information collected on the payment page.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ShippingDetails {
    pub name: Option<String>,
    /// Shipping address, kept opaque.
    pub address: Option<Value>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_event_envelope() {
        let event: Event = serde_json::from_value(json!({
            "id": "evt_1",
            "type": "checkout.session.completed",
            "data": { "object": { "id": "cs_test_1" } }
        }))
        .unwrap();
        assert_eq!(event.event_type, event_type::CHECKOUT_SESSION_COMPLETED);

        let session: SessionObject = serde_json::from_value(event.data.object).unwrap();
        assert_eq!(session.id, "cs_test_1");
        assert!(session.is_paid());
    }

    #[test]
    fn test_unpaid_session() {
        let session: SessionObject = serde_json::from_value(json!({
            "id": "cs_test_2",
            "payment_status": "unpaid",
            "metadata": { "email": "a@b.pl" }
        }))
        .unwrap();
        assert!(!session.is_paid());
        assert_eq!(session.metadata.unwrap()["email"], "a@b.pl");
    }

    #[test]
    fn test_error_body() {
        let body: ErrorResponse = serde_json::from_value(json!({
            "error": {
                "type": "invalid_request_error",
                "param": "payment_method_types[1]",
                "message": "Invalid payment method type"
            }
        }))
        .unwrap();
        assert_eq!(body.error.kind.as_deref(), Some("invalid_request_error"));
        assert!(body.error.code.is_none());
    }
}
