//! Webhook Event Processor.
//!
//! Turns signed gateway notifications into at most one order per external
//! session or intent ID. Deliveries may repeat, arrive concurrently, or
//! arrive before the checkout request that caused them has returned; the
//! unique external ID on the orders table is the only synchronization point.
//!
//! # Flow
//!
//! 1. Verify the signature over the raw body (no datastore access before this)
//! 2. Parse the event envelope
//! 3. Completed-class events: idempotency lookup, reconcile totals, insert
//!    (or mark the existing row paid), then clear the customer's cart
//! 4. Expiry events: `pending -> cancelled`
//! 5. Anything else: acknowledged without side effects

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{Span, debug, error, field, info, instrument, warn};

use kestrel_core::{Email, OrderId, OrderStatus, PricingRules, Totals};

use super::metadata::{DecodedMetadata, Flow};
use crate::db::{CartStore, OrderStore, RepositoryError};
use crate::models::{InsertOutcome, NewOrder};
use crate::stripe::{
    Event, PaymentIntentObject, SessionObject, SignatureError, WebhookVerifier, event_type,
};

/// Successful webhook outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookAck {
    pub received: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<OrderId>,
    /// The order already existed; nothing new was created.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub duplicate: bool,
    /// The event required no action.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub ignored: bool,
}

impl WebhookAck {
    const fn received(order_id: Option<OrderId>) -> Self {
        Self {
            received: true,
            order_id,
            duplicate: false,
            ignored: false,
        }
    }

    const fn duplicate(order_id: OrderId) -> Self {
        Self {
            duplicate: true,
            ..Self::received(Some(order_id))
        }
    }

    const fn ignored() -> Self {
        Self {
            ignored: true,
            ..Self::received(None)
        }
    }
}

/// Why a delivery was not acknowledged.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// Authentication failed; nothing was processed.
    #[error(transparent)]
    Signature(#[from] SignatureError),

    /// The body is not a usable event.
    #[error("malformed event: {0}")]
    Malformed(String),

    /// The datastore failed; the gateway should redeliver.
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// A payment the gateway reports as settled.
struct Settlement {
    external_id: String,
    /// Amount actually charged, in minor units.
    amount_minor: Option<i64>,
    metadata: DecodedMetadata,
    /// Gateway-reported emails, most trusted first.
    gateway_emails: Vec<String>,
    gateway_shipping: Option<Value>,
    gateway_billing: Option<Value>,
}

impl Settlement {
    fn from_session(session: SessionObject) -> Self {
        let metadata = session
            .metadata
            .as_ref()
            .map(DecodedMetadata::decode)
            .unwrap_or_default();
        let details = session.customer_details.unwrap_or_default();

        Self {
            external_id: session.id,
            amount_minor: session.amount_total,
            metadata,
            gateway_emails: details.email.into_iter().chain(session.customer_email).collect(),
            gateway_shipping: session.shipping_details.and_then(|s| s.address),
            gateway_billing: details.address,
        }
    }

    fn from_intent(intent: PaymentIntentObject, metadata: DecodedMetadata) -> Self {
        Self {
            external_id: intent.id,
            amount_minor: intent.amount_received.or(intent.amount),
            metadata,
            gateway_emails: intent.receipt_email.into_iter().collect(),
            gateway_shipping: intent.shipping.and_then(|s| s.address),
            gateway_billing: None,
        }
    }
}

/// Processes verified gateway events against the order and cart stores.
pub struct WebhookProcessor<'a, O, C> {
    pub verifier: &'a WebhookVerifier,
    pub orders: &'a O,
    pub carts: &'a C,
    pub rules: &'a PricingRules,
}

impl<O: OrderStore, C: CartStore> WebhookProcessor<'_, O, C> {
    /// Handle one delivery.
    ///
    /// # Errors
    ///
    /// Returns `WebhookError::Signature` or `WebhookError::Malformed` for
    /// deliveries that must be rejected, and `WebhookError::Repository` when
    /// the datastore failed mid-way and redelivery is wanted.
    #[instrument(skip_all, fields(event_id = field::Empty, event_type = field::Empty))]
    pub async fn handle(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookAck, WebhookError> {
        self.verifier.verify(payload, signature)?;

        let event: Event =
            serde_json::from_slice(payload).map_err(|e| WebhookError::Malformed(e.to_string()))?;
        let span = Span::current();
        span.record("event_id", event.id.as_str());
        span.record("event_type", event.event_type.as_str());

        match event.event_type.as_str() {
            event_type::CHECKOUT_SESSION_COMPLETED
            | event_type::CHECKOUT_SESSION_ASYNC_PAYMENT_SUCCEEDED => {
                let session: SessionObject = parse_object(event.data.object)?;
                if event.event_type == event_type::CHECKOUT_SESSION_COMPLETED && !session.is_paid()
                {
                    info!(session_id = %session.id, "Session completed but unpaid, awaiting async payment");
                    return Ok(WebhookAck::ignored());
                }
                self.settle(Settlement::from_session(session)).await
            }
            event_type::CHECKOUT_SESSION_EXPIRED => {
                let session: SessionObject = parse_object(event.data.object)?;
                self.expire(&session.id).await
            }
            event_type::PAYMENT_INTENT_SUCCEEDED => {
                let intent: PaymentIntentObject = parse_object(event.data.object)?;
                let metadata = intent
                    .metadata
                    .as_ref()
                    .map(DecodedMetadata::decode)
                    .unwrap_or_default();
                if metadata.flow == Some(Flow::CheckoutSession) {
                    // Settled through the session's own events
                    debug!(payment_intent_id = %intent.id, "Intent belongs to a checkout session");
                    return Ok(WebhookAck::ignored());
                }
                self.settle(Settlement::from_intent(intent, metadata)).await
            }
            other => {
                debug!(event_type = other, "Ignoring unhandled event type");
                Ok(WebhookAck::ignored())
            }
        }
    }

    /// Materialize exactly one paid order for a settled payment.
    async fn settle(&self, settlement: Settlement) -> Result<WebhookAck, WebhookError> {
        if let Some(existing) = self
            .orders
            .find_by_external_id(&settlement.external_id)
            .await?
        {
            info!(order_id = %existing.id, external_id = %settlement.external_id, "Duplicate delivery");
            self.mark_paid(existing.id, existing.status).await?;
            self.clear_cart(existing.email.as_ref()).await;
            return Ok(WebhookAck::duplicate(existing.id));
        }

        let items = settlement.metadata.items.as_ref().map_or(0, Vec::len);
        let order = self.reconcile(settlement);
        match self.orders.insert(&order).await? {
            InsertOutcome::Created(order_id) => {
                info!(
                    order_id = %order_id,
                    external_id = %order.external_id,
                    total = %order.totals.total,
                    items,
                    "Order created"
                );
                self.clear_cart(order.email.as_ref()).await;
                Ok(WebhookAck::received(Some(order_id)))
            }
            InsertOutcome::AlreadyExists => {
                // A concurrent delivery won the insert
                let existing = self
                    .orders
                    .find_by_external_id(&order.external_id)
                    .await?
                    .ok_or(RepositoryError::NotFound)?;
                info!(order_id = %existing.id, "Order created by concurrent delivery");
                self.mark_paid(existing.id, existing.status).await?;
                self.clear_cart(order.email.as_ref()).await;
                Ok(WebhookAck::duplicate(existing.id))
            }
        }
    }

    /// Build the order row from metadata, falling back to gateway fields.
    fn reconcile(&self, settlement: Settlement) -> NewOrder {
        let totals = self.totals(&settlement);
        let email = self.email(&settlement);

        NewOrder {
            external_id: settlement.external_id,
            email,
            totals,
            shipping_address: settlement
                .metadata
                .shipping_address
                .or(settlement.gateway_shipping),
            billing_address: settlement
                .metadata
                .billing_address
                .or(settlement.gateway_billing),
            status: OrderStatus::Paid,
        }
    }

    fn totals(&self, settlement: &Settlement) -> Totals {
        if let Some(subtotal) = settlement.metadata.subtotal {
            match Totals::from_subtotal(subtotal, self.rules) {
                Ok(totals) => {
                    if let Some(quoted) = settlement.metadata.total
                        && quoted != totals.total
                    {
                        warn!(
                            external_id = %settlement.external_id,
                            computed = %totals.total,
                            quoted = %quoted,
                            "Recomputed total differs from checkout total"
                        );
                    }
                    if let Some(charged) = settlement.amount_minor
                        && totals.total_minor_units() != Some(charged)
                    {
                        warn!(
                            external_id = %settlement.external_id,
                            computed = %totals.total,
                            charged,
                            "Recomputed total differs from charged amount"
                        );
                    }
                    return totals;
                }
                Err(e) => {
                    warn!(external_id = %settlement.external_id, error = %e, "Metadata subtotal unusable");
                }
            }
        } else {
            warn!(external_id = %settlement.external_id, "No subtotal in metadata, deriving from charge");
        }

        match settlement
            .amount_minor
            .map(|amount| Totals::from_gross_minor(amount, self.rules))
        {
            Some(Ok(totals)) => totals,
            Some(Err(e)) => {
                error!(external_id = %settlement.external_id, error = %e, "Charged amount unusable");
                Totals::ZERO
            }
            None => {
                error!(external_id = %settlement.external_id, "No amount available for order");
                Totals::ZERO
            }
        }
    }

    fn email(&self, settlement: &Settlement) -> Option<Email> {
        let email = settlement
            .metadata
            .email
            .iter()
            .chain(&settlement.gateway_emails)
            .find_map(|raw| Email::parse(raw).ok());
        if email.is_none() {
            warn!(external_id = %settlement.external_id, "No usable customer email");
        }
        email
    }

    /// Move an existing order to paid when the lifecycle allows it.
    async fn mark_paid(&self, order_id: OrderId, status: OrderStatus) -> Result<(), RepositoryError> {
        if status.can_transition_to(OrderStatus::Paid) {
            if self
                .orders
                .update_status(order_id, status, OrderStatus::Paid)
                .await?
            {
                info!(order_id = %order_id, from = %status, "Order marked paid");
            }
        } else if status.is_terminal() {
            warn!(order_id = %order_id, status = %status, "Payment settled for a closed order");
        } else if status.is_settled() {
            debug!(order_id = %order_id, status = %status, "Order already settled");
        }
        Ok(())
    }

    /// Cancel the unpaid order for an expired session, if there is one.
    async fn expire(&self, session_id: &str) -> Result<WebhookAck, WebhookError> {
        let Some(order) = self.orders.find_by_external_id(session_id).await? else {
            debug!(session_id, "Expired session has no order");
            return Ok(WebhookAck::received(None));
        };

        // Expiry never undoes a settled payment; refunds go through the gateway
        if !order.status.is_settled() && order.status.can_transition_to(OrderStatus::Cancelled) {
            let cancelled = self
                .orders
                .update_status(order.id, order.status, OrderStatus::Cancelled)
                .await?;
            if cancelled {
                info!(order_id = %order.id, from = %order.status, "Order cancelled after session expiry");
            }
        } else {
            warn!(
                order_id = %order.id,
                status = %order.status,
                "Expiry event for an order that can no longer be cancelled"
            );
        }

        Ok(WebhookAck::received(Some(order.id)))
    }

    /// Best effort: failures are logged, never returned.
    async fn clear_cart(&self, email: Option<&Email>) {
        let Some(email) = email else {
            return;
        };
        match self.carts.delete_by_owner(email).await {
            Ok(removed) => debug!(removed, domain = email.domain(), "Cart cleared"),
            Err(e) => warn!(error = %e, domain = email.domain(), "Failed to clear cart after payment"),
        }
    }
}

fn parse_object<T: DeserializeOwned>(object: Value) -> Result<T, WebhookError> {
    serde_json::from_value(object).map_err(|e| WebhookError::Malformed(e.to_string()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_ack_serialization() {
        assert_eq!(
            serde_json::to_value(WebhookAck::received(None)).unwrap(),
            json!({ "received": true })
        );
        assert_eq!(
            serde_json::to_value(WebhookAck::ignored()).unwrap(),
            json!({ "received": true, "ignored": true })
        );

        let id = OrderId::new(uuid::Uuid::nil());
        assert_eq!(
            serde_json::to_value(WebhookAck::duplicate(id)).unwrap(),
            json!({
                "received": true,
                "orderId": "00000000-0000-0000-0000-000000000000",
                "duplicate": true
            })
        );
    }

    #[test]
    fn test_session_settlement_fallbacks() {
        let session: SessionObject = serde_json::from_value(json!({
            "id": "cs_1",
            "amount_total": 5395,
            "customer_email": "fallback@example.pl",
            "customer_details": { "email": "Details@Example.pl", "address": { "city": "Łódź" } },
            "shipping_details": { "address": { "city": "Poznań" } }
        }))
        .unwrap();
        let settlement = Settlement::from_session(session);

        assert_eq!(settlement.gateway_emails, vec!["Details@Example.pl", "fallback@example.pl"]);
        assert_eq!(settlement.gateway_shipping, Some(json!({ "city": "Poznań" })));
        assert_eq!(settlement.gateway_billing, Some(json!({ "city": "Łódź" })));
        assert_eq!(settlement.metadata, DecodedMetadata::default());
    }
}
