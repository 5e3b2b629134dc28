//! Checkout pipeline.
//!
//! A checkout request moves through the same stages whichever payment flow
//! the client picked:
//!
//! ```text
//! raw body -> CheckoutRequest::parse -> catalog::resolve -> PricedCart
//!          -> SessionBuilder -> submit_* (one narrowed retry) -> gateway
//! ```
//!
//! Client-sent prices are never read; every amount comes from the catalog.
//! Orders are not written here: they appear when the gateway confirms
//! payment through [`webhook::WebhookProcessor`].

pub mod cart;
pub mod catalog;
mod error;
pub mod metadata;
pub mod origin;
pub mod session;
pub mod webhook;

pub use error::CheckoutError;

use serde::Serialize;
use tracing::{info, instrument};

use kestrel_core::{CartLimits, PricingRules, ProductId};

use self::cart::{CheckoutPreview, CheckoutRequest, PricedCart};
use self::origin::OriginError;
use self::session::{Customer, SessionBuilder, submit_checkout_session, submit_payment_intent};
use crate::config::PaymentConfig;
use crate::db::CatalogStore;
use crate::storage::ObjectStorage;
use crate::stripe::{GatewayConfigError, GatewayError, PaymentGateway};

/// Result of a hosted checkout session request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCreated {
    /// Hosted payment page to redirect the customer to.
    pub checkout_url: String,
    pub session_id: String,
}

/// Result of an embedded payment intent request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentCreated {
    pub client_secret: String,
    pub payment_intent_id: String,
    /// Amount in minor units.
    pub amount: i64,
    pub currency: String,
}

/// Checkout service.
///
/// Borrows its collaborators; one instance per request.
pub struct Checkout<'a, C, S> {
    catalog: &'a C,
    storage: &'a S,
    limits: &'a CartLimits,
    rules: &'a PricingRules,
    payments: &'a PaymentConfig,
}

impl<'a, C: CatalogStore, S: ObjectStorage> Checkout<'a, C, S> {
    /// Create a new checkout service.
    #[must_use]
    pub const fn new(
        catalog: &'a C,
        storage: &'a S,
        limits: &'a CartLimits,
        rules: &'a PricingRules,
        payments: &'a PaymentConfig,
    ) -> Self {
        Self {
            catalog,
            storage,
            limits,
            rules,
            payments,
        }
    }

    /// Price a cart without contacting the gateway.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError` for invalid carts, unavailable products or
    /// invalid totals.
    #[instrument(skip_all)]
    pub async fn preview(&self, body: &[u8]) -> Result<CheckoutPreview, CheckoutError> {
        let request = CheckoutRequest::parse(body, self.limits)?;
        let cart = self.price(&request).await?;
        Ok(CheckoutPreview::new(&cart, &self.payments.currency))
    }

    /// Create a hosted checkout session.
    ///
    /// `gateway` and `origin` are resolved by the caller; their errors only
    /// surface once the cart itself has been validated and priced.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError` from the first failing stage.
    #[instrument(skip_all)]
    pub async fn create_session<G: PaymentGateway>(
        &self,
        gateway: Result<&G, GatewayConfigError>,
        body: &[u8],
        origin: Result<String, OriginError>,
    ) -> Result<SessionCreated, CheckoutError> {
        let request = CheckoutRequest::parse(body, self.limits)?;
        let email = request.require_email()?;
        let cart = self.price(&request).await?;
        let origin = origin?;
        let gateway = gateway?;

        let customer = Customer {
            email,
            shipping_address: request.shipping_address.as_ref(),
            billing_address: request.billing_address.as_ref(),
        };
        let gateway_request = self
            .builder()
            .checkout_session_request(&cart, &customer, &origin)?;
        let session = submit_checkout_session(gateway, &gateway_request).await?;

        let checkout_url = session.url.ok_or_else(|| GatewayError::Api {
            status: 200,
            message: format!("session {} has no redirect URL", session.id),
        })?;
        info!(
            session_id = %session.id,
            items = cart.lines.len(),
            total = %cart.totals.total,
            "Checkout session created"
        );

        Ok(SessionCreated {
            checkout_url,
            session_id: session.id,
        })
    }

    /// Create a payment intent for embedded payment forms.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError` from the first failing stage.
    #[instrument(skip_all)]
    pub async fn create_payment_intent<G: PaymentGateway>(
        &self,
        gateway: Result<&G, GatewayConfigError>,
        body: &[u8],
    ) -> Result<IntentCreated, CheckoutError> {
        let request = CheckoutRequest::parse(body, self.limits)?;
        let email = request.require_email()?;
        let cart = self.price(&request).await?;
        let gateway = gateway?;

        let customer = Customer {
            email,
            shipping_address: request.shipping_address.as_ref(),
            billing_address: request.billing_address.as_ref(),
        };
        let gateway_request = self.builder().payment_intent_request(&cart, &customer)?;
        let intent = submit_payment_intent(gateway, &gateway_request).await?;

        let client_secret = intent.client_secret.ok_or_else(|| GatewayError::Api {
            status: 200,
            message: format!("payment intent {} has no client secret", intent.id),
        })?;
        info!(
            payment_intent_id = %intent.id,
            amount = intent.amount,
            "Payment intent created"
        );

        Ok(IntentCreated {
            client_secret,
            payment_intent_id: intent.id,
            amount: intent.amount,
            currency: intent.currency,
        })
    }

    async fn price(&self, request: &CheckoutRequest) -> Result<PricedCart, CheckoutError> {
        let ids: Vec<ProductId> = request.items.iter().map(|item| item.product_id).collect();
        let resolved = catalog::resolve(self.catalog, self.storage, &ids).await?;
        Ok(PricedCart::from_catalog(&request.items, &resolved, self.rules)?)
    }

    fn builder(&self) -> SessionBuilder<'a> {
        SessionBuilder {
            currency: &self.payments.currency,
            payment_method_types: &self.payments.method_types,
            vat_rate: self.rules.vat_rate,
        }
    }
}
