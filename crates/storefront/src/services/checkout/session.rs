//! Session Builder: priced cart to gateway request, with one narrowed retry.

use rust_decimal::Decimal;
use serde_json::Value;
use tracing::{info, warn};

use kestrel_core::pricing::to_minor_units;
use kestrel_core::{Email, PricingError, ValidatedItem};

use super::CheckoutError;
use super::cart::PricedCart;
use super::metadata::{CheckoutMetadata, Flow, keys};
use crate::stripe::{
    CheckoutSession, CheckoutSessionRequest, GatewayError, GatewayLineItem, Metadata,
    PaymentGateway, PaymentIntent, PaymentIntentRequest, UNIVERSAL_PAYMENT_METHOD,
};

/// Smallest unit amount the gateway accepts, in minor units.
pub const MIN_UNIT_AMOUNT: i64 = 1;
/// Largest unit amount the gateway accepts, in minor units.
pub const MAX_UNIT_AMOUNT: i64 = 99_999_999;
/// Longest product name sent to the gateway.
pub const MAX_NAME_LEN: usize = 250;
/// Longest product description sent to the gateway.
pub const MAX_DESCRIPTION_LEN: usize = 500;
/// Most images per line item.
pub const MAX_IMAGES: usize = 4;

/// Customer facts that accompany a cart.
#[derive(Debug, Clone, Copy)]
pub struct Customer<'a> {
    pub email: &'a Email,
    pub shipping_address: Option<&'a Value>,
    pub billing_address: Option<&'a Value>,
}

/// Builds gateway requests from priced carts.
#[derive(Debug, Clone, Copy)]
pub struct SessionBuilder<'a> {
    pub currency: &'a str,
    pub payment_method_types: &'a [String],
    pub vat_rate: Decimal,
}

impl SessionBuilder<'_> {
    /// Build a hosted checkout session request.
    ///
    /// Product lines carry catalog prices; VAT and shipping follow as their
    /// own lines so the amount charged equals `cart.totals.total`.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::UnitAmountOutOfRange` for unpayable prices and
    /// `CheckoutError::Pricing` if the totals cannot be expressed in minor
    /// units.
    pub fn checkout_session_request(
        &self,
        cart: &PricedCart,
        customer: &Customer<'_>,
        origin: &str,
    ) -> Result<CheckoutSessionRequest, CheckoutError> {
        let mut line_items = Vec::with_capacity(cart.lines.len() + 2);
        let mut products_minor: i64 = 0;

        for line in &cart.lines {
            let product = &line.product;
            let unit_amount = to_minor_units(product.unit_price)
                .filter(|a| (MIN_UNIT_AMOUNT..=MAX_UNIT_AMOUNT).contains(a))
                .ok_or(CheckoutError::UnitAmountOutOfRange {
                    product_id: product.id,
                })?;
            products_minor = unit_amount
                .checked_mul(i64::from(line.quantity))
                .and_then(|amount| products_minor.checked_add(amount))
                .ok_or(PricingError::Overflow)?;

            let name = sanitize(&product.name, MAX_NAME_LEN);
            line_items.push(GatewayLineItem {
                name: if name.is_empty() {
                    product.id.to_string()
                } else {
                    name
                },
                description: product
                    .description
                    .as_deref()
                    .map(|d| sanitize(d, MAX_DESCRIPTION_LEN))
                    .filter(|d| !d.is_empty()),
                images: product.image_urls.iter().take(MAX_IMAGES).cloned().collect(),
                unit_amount,
                quantity: line.quantity,
            });
        }

        let total_minor = cart.totals.total_minor_units().ok_or(PricingError::Overflow)?;
        let shipping_minor = to_minor_units(cart.totals.shipping).ok_or(PricingError::Overflow)?;
        // Absorbs per-line rounding so the charged amount is exactly the total
        let tax_minor = total_minor - products_minor - shipping_minor;
        if tax_minor < 0 {
            return Err(PricingError::Negative {
                subtotal: cart.totals.subtotal,
            }
            .into());
        }

        if tax_minor > 0 {
            line_items.push(GatewayLineItem {
                name: format!(
                    "VAT {}%",
                    (self.vat_rate * Decimal::ONE_HUNDRED).normalize()
                ),
                description: None,
                images: Vec::new(),
                unit_amount: tax_minor,
                quantity: 1,
            });
        }
        if shipping_minor > 0 {
            line_items.push(GatewayLineItem {
                name: "Shipping".to_string(),
                description: None,
                images: Vec::new(),
                unit_amount: shipping_minor,
                quantity: 1,
            });
        }

        let items = cart.items();
        let metadata = self.metadata(cart, customer, &items, Flow::CheckoutSession);
        let payment_intent_metadata = Metadata::from([
            (keys::FLOW.to_string(), Flow::CheckoutSession.as_str().to_string()),
            (keys::EMAIL.to_string(), customer.email.to_string()),
        ]);

        Ok(CheckoutSessionRequest {
            line_items,
            currency: self.currency.to_string(),
            customer_email: customer.email.to_string(),
            payment_method_types: self.payment_method_types.to_vec(),
            success_url: format!("{origin}/checkout/success?session_id={{CHECKOUT_SESSION_ID}}"),
            cancel_url: format!("{origin}/cart"),
            metadata,
            payment_intent_metadata,
        })
    }

    /// Build a payment intent request for the cart total.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::Pricing` if the total cannot be expressed in
    /// minor units or is zero.
    pub fn payment_intent_request(
        &self,
        cart: &PricedCart,
        customer: &Customer<'_>,
    ) -> Result<PaymentIntentRequest, CheckoutError> {
        let amount = cart
            .totals
            .total_minor_units()
            .filter(|a| *a >= MIN_UNIT_AMOUNT)
            .ok_or(PricingError::Overflow)?;
        let items = cart.items();

        Ok(PaymentIntentRequest {
            amount,
            currency: self.currency.to_string(),
            receipt_email: customer.email.to_string(),
            payment_method_types: self.payment_method_types.to_vec(),
            metadata: self.metadata(cart, customer, &items, Flow::PaymentIntent),
        })
    }

    fn metadata(
        &self,
        cart: &PricedCart,
        customer: &Customer<'_>,
        items: &[ValidatedItem],
        flow: Flow,
    ) -> Metadata {
        CheckoutMetadata {
            email: customer.email,
            totals: &cart.totals,
            items,
            shipping_address: customer.shipping_address,
            billing_address: customer.billing_address,
            flow,
        }
        .encode()
    }
}

/// Create a checkout session, retrying once with only the universal payment
/// method if the gateway rejected the payment method list.
///
/// # Errors
///
/// Returns the gateway error of the last attempt.
pub async fn submit_checkout_session<G: PaymentGateway>(
    gateway: &G,
    request: &CheckoutSessionRequest,
) -> Result<CheckoutSession, GatewayError> {
    match gateway.create_checkout_session(request).await {
        Err(err) if should_narrow(&err, &request.payment_method_types) => {
            warn!(error = %err, "Payment methods rejected, retrying with card only");
            let narrowed = CheckoutSessionRequest {
                payment_method_types: vec![UNIVERSAL_PAYMENT_METHOD.to_string()],
                ..request.clone()
            };
            let session = gateway.create_checkout_session(&narrowed).await?;
            info!(session_id = %session.id, "Checkout session created after narrowing");
            Ok(session)
        }
        result => result,
    }
}

/// Create a payment intent with the same narrowing policy as
/// [`submit_checkout_session`].
///
/// # Errors
///
/// Returns the gateway error of the last attempt.
pub async fn submit_payment_intent<G: PaymentGateway>(
    gateway: &G,
    request: &PaymentIntentRequest,
) -> Result<PaymentIntent, GatewayError> {
    match gateway.create_payment_intent(request).await {
        Err(err) if should_narrow(&err, &request.payment_method_types) => {
            warn!(error = %err, "Payment methods rejected, retrying with card only");
            let narrowed = PaymentIntentRequest {
                payment_method_types: vec![UNIVERSAL_PAYMENT_METHOD.to_string()],
                ..request.clone()
            };
            gateway.create_payment_intent(&narrowed).await
        }
        result => result,
    }
}

/// Retrying with an identical list would fail the same way.
fn should_narrow(err: &GatewayError, methods: &[String]) -> bool {
    err.is_payment_method_rejection() && methods != [UNIVERSAL_PAYMENT_METHOD]
}

/// Strip angle brackets and cut to `max` characters.
fn sanitize(text: &str, max: usize) -> String {
    text.chars()
        .filter(|c| !matches!(c, '<' | '>'))
        .take(max)
        .collect::<String>()
        .trim()
        .to_string()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use kestrel_core::{PricingRules, ProductId, Totals};
    use uuid::Uuid;

    use super::*;
    use crate::services::checkout::cart::PricedLine;
    use crate::services::checkout::catalog::ResolvedProduct;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn cart(lines: &[(&str, u32)]) -> PricedCart {
        let lines: Vec<PricedLine> = lines
            .iter()
            .enumerate()
            .map(|(i, (price, quantity))| PricedLine {
                product: ResolvedProduct {
                    id: ProductId::new(Uuid::from_u128(i as u128 + 1)),
                    name: format!("<b>Product {i}</b>"),
                    description: Some("x".repeat(600)),
                    unit_price: dec(price),
                    image_urls: (0..6).map(|n| format!("https://cdn.example.pl/{n}.webp")).collect(),
                },
                quantity: *quantity,
            })
            .collect();
        PricedCart::new(lines, &PricingRules::default()).unwrap()
    }

    fn builder(methods: &[String]) -> SessionBuilder<'_> {
        SessionBuilder {
            currency: "pln",
            payment_method_types: methods,
            vat_rate: PricingRules::default().vat_rate,
        }
    }

    fn methods() -> Vec<String> {
        vec!["card".to_string(), "blik".to_string(), "p24".to_string()]
    }

    #[test]
    fn test_line_items_sum_to_total() {
        let email = Email::parse("jan@example.pl").unwrap();
        let customer = Customer {
            email: &email,
            shipping_address: None,
            billing_address: None,
        };
        let cart = cart(&[("38.99", 1)]);
        let methods = methods();

        let request = builder(&methods)
            .checkout_session_request(&cart, &customer, "https://sklep.example.pl")
            .unwrap();

        let charged: i64 = request
            .line_items
            .iter()
            .map(|l| l.unit_amount * i64::from(l.quantity))
            .sum();
        assert_eq!(charged, 5395);
        assert_eq!(request.line_items.len(), 3);
        assert_eq!(request.line_items[1].name, "VAT 23%");
        assert_eq!(request.line_items[2].unit_amount, 599);
        assert_eq!(
            request.success_url,
            "https://sklep.example.pl/checkout/success?session_id={CHECKOUT_SESSION_ID}"
        );
        assert_eq!(request.cancel_url, "https://sklep.example.pl/cart");
        assert_eq!(request.metadata["flow"], "checkout_session");
        assert_eq!(request.payment_intent_metadata["flow"], "checkout_session");
    }

    #[test]
    fn test_product_text_is_sanitized() {
        let email = Email::parse("jan@example.pl").unwrap();
        let customer = Customer {
            email: &email,
            shipping_address: None,
            billing_address: None,
        };
        let cart = cart(&[("10.00", 4)]);
        let methods = methods();

        let request = builder(&methods)
            .checkout_session_request(&cart, &customer, "https://sklep.example.pl")
            .unwrap();
        let line = &request.line_items[0];

        assert_eq!(line.name, "bProduct 0/b");
        assert_eq!(line.description.as_ref().unwrap().chars().count(), MAX_DESCRIPTION_LEN);
        assert_eq!(line.images.len(), MAX_IMAGES);
    }

    #[test]
    fn test_zero_price_rejected() {
        let email = Email::parse("jan@example.pl").unwrap();
        let customer = Customer {
            email: &email,
            shipping_address: None,
            billing_address: None,
        };
        let cart = cart(&[("0.00", 1)]);
        let methods = methods();

        let err = builder(&methods)
            .checkout_session_request(&cart, &customer, "https://sklep.example.pl")
            .unwrap_err();
        assert!(matches!(err, CheckoutError::UnitAmountOutOfRange { .. }));
    }

    #[test]
    fn test_payment_intent_amount() {
        let email = Email::parse("jan@example.pl").unwrap();
        let customer = Customer {
            email: &email,
            shipping_address: None,
            billing_address: None,
        };
        let cart = cart(&[("25.00", 4)]);
        let methods = methods();

        let request = builder(&methods).payment_intent_request(&cart, &customer).unwrap();
        assert_eq!(request.amount, 12_300);
        assert_eq!(request.metadata["flow"], "payment_intent");
        assert_eq!(request.metadata["total"], "123.00");
        assert_eq!(cart.totals, Totals::from_subtotal(dec("100.00"), &PricingRules::default()).unwrap());
    }

    struct Gateway {
        errors: Mutex<Vec<GatewayError>>,
        calls: Mutex<Vec<Vec<String>>>,
    }

    impl Gateway {
        fn failing_with(errors: Vec<GatewayError>) -> Self {
            Self {
                errors: Mutex::new(errors),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    impl PaymentGateway for Gateway {
        async fn create_checkout_session(
            &self,
            request: &CheckoutSessionRequest,
        ) -> Result<CheckoutSession, GatewayError> {
            self.calls
                .lock()
                .unwrap()
                .push(request.payment_method_types.clone());
            match self.errors.lock().unwrap().pop() {
                Some(err) => Err(err),
                None => Ok(CheckoutSession {
                    id: "cs_test".to_string(),
                    url: Some("https://pay.example/cs_test".to_string()),
                }),
            }
        }

        async fn create_payment_intent(
            &self,
            _request: &PaymentIntentRequest,
        ) -> Result<PaymentIntent, GatewayError> {
            unreachable!("not used")
        }
    }

    fn method_rejection() -> GatewayError {
        GatewayError::InvalidRequest {
            param: Some("payment_method_types".to_string()),
            code: None,
            message: "The payment method type blik is invalid".to_string(),
        }
    }

    fn session_request() -> CheckoutSessionRequest {
        CheckoutSessionRequest {
            line_items: Vec::new(),
            currency: "pln".to_string(),
            customer_email: "jan@example.pl".to_string(),
            payment_method_types: methods(),
            success_url: String::new(),
            cancel_url: String::new(),
            metadata: Metadata::new(),
            payment_intent_metadata: Metadata::new(),
        }
    }

    #[tokio::test]
    async fn test_retry_narrows_once() {
        let gateway = Gateway::failing_with(vec![method_rejection()]);
        let session = submit_checkout_session(&gateway, &session_request())
            .await
            .unwrap();
        assert_eq!(session.id, "cs_test");
        assert_eq!(
            *gateway.calls.lock().unwrap(),
            vec![methods(), vec!["card".to_string()]]
        );
    }

    #[tokio::test]
    async fn test_retry_failure_propagates() {
        let gateway = Gateway::failing_with(vec![method_rejection(), method_rejection()]);
        let err = submit_checkout_session(&gateway, &session_request())
            .await
            .unwrap_err();
        assert!(err.is_payment_method_rejection());
        assert_eq!(gateway.calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_other_errors_not_retried() {
        let gateway = Gateway::failing_with(vec![GatewayError::Connection("reset".to_string())]);
        let err = submit_checkout_session(&gateway, &session_request())
            .await
            .unwrap_err();
        assert_eq!(err, GatewayError::Connection("reset".to_string()));
        assert_eq!(gateway.calls.lock().unwrap().len(), 1);
    }
}
