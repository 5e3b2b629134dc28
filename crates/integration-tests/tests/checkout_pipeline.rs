//! End-to-end checkout tests: raw body in, gateway request out.

#![allow(clippy::unwrap_used)]

use rust_decimal::Decimal;
use serde_json::json;

use kestrel_core::{CartError, CartLimits, PricingRules, ProductId, Totals};
use kestrel_integration_tests::{
    InMemoryCatalog, ScriptedGateway, cart_body, payment_config, payment_method_rejection,
    product, product_id, storage,
};
use kestrel_storefront::config::PaymentConfig;
use kestrel_storefront::services::checkout::metadata::{DecodedMetadata, Flow};
use kestrel_storefront::services::checkout::origin::OriginError;
use kestrel_storefront::services::checkout::{Checkout, CheckoutError};
use kestrel_storefront::storage::PublicBucket;
use kestrel_storefront::stripe::{GatewayConfigError, GatewayError};

const ORIGIN: &str = "https://shop.example.pl";
const EMAIL: &str = "  Anna.Nowak@Example.PL ";

struct Harness {
    catalog: InMemoryCatalog,
    storage: PublicBucket,
    limits: CartLimits,
    rules: PricingRules,
    payments: PaymentConfig,
    gateway: ScriptedGateway,
}

impl Harness {
    fn new(products: impl IntoIterator<Item = kestrel_storefront::models::Product>) -> Self {
        Self {
            catalog: InMemoryCatalog::new(products),
            storage: storage(),
            limits: CartLimits::default(),
            rules: PricingRules::default(),
            payments: payment_config(),
            gateway: ScriptedGateway::default(),
        }
    }

    fn checkout(&self) -> Checkout<'_, InMemoryCatalog, PublicBucket> {
        Checkout::new(
            &self.catalog,
            &self.storage,
            &self.limits,
            &self.rules,
            &self.payments,
        )
    }

    async fn session(&self, body: &[u8]) -> Result<String, CheckoutError> {
        self.checkout()
            .create_session(Ok(&self.gateway), body, Ok(ORIGIN.to_string()))
            .await
            .map(|created| created.session_id)
    }
}

fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

// =============================================================================
// Validation before any I/O
// =============================================================================

#[tokio::test]
async fn test_invalid_product_id_never_reaches_catalog() {
    let harness = Harness::new([product(1, "10.00")]);
    let body = json!({ "items": [{ "productId": "not-a-uuid", "quantity": 1 }], "email": EMAIL });

    let err = harness
        .session(body.to_string().as_bytes())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        CheckoutError::Cart(CartError::InvalidProductId { index: 0 })
    ));
    assert_eq!(harness.catalog.lookups(), 0);
    assert!(harness.gateway.session_requests().is_empty());
}

#[tokio::test]
async fn test_oversized_payload_rejected_before_parsing() {
    let mut harness = Harness::new([product(1, "10.00")]);
    harness.limits.max_payload_bytes = 64;
    let body = cart_body(&[(product_id(1), 1)], Some(&"a".repeat(100)));

    let err = harness.session(&body).await.unwrap_err();

    assert!(matches!(
        err,
        CheckoutError::Cart(CartError::PayloadTooLarge { max: 64, .. })
    ));
    assert_eq!(harness.catalog.lookups(), 0);
}

#[tokio::test]
async fn test_missing_email_fails_before_catalog() {
    let harness = Harness::new([product(1, "10.00")]);

    let err = harness
        .session(&cart_body(&[(product_id(1), 1)], None))
        .await
        .unwrap_err();

    assert!(matches!(err, CheckoutError::Cart(CartError::MissingEmail)));
    assert_eq!(harness.catalog.lookups(), 0);
}

// =============================================================================
// Catalog resolution
// =============================================================================

#[tokio::test]
async fn test_missing_product_names_only_missing_id() {
    let harness = Harness::new([product(1, "10.00")]);
    let ghost = ProductId::new(uuid::Uuid::new_v4());

    let err = harness
        .session(&cart_body(&[(product_id(1), 1), (ghost, 2)], Some(EMAIL)))
        .await
        .unwrap_err();

    match err {
        CheckoutError::ProductsUnavailable { missing } => assert_eq!(missing, vec![ghost]),
        other => panic!("expected ProductsUnavailable, got {other:?}"),
    }
    assert_eq!(harness.catalog.lookups(), 1);
    assert!(harness.gateway.session_requests().is_empty());
}

#[tokio::test]
async fn test_out_of_stock_product_is_unavailable() {
    let mut sold_out = product(2, "49.00");
    sold_out.in_stock = false;
    let harness = Harness::new([product(1, "10.00"), sold_out]);

    let err = harness
        .session(&cart_body(&[(product_id(1), 1), (product_id(2), 1)], Some(EMAIL)))
        .await
        .unwrap_err();

    assert!(matches!(err, CheckoutError::ProductsUnavailable { missing } if missing == vec![product_id(2)]));
}

#[tokio::test]
async fn test_client_prices_are_ignored() {
    let harness = Harness::new([product(1, "10.00")]);
    let body = json!({
        "items": [{ "productId": product_id(1), "quantity": 2, "price": 0.01, "unitPrice": 0.01 }],
        "email": EMAIL
    });

    harness.session(body.to_string().as_bytes()).await.unwrap();

    let request = &harness.gateway.session_requests()[0];
    assert_eq!(request.line_items[0].unit_amount, 1000);
}

// =============================================================================
// Session request
// =============================================================================

#[tokio::test]
async fn test_session_request_charges_exact_total() {
    let harness = Harness::new([product(1, "12.99"), product(2, "3.33")]);
    let body = cart_body(&[(product_id(1), 1), (product_id(2), 3)], Some(EMAIL));

    let session_id = harness.session(&body).await.unwrap();
    assert_eq!(session_id, "cs_test_1");

    let request = &harness.gateway.session_requests()[0];
    let charged: i64 = request
        .line_items
        .iter()
        .map(|line| line.unit_amount * i64::from(line.quantity))
        .sum();

    // 22.98 + 5.29 VAT + 5.99 shipping
    assert_eq!(charged, 3426);
    assert_eq!(request.customer_email, "anna.nowak@example.pl");
    assert_eq!(request.currency, "pln");
    assert_eq!(
        request.success_url,
        "https://shop.example.pl/checkout/success?session_id={CHECKOUT_SESSION_ID}"
    );
    assert_eq!(request.cancel_url, "https://shop.example.pl/cart");
    let image = request.line_items[0].images[0].as_str();
    assert!(image.starts_with("https://cdn.example.pl/media/products/1.webp?v="));
}

#[tokio::test]
async fn test_session_metadata_round_trips() {
    let harness = Harness::new([product(1, "20.00")]);
    let body = json!({
        "items": [{ "productId": product_id(1), "quantity": 2 }],
        "email": EMAIL,
        "shippingAddress": { "line1": "ul. Długa 1", "city": "Gdańsk", "postal_code": "80-827" }
    });

    harness.session(body.to_string().as_bytes()).await.unwrap();

    let request = &harness.gateway.session_requests()[0];
    let decoded = DecodedMetadata::decode(&request.metadata);
    assert_eq!(decoded.email.as_deref(), Some("anna.nowak@example.pl"));
    assert_eq!(decoded.subtotal, Some(dec("40.00")));
    assert_eq!(decoded.total, Some(dec("49.20")));
    assert_eq!(decoded.flow, Some(Flow::CheckoutSession));
    assert_eq!(decoded.items.unwrap()[0].quantity, 2);
    assert_eq!(decoded.shipping_address.unwrap()["city"], "Gdańsk");
    assert_eq!(
        request.payment_intent_metadata.get("flow").map(String::as_str),
        Some("checkout_session")
    );
}

#[tokio::test]
async fn test_gateway_config_error_surfaces_after_validation() {
    let harness = Harness::new([product(1, "10.00")]);

    // Invalid carts still report the cart problem first
    let err = harness
        .checkout()
        .create_session::<ScriptedGateway>(
            Err(GatewayConfigError::MissingSecretKey),
            b"{\"items\": []}",
            Ok(ORIGIN.to_string()),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CheckoutError::Cart(CartError::Empty)));

    let err = harness
        .checkout()
        .create_session::<ScriptedGateway>(
            Err(GatewayConfigError::MissingSecretKey),
            &cart_body(&[(product_id(1), 1)], Some(EMAIL)),
            Ok(ORIGIN.to_string()),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CheckoutError::GatewayConfig(GatewayConfigError::MissingSecretKey)
    ));
}

#[tokio::test]
async fn test_insecure_origin_rejected() {
    let harness = Harness::new([product(1, "10.00")]);

    let err = harness
        .checkout()
        .create_session(
            Ok(&harness.gateway),
            &cart_body(&[(product_id(1), 1)], Some(EMAIL)),
            Err(OriginError::Insecure("http://shop.example.pl".to_string())),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, CheckoutError::Origin(_)));
    assert!(harness.gateway.session_requests().is_empty());
}

#[tokio::test]
async fn test_subtotal_ceiling_blocks_gateway_call() {
    let harness = Harness::new([product(1, "99999.99")]);

    let err = harness
        .session(&cart_body(&[(product_id(1), 2)], Some(EMAIL)))
        .await
        .unwrap_err();

    assert!(matches!(err, CheckoutError::Pricing(_)));
    assert!(harness.gateway.session_requests().is_empty());
}

// =============================================================================
// Retry narrowing
// =============================================================================

#[tokio::test]
async fn test_payment_method_rejection_retries_once_with_card() {
    let harness = Harness::new([product(1, "10.00")]);
    harness.gateway.push_session(Err(payment_method_rejection()));

    harness
        .session(&cart_body(&[(product_id(1), 1)], Some(EMAIL)))
        .await
        .unwrap();

    let requests = harness.gateway.session_requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].payment_method_types, vec!["card", "blik", "p24"]);
    assert_eq!(requests[1].payment_method_types, vec!["card"]);
    assert_eq!(requests[0].line_items, requests[1].line_items);
    assert_eq!(requests[0].metadata, requests[1].metadata);
}

#[tokio::test]
async fn test_second_rejection_is_not_retried_again() {
    let harness = Harness::new([product(1, "10.00")]);
    harness.gateway.push_session(Err(payment_method_rejection()));
    harness.gateway.push_session(Err(payment_method_rejection()));

    let err = harness
        .session(&cart_body(&[(product_id(1), 1)], Some(EMAIL)))
        .await
        .unwrap_err();

    assert!(matches!(err, CheckoutError::Gateway(GatewayError::InvalidRequest { .. })));
    assert_eq!(harness.gateway.session_requests().len(), 2);
}

#[tokio::test]
async fn test_other_gateway_errors_are_not_retried() {
    let errors = [
        GatewayError::Authentication("bad key".to_string()),
        GatewayError::Connection("timeout".to_string()),
        GatewayError::Transient {
            status: 503,
            message: "busy".to_string(),
        },
        GatewayError::InvalidRequest {
            param: Some("line_items[0][price_data][unit_amount]".to_string()),
            code: None,
            message: "Invalid integer".to_string(),
        },
    ];

    for error in errors {
        let harness = Harness::new([product(1, "10.00")]);
        harness.gateway.push_session(Err(error.clone()));

        let err = harness
            .session(&cart_body(&[(product_id(1), 1)], Some(EMAIL)))
            .await
            .unwrap_err();

        assert!(matches!(err, CheckoutError::Gateway(ref e) if *e == error));
        assert_eq!(harness.gateway.session_requests().len(), 1, "{error}");
    }
}

#[tokio::test]
async fn test_intent_retry_narrowing() {
    let harness = Harness::new([product(1, "10.00")]);
    harness.gateway.push_intent(Err(payment_method_rejection()));

    let created = harness
        .checkout()
        .create_payment_intent(Ok(&harness.gateway), &cart_body(&[(product_id(1), 1)], Some(EMAIL)))
        .await
        .unwrap();

    let requests = harness.gateway.intent_requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].payment_method_types, vec!["card"]);
    // 10.00 + 2.30 VAT + 5.99 shipping
    assert_eq!(created.amount, 1829);
    assert_eq!(created.currency, "pln");
    assert_eq!(created.payment_intent_id, "pi_test_2");
}

// =============================================================================
// Pricing determinism across call sites
// =============================================================================

#[tokio::test]
async fn test_preview_session_and_intent_agree() {
    let harness = Harness::new([product(1, "7.49"), product(2, "0.99")]);
    let body = cart_body(&[(product_id(1), 3), (product_id(2), 7)], Some(EMAIL));

    let preview = harness.checkout().preview(&body).await.unwrap();
    harness.session(&body).await.unwrap();
    let intent = harness
        .checkout()
        .create_payment_intent(Ok(&harness.gateway), &body)
        .await
        .unwrap();

    let session_meta = DecodedMetadata::decode(&harness.gateway.session_requests()[0].metadata);
    let intent_meta = DecodedMetadata::decode(&harness.gateway.intent_requests()[0].metadata);

    // 22.47 + 6.93 = 29.40 subtotal
    let expected = Totals::from_subtotal(dec("29.40"), &PricingRules::default()).unwrap();
    assert_eq!(preview.totals, expected);
    assert_eq!(session_meta.subtotal, Some(expected.subtotal));
    assert_eq!(session_meta.total, Some(expected.total));
    assert_eq!(intent_meta.total, Some(expected.total));
    assert_eq!(Some(intent.amount), expected.total_minor_units());
    assert_eq!(intent_meta.flow, Some(Flow::PaymentIntent));
}

#[tokio::test]
async fn test_price_change_is_picked_up_immediately() {
    let harness = Harness::new([product(1, "10.00")]);
    let body = cart_body(&[(product_id(1), 1)], None);

    let before = harness.checkout().preview(&body).await.unwrap();
    harness.catalog.set_price(product_id(1), dec("12.00"));
    let after = harness.checkout().preview(&body).await.unwrap();

    assert_eq!(before.totals.subtotal, dec("10.00"));
    assert_eq!(after.totals.subtotal, dec("12.00"));
    assert_eq!(harness.catalog.lookups(), 2);
}
