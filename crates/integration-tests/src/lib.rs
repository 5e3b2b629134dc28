//! Integration test support for the Kestrel checkout pipeline.
//!
//! In-memory implementations of every collaborator the pipeline talks to,
//! plus fixtures for products, configuration and signed webhook deliveries.
//! No database or network access is needed.
//!
//! # Fakes
//!
//! - [`InMemoryCatalog`] - counts lookups so tests can assert a single query
//! - [`InMemoryOrders`] - enforces external-ID uniqueness inside `insert`,
//!   the way the unique index does
//! - [`InMemoryCarts`] - saved carts keyed by email, with injectable failure
//! - [`ScriptedGateway`] - replays queued results and records every request

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use rust_decimal::Decimal;
use secrecy::SecretString;
use serde_json::{Value, json};
use url::Url;
use uuid::Uuid;

use kestrel_core::{Email, OrderId, OrderStatus, ProductId, Totals};
use kestrel_storefront::config::PaymentConfig;
use kestrel_storefront::db::{CartStore, CatalogStore, OrderStore, RepositoryError};
use kestrel_storefront::models::{InsertOutcome, NewOrder, Order, Product};
use kestrel_storefront::storage::PublicBucket;
use kestrel_storefront::stripe::{
    CheckoutSession, CheckoutSessionRequest, GatewayError, PaymentGateway, PaymentIntent,
    PaymentIntentRequest, WebhookVerifier, signature,
};

/// Webhook signing secret used by every fixture.
pub const WEBHOOK_SECRET: &str = "whsec_integration_tests";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn unavailable() -> RepositoryError {
    RepositoryError::Database(sqlx::Error::PoolTimedOut)
}

// =============================================================================
// Catalog
// =============================================================================

/// Product catalog held in memory.
#[derive(Default)]
pub struct InMemoryCatalog {
    products: Mutex<HashMap<ProductId, Product>>,
    lookups: AtomicUsize,
}

impl InMemoryCatalog {
    #[must_use]
    pub fn new(products: impl IntoIterator<Item = Product>) -> Self {
        Self {
            products: Mutex::new(products.into_iter().map(|p| (p.id, p)).collect()),
            lookups: AtomicUsize::new(0),
        }
    }

    /// Number of `find_by_ids` calls so far.
    #[must_use]
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    /// Change a product's price, as an admin edit would.
    pub fn set_price(&self, id: ProductId, price: Decimal) {
        if let Some(product) = lock(&self.products).get_mut(&id) {
            product.price = price;
            product.updated_at = Utc::now();
        }
    }
}

impl CatalogStore for InMemoryCatalog {
    async fn find_by_ids(&self, ids: &[ProductId]) -> Result<Vec<Product>, RepositoryError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let products = lock(&self.products);
        Ok(ids.iter().filter_map(|id| products.get(id).cloned()).collect())
    }
}

// =============================================================================
// Orders
// =============================================================================

/// Orders held in memory, unique on external ID.
#[derive(Default)]
pub struct InMemoryOrders {
    orders: Mutex<Vec<Order>>,
    fail_writes: AtomicBool,
}

impl InMemoryOrders {
    /// Snapshot of every stored order.
    #[must_use]
    pub fn all(&self) -> Vec<Order> {
        lock(&self.orders).clone()
    }

    /// The single order for `external_id`, if any.
    #[must_use]
    pub fn get(&self, external_id: &str) -> Option<Order> {
        lock(&self.orders)
            .iter()
            .find(|o| o.external_id == external_id)
            .cloned()
    }

    /// Store an order directly, bypassing the pipeline.
    pub fn seed(&self, external_id: &str, status: OrderStatus) -> OrderId {
        let id = OrderId::generate();
        let now = Utc::now();
        lock(&self.orders).push(Order {
            id,
            external_id: external_id.to_string(),
            email: None,
            totals: Totals::ZERO,
            shipping_address: None,
            billing_address: None,
            status,
            created_at: now,
            updated_at: now,
        });
        id
    }

    /// Make every subsequent insert and update fail.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

impl OrderStore for InMemoryOrders {
    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<Order>, RepositoryError> {
        // Let concurrent deliveries interleave between lookup and insert
        tokio::task::yield_now().await;
        Ok(self.get(external_id))
    }

    async fn insert(&self, order: &NewOrder) -> Result<InsertOutcome, RepositoryError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        let mut orders = lock(&self.orders);
        if orders.iter().any(|o| o.external_id == order.external_id) {
            return Ok(InsertOutcome::AlreadyExists);
        }

        let id = OrderId::generate();
        let now = Utc::now();
        orders.push(Order {
            id,
            external_id: order.external_id.clone(),
            email: order.email.clone(),
            totals: order.totals,
            shipping_address: order.shipping_address.clone(),
            billing_address: order.billing_address.clone(),
            status: order.status,
            created_at: now,
            updated_at: now,
        });
        Ok(InsertOutcome::Created(id))
    }

    async fn update_status(
        &self,
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<bool, RepositoryError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        let mut orders = lock(&self.orders);
        match orders.iter_mut().find(|o| o.id == id && o.status == from) {
            Some(order) => {
                order.status = to;
                order.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

// =============================================================================
// Carts
// =============================================================================

/// Saved carts held in memory: owner email to line count.
#[derive(Default)]
pub struct InMemoryCarts {
    lines: Mutex<HashMap<String, u64>>,
    fail_deletes: AtomicBool,
}

impl InMemoryCarts {
    /// Give `email` a saved cart with `lines` rows.
    pub fn save(&self, email: &str, lines: u64) {
        lock(&self.lines).insert(email.to_string(), lines);
    }

    /// Saved rows for `email`.
    #[must_use]
    pub fn lines(&self, email: &str) -> u64 {
        lock(&self.lines).get(email).copied().unwrap_or(0)
    }

    /// Make every subsequent delete fail.
    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }
}

impl CartStore for InMemoryCarts {
    async fn delete_by_owner(&self, owner: &Email) -> Result<u64, RepositoryError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        Ok(lock(&self.lines).remove(owner.as_str()).unwrap_or(0))
    }
}

// =============================================================================
// Gateway
// =============================================================================

/// Gateway fake that replays queued results.
///
/// When a queue is empty the call succeeds with a generated ID.
#[derive(Default)]
pub struct ScriptedGateway {
    session_results: Mutex<VecDeque<Result<CheckoutSession, GatewayError>>>,
    intent_results: Mutex<VecDeque<Result<PaymentIntent, GatewayError>>>,
    session_requests: Mutex<Vec<CheckoutSessionRequest>>,
    intent_requests: Mutex<Vec<PaymentIntentRequest>>,
}

impl ScriptedGateway {
    /// Queue the result of the next session call.
    pub fn push_session(&self, result: Result<CheckoutSession, GatewayError>) {
        lock(&self.session_results).push_back(result);
    }

    /// Queue the result of the next intent call.
    pub fn push_intent(&self, result: Result<PaymentIntent, GatewayError>) {
        lock(&self.intent_results).push_back(result);
    }

    /// Every session request received, in order.
    #[must_use]
    pub fn session_requests(&self) -> Vec<CheckoutSessionRequest> {
        lock(&self.session_requests).clone()
    }

    /// Every intent request received, in order.
    #[must_use]
    pub fn intent_requests(&self) -> Vec<PaymentIntentRequest> {
        lock(&self.intent_requests).clone()
    }
}

impl PaymentGateway for ScriptedGateway {
    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession, GatewayError> {
        let n = {
            let mut requests = lock(&self.session_requests);
            requests.push(request.clone());
            requests.len()
        };
        lock(&self.session_results).pop_front().unwrap_or_else(|| {
            Ok(CheckoutSession {
                id: format!("cs_test_{n}"),
                url: Some(format!("https://pay.example.com/c/cs_test_{n}")),
            })
        })
    }

    async fn create_payment_intent(
        &self,
        request: &PaymentIntentRequest,
    ) -> Result<PaymentIntent, GatewayError> {
        let n = {
            let mut requests = lock(&self.intent_requests);
            requests.push(request.clone());
            requests.len()
        };
        lock(&self.intent_results).pop_front().unwrap_or_else(|| {
            Ok(PaymentIntent {
                id: format!("pi_test_{n}"),
                client_secret: Some(format!("pi_test_{n}_secret_abc")),
                amount: request.amount,
                currency: request.currency.clone(),
            })
        })
    }
}

/// A gateway rejection naming the payment method list.
#[must_use]
pub fn payment_method_rejection() -> GatewayError {
    GatewayError::InvalidRequest {
        param: Some("payment_method_types".to_string()),
        code: Some("parameter_invalid".to_string()),
        message: "The payment method type \"blik\" is invalid.".to_string(),
    }
}

// =============================================================================
// Fixtures
// =============================================================================

/// Deterministic version 4 product ID.
#[must_use]
pub const fn product_id(n: u16) -> ProductId {
    ProductId::new(Uuid::from_u128(0x3f25_04e0_4f89_41d3_9a0c_0305_e82c_0000 | n as u128))
}

/// An active, in-stock product.
///
/// # Panics
///
/// Panics if `price` is not a decimal literal.
#[must_use]
#[allow(clippy::unwrap_used)]
pub fn product(n: u16, price: &str) -> Product {
    Product {
        id: product_id(n),
        name: format!("Product {n}"),
        description: Some(format!("Description of product {n}")),
        price: price.parse().unwrap(),
        in_stock: true,
        is_active: true,
        category: None,
        image_keys: vec![format!("products/{n}.webp")],
        updated_at: Utc::now(),
    }
}

/// Payment settings with a full method list.
///
/// # Panics
///
/// Never; the URL is a literal.
#[must_use]
#[allow(clippy::unwrap_used)]
pub fn payment_config() -> PaymentConfig {
    PaymentConfig {
        secret_key: Some(SecretString::from("sk_test_integration")),
        webhook_secret: Some(SecretString::from(WEBHOOK_SECRET)),
        api_base: Url::parse("https://api.stripe.com").unwrap(),
        api_version: None,
        currency: "pln".to_string(),
        method_types: vec!["card".to_string(), "blik".to_string(), "p24".to_string()],
        webhook_tolerance_secs: 300,
    }
}

/// Public storage rooted at a CDN.
///
/// # Panics
///
/// Never; the URL is a literal.
#[must_use]
#[allow(clippy::unwrap_used)]
pub fn storage() -> PublicBucket {
    PublicBucket::new(Url::parse("https://cdn.example.pl/media/").unwrap())
}

/// Verifier for [`WEBHOOK_SECRET`].
#[must_use]
pub fn verifier() -> WebhookVerifier {
    WebhookVerifier::new(Some(SecretString::from(WEBHOOK_SECRET)), 300)
}

/// Signature header for `payload`, timestamped now.
///
/// # Panics
///
/// Never; [`WEBHOOK_SECRET`] is well-formed.
#[must_use]
#[allow(clippy::unwrap_used)]
pub fn sign(payload: &str) -> String {
    signature::sign(WEBHOOK_SECRET, Utc::now().timestamp(), payload.as_bytes()).unwrap()
}

/// A gateway event envelope.
#[must_use]
pub fn event(event_type: &str, object: Value) -> String {
    json!({
        "id": format!("evt_{}", Uuid::new_v4().simple()),
        "type": event_type,
        "data": { "object": object },
    })
    .to_string()
}

/// Checkout request body.
#[must_use]
pub fn cart_body(items: &[(ProductId, u32)], email: Option<&str>) -> Vec<u8> {
    let items: Vec<Value> = items
        .iter()
        .map(|(id, quantity)| json!({ "productId": id, "quantity": quantity }))
        .collect();
    let mut body = json!({ "items": items });
    if let Some(email) = email {
        body["email"] = json!(email);
    }
    body.to_string().into_bytes()
}
