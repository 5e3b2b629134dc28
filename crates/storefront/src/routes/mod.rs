//! HTTP route handlers for storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                        - Liveness
//! GET  /health/ready                  - Readiness (database round-trip)
//!
//! # Checkout (JSON)
//! POST /api/checkout/preview          - Priced cart, no gateway call
//! POST /api/checkout/session          - Hosted checkout session
//! POST /api/checkout/payment-intent   - Embedded payment intent
//!
//! # Webhooks
//! POST /api/webhooks/payments         - Signed gateway events
//! ```

pub mod checkout;
pub mod health;
pub mod webhooks;

use std::time::Duration;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{Request, Response},
    middleware::from_fn,
    routing::{get, post},
};
use tower_http::trace::{DefaultOnResponse, OnResponse, TraceLayer};
use tracing::Span;

use crate::error::AppError;
use crate::middleware::{request_id_middleware, security_headers_middleware};
use crate::state::AppState;

/// Create the checkout API router.
///
/// Bodies are capped at `max_payload_bytes` rather than axum's default.
pub fn checkout_routes(max_payload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/preview", post(checkout::preview))
        .route("/session", post(checkout::create_session))
        .route("/payment-intent", post(checkout::create_payment_intent))
        .layer(DefaultBodyLimit::max(max_payload_bytes))
}

/// Create the webhook router.
pub fn webhook_routes() -> Router<AppState> {
    Router::new().route("/payments", post(webhooks::payments))
}

/// Create all routes for the storefront.
pub fn routes(state: &AppState) -> Router<AppState> {
    let max_payload_bytes = state.config().cart_limits.max_payload_bytes;
    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .nest("/api/checkout", checkout_routes(max_payload_bytes))
        .nest("/api/webhooks", webhook_routes())
        .fallback(not_found)
}

/// Full application with middleware, ready to serve.
///
/// Sentry layers are added by the binary so tests can run without a client.
pub fn app(state: AppState) -> Router {
    routes(&state)
        .layer(from_fn(security_headers_middleware))
        .layer(from_fn(request_id_middleware))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        uri = %request.uri(),
                        request_id = tracing::field::Empty,
                        status = tracing::field::Empty,
                        latency_ms = tracing::field::Empty,
                    )
                })
                .on_response(|response: &Response<_>, latency: Duration, span: &Span| {
                    span.record("status", response.status().as_u16());
                    span.record(
                        "latency_ms",
                        u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
                    );
                    DefaultOnResponse::default().on_response(response, latency, span);
                }),
        )
        .with_state(state)
}

async fn not_found() -> AppError {
    AppError::NotFound("route".to_string())
}
