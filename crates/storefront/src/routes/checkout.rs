//! Checkout route handlers.
//!
//! Bodies are taken as raw bytes: the cart validator enforces the payload
//! ceiling before any JSON parsing happens. The router's body limit matches
//! that ceiling, and its rejections are reported as the same cart error.

use axum::{
    Json,
    body::Bytes,
    extract::{State, rejection::BytesRejection},
    http::{HeaderMap, StatusCode, header::CONTENT_LENGTH},
};
use tracing::{debug, instrument};

use kestrel_core::CartError;

use crate::db::ProductRepository;
use crate::error::{AppError, Result};
use crate::services::checkout::cart::CheckoutPreview;
use crate::services::checkout::origin::resolve_origin;
use crate::services::checkout::{Checkout, CheckoutError, IntentCreated, SessionCreated};
use crate::state::AppState;
use crate::storage::PublicBucket;

fn checkout<'a>(
    state: &'a AppState,
    products: &'a ProductRepository<'a>,
) -> Checkout<'a, ProductRepository<'a>, PublicBucket> {
    let config = state.config();
    Checkout::new(
        products,
        state.storage(),
        &config.cart_limits,
        &config.pricing,
        &config.payments,
    )
}

/// Map a body extraction failure onto the cart error the validator would give.
fn payload(
    state: &AppState,
    headers: &HeaderMap,
    body: std::result::Result<Bytes, BytesRejection>,
) -> Result<Bytes> {
    body.map_err(|rejection| {
        let config = state.config();
        let max = config.cart_limits.max_payload_bytes;
        debug!(status = %rejection.status(), "Checkout body rejected");
        let error = if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            let size = headers
                .get(CONTENT_LENGTH)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.parse().ok())
                .unwrap_or_else(|| max.saturating_add(1));
            CartError::PayloadTooLarge { size, max }
        } else {
            CartError::MalformedBody(rejection.body_text())
        };
        AppError::checkout(CheckoutError::Cart(error), config.environment)
    })
}

/// Price a cart for display.
#[instrument(skip_all)]
pub async fn preview(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: std::result::Result<Bytes, BytesRejection>,
) -> Result<Json<CheckoutPreview>> {
    let body = payload(&state, &headers, body)?;
    let products = state.products();
    checkout(&state, &products)
        .preview(&body)
        .await
        .map(Json)
        .map_err(|e| AppError::checkout(e, state.config().environment))
}

/// Create a hosted checkout session and return its redirect URL.
#[instrument(skip_all)]
pub async fn create_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: std::result::Result<Bytes, BytesRejection>,
) -> Result<Json<SessionCreated>> {
    let body = payload(&state, &headers, body)?;
    let config = state.config();
    let origin = resolve_origin(&headers, &config.base_url, config.environment);
    let products = state.products();

    checkout(&state, &products)
        .create_session(state.gateway(), &body, origin)
        .await
        .map(Json)
        .map_err(|e| AppError::checkout(e, config.environment))
}

/// Create a payment intent for an embedded payment form.
#[instrument(skip_all)]
pub async fn create_payment_intent(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: std::result::Result<Bytes, BytesRejection>,
) -> Result<Json<IntentCreated>> {
    let body = payload(&state, &headers, body)?;
    let products = state.products();
    checkout(&state, &products)
        .create_payment_intent(state.gateway(), &body)
        .await
        .map(Json)
        .map_err(|e| AppError::checkout(e, state.config().environment))
}
