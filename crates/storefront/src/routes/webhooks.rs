//! Payment gateway webhook receiver.

use axum::{Json, body::Bytes, extract::State, http::HeaderMap};
use tracing::{instrument, warn};

use crate::error::Result;
use crate::services::checkout::webhook::{WebhookAck, WebhookError, WebhookProcessor};
use crate::state::AppState;
use crate::stripe::SIGNATURE_HEADER;

/// Receive a payment event.
///
/// The body must stay byte-for-byte as sent; the signature covers it.
#[instrument(skip_all)]
pub async fn payments(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    let orders = state.orders();
    let carts = state.carts();
    let processor = WebhookProcessor {
        verifier: state.verifier(),
        orders: &orders,
        carts: &carts,
        rules: &state.config().pricing,
    };

    let ack = processor
        .handle(&body, signature)
        .await
        .inspect_err(|e| {
            if let WebhookError::Signature(reason) = e {
                warn!(%reason, "Webhook signature rejected");
            }
        })?;

    Ok(Json(ack))
}
