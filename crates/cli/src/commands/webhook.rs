//! Webhook testing helpers.
//!
//! ```bash
//! kestrel-cli webhook sign --payload event.json > sig.txt
//! curl -X POST localhost:3000/api/webhooks/payments \
//!     -H "stripe-signature: $(cat sig.txt)" --data-binary @event.json
//! ```

use std::path::Path;

use chrono::Utc;
use thiserror::Error;

use kestrel_storefront::stripe::{SignatureError, signature};

#[derive(Debug, Error)]
pub enum WebhookCommandError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Failed to read payload: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Signature(#[from] SignatureError),
}

/// Print the signature header for the payload in `payload`.
///
/// # Errors
///
/// Returns `WebhookCommandError` if no secret is available, the file is
/// unreadable, or the secret is malformed.
pub async fn sign(
    payload: &Path,
    secret: Option<String>,
    timestamp: Option<i64>,
) -> Result<(), WebhookCommandError> {
    dotenvy::dotenv().ok();
    let secret = secret
        .or_else(|| std::env::var("PAYMENT_WEBHOOK_SECRET").ok())
        .ok_or(WebhookCommandError::MissingEnvVar("PAYMENT_WEBHOOK_SECRET"))?;

    // Signed byte-for-byte: no trimming or re-encoding
    let body = tokio::fs::read(payload).await?;
    let timestamp = timestamp.unwrap_or_else(|| Utc::now().timestamp());
    let header = signature::sign(&secret, timestamp, &body)?;

    #[allow(clippy::print_stdout)]
    {
        println!("{header}");
    }
    Ok(())
}
