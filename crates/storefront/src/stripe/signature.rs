//! Webhook signature verification.
//!
//! The gateway signs every delivery with a header of the form
//! `t=<unix seconds>,v1=<hex hmac>[,v1=<hex hmac>...]` where each `v1` is
//! `HMAC-SHA256(secret, "{t}.{raw body}")`. Several `v1` entries appear while
//! a signing secret is being rolled; any one matching is enough.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use thiserror::Error;
use tracing::{debug, instrument};

/// Header carrying the webhook signature.
pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// Shortest header that can hold a timestamp and one SHA-256 signature.
const MIN_HEADER_LEN: usize = "t=0,v1=".len() + 64;

/// Prefix every webhook signing secret starts with.
const SECRET_PREFIX: &str = "whsec_";

/// Why a webhook delivery was not accepted as authentic.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("missing signature header")]
    MissingHeader,

    #[error("signature header too short")]
    HeaderTooShort,

    #[error("webhook signing secret is not configured")]
    MissingSecret,

    #[error("webhook signing secret is malformed")]
    MalformedSecret,

    #[error("signature header is malformed")]
    MalformedHeader,

    #[error("signature timestamp outside tolerance ({age}s old)")]
    TimestampOutOfTolerance { age: i64 },

    #[error("no signature matches the payload")]
    Mismatch,
}

/// Verifies webhook deliveries against the shared signing secret.
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: Option<SecretString>,
    tolerance_secs: i64,
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier")
            .field("secret", &self.secret.as_ref().map(|_| "[REDACTED]"))
            .field("tolerance_secs", &self.tolerance_secs)
            .finish()
    }
}

impl WebhookVerifier {
    /// Create a verifier. A missing secret is only reported at verify time.
    #[must_use]
    pub const fn new(secret: Option<SecretString>, tolerance_secs: i64) -> Self {
        Self {
            secret,
            tolerance_secs,
        }
    }

    /// Verify `payload` against `header` at the current time.
    ///
    /// # Errors
    ///
    /// Returns `SignatureError` if the delivery is not authentic.
    pub fn verify(&self, payload: &[u8], header: Option<&str>) -> Result<(), SignatureError> {
        self.verify_at(payload, header, chrono::Utc::now().timestamp())
    }

    /// Verify `payload` against `header` as if the current time were `now`.
    ///
    /// Checks run cheapest first: header shape, secret, replay window, HMAC.
    ///
    /// # Errors
    ///
    /// Returns `SignatureError` if the delivery is not authentic.
    #[instrument(skip(self, payload, header))]
    pub fn verify_at(
        &self,
        payload: &[u8],
        header: Option<&str>,
        now: i64,
    ) -> Result<(), SignatureError> {
        let header = header.ok_or(SignatureError::MissingHeader)?;
        if header.len() < MIN_HEADER_LEN {
            return Err(SignatureError::HeaderTooShort);
        }

        let secret = self.secret.as_ref().ok_or(SignatureError::MissingSecret)?;
        let secret = secret.expose_secret();
        if !secret.starts_with(SECRET_PREFIX) || secret.len() <= SECRET_PREFIX.len() {
            return Err(SignatureError::MalformedSecret);
        }

        let parsed = parse_header(header)?;

        let age = now - parsed.timestamp;
        if age.abs() > self.tolerance_secs {
            return Err(SignatureError::TimestampOutOfTolerance { age });
        }

        let expected = compute_signature(secret, parsed.timestamp, payload)?;
        if !parsed
            .signatures
            .iter()
            .any(|candidate| constant_time_compare(&expected, candidate))
        {
            return Err(SignatureError::Mismatch);
        }

        debug!("Webhook signature verified");
        Ok(())
    }
}

/// Build a signature header for `payload`, as the gateway would.
///
/// # Errors
///
/// Returns `SignatureError::MalformedSecret` if the secret cannot key an HMAC.
pub fn sign(secret: &str, timestamp: i64, payload: &[u8]) -> Result<String, SignatureError> {
    let signature = compute_signature(secret, timestamp, payload)?;
    Ok(format!("t={timestamp},v1={signature}"))
}

struct ParsedHeader<'a> {
    timestamp: i64,
    signatures: Vec<&'a str>,
}

fn parse_header(header: &str) -> Result<ParsedHeader<'_>, SignatureError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => {
                timestamp = Some(
                    value
                        .parse::<i64>()
                        .map_err(|_| SignatureError::MalformedHeader)?,
                );
            }
            "v1" => signatures.push(value),
            // v0 and future schemes are ignored
            _ => {}
        }
    }

    match timestamp {
        Some(timestamp) if !signatures.is_empty() => Ok(ParsedHeader {
            timestamp,
            signatures,
        }),
        _ => Err(SignatureError::MalformedHeader),
    }
}

fn compute_signature(secret: &str, timestamp: i64, payload: &[u8]) -> Result<String, SignatureError> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|_| SignatureError::MalformedSecret)?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time string comparison to prevent timing attacks.
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result: u8 = 0;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }

    result == 0
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_signing_secret";
    const NOW: i64 = 1_760_000_000;
    const BODY: &[u8] = br#"{"id":"evt_1","type":"checkout.session.completed"}"#;

    fn verifier() -> WebhookVerifier {
        WebhookVerifier::new(Some(SecretString::from(SECRET.to_string())), 300)
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare("hello", "hello"));
        assert!(!constant_time_compare("hello", "world"));
        assert!(!constant_time_compare("hello", "hell"));
    }

    #[test]
    fn test_valid_signature() {
        let header = sign(SECRET, NOW, BODY).unwrap();
        assert!(verifier().verify_at(BODY, Some(&header), NOW + 10).is_ok());
    }

    #[test]
    fn test_any_matching_v1_accepted() {
        let good = sign(SECRET, NOW, BODY).unwrap();
        let sig = good.split_once("v1=").unwrap().1;
        let header = format!("t={NOW},v1={},v1={sig}", "0".repeat(64));
        assert!(verifier().verify_at(BODY, Some(&header), NOW).is_ok());
    }

    #[test]
    fn test_flipped_byte_rejected() {
        let header = sign(SECRET, NOW, BODY).unwrap();
        let mut tampered = BODY.to_vec();
        tampered[10] ^= 0x01;
        assert_eq!(
            verifier().verify_at(&tampered, Some(&header), NOW),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let header = sign("whsec_other", NOW, BODY).unwrap();
        assert_eq!(
            verifier().verify_at(BODY, Some(&header), NOW),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn test_missing_and_short_headers() {
        assert_eq!(
            verifier().verify_at(BODY, None, NOW),
            Err(SignatureError::MissingHeader)
        );
        assert_eq!(
            verifier().verify_at(BODY, Some("t=1,v1=abc"), NOW),
            Err(SignatureError::HeaderTooShort)
        );
    }

    #[test]
    fn test_malformed_header() {
        let header = format!("x={NOW},v0={}", "a".repeat(64));
        assert_eq!(
            verifier().verify_at(BODY, Some(&header), NOW),
            Err(SignatureError::MalformedHeader)
        );
    }

    #[test]
    fn test_secret_problems() {
        let header = sign(SECRET, NOW, BODY).unwrap();
        let missing = WebhookVerifier::new(None, 300);
        assert_eq!(
            missing.verify_at(BODY, Some(&header), NOW),
            Err(SignatureError::MissingSecret)
        );
        let malformed = WebhookVerifier::new(Some(SecretString::from("not-a-secret".to_string())), 300);
        assert_eq!(
            malformed.verify_at(BODY, Some(&header), NOW),
            Err(SignatureError::MalformedSecret)
        );
    }

    #[test]
    fn test_replay_window() {
        let header = sign(SECRET, NOW, BODY).unwrap();
        assert!(matches!(
            verifier().verify_at(BODY, Some(&header), NOW + 301),
            Err(SignatureError::TimestampOutOfTolerance { age: 301 })
        ));
        assert!(verifier().verify_at(BODY, Some(&header), NOW - 300).is_ok());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let output = format!("{:?}", verifier());
        assert!(output.contains("[REDACTED]"));
        assert!(!output.contains("signing_secret"));
    }
}
