//! Origin resolution for post-payment redirect URLs.
//!
//! Fallback chain: `Origin` header, then the origin of `Referer`, then
//! `Host`, then the configured base URL. Whatever is chosen must parse as an
//! absolute http(s) URL, and must be HTTPS in production.

use axum::http::HeaderMap;
use axum::http::header::{HOST, ORIGIN, REFERER};
use thiserror::Error;
use url::Url;

use crate::config::Environment;

/// The resolved origin was unusable.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OriginError {
    #[error("origin is not a valid URL: {0}")]
    Invalid(String),

    #[error("origin must use https in production: {0}")]
    Insecure(String),
}

/// Resolve the origin to build redirect URLs against.
///
/// Returns the ASCII serialization of the origin, without a trailing slash.
///
/// # Errors
///
/// Returns `OriginError` if the chosen candidate is not a valid origin or is
/// plain HTTP in production.
pub fn resolve_origin(
    headers: &HeaderMap,
    base_url: &Url,
    environment: Environment,
) -> Result<String, OriginError> {
    let candidate = header(headers, ORIGIN.as_str())
        .filter(|origin| *origin != "null")
        .map(String::from)
        .or_else(|| {
            header(headers, REFERER.as_str())
                .and_then(|referer| Url::parse(referer).ok())
                .map(|url| url.origin().ascii_serialization())
        })
        .or_else(|| {
            header(headers, HOST.as_str()).map(|host| {
                let scheme = if environment.is_production() {
                    "https"
                } else {
                    "http"
                };
                format!("{scheme}://{host}")
            })
        })
        .unwrap_or_else(|| base_url.origin().ascii_serialization());

    validate(&candidate, environment)
}

fn validate(candidate: &str, environment: Environment) -> Result<String, OriginError> {
    let url = Url::parse(candidate).map_err(|_| OriginError::Invalid(candidate.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(OriginError::Invalid(candidate.to_string()));
    }
    if environment.is_production() && url.scheme() != "https" {
        return Err(OriginError::Insecure(candidate.to_string()));
    }
    Ok(url.origin().ascii_serialization())
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}
