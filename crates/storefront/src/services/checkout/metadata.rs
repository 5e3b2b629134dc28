//! Checkout facts carried in gateway metadata.
//!
//! The gateway session is opaque to the store, so everything the webhook
//! needs later (email, totals, items, addresses) rides along as metadata.
//! Gateway metadata values are capped at 500 characters; longer values are
//! split across `key_0 .. key_n` with the chunk count stored in `key_chunks`.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde_json::Value;

use kestrel_core::{Email, Totals, ValidatedItem};

use crate::stripe::Metadata;

/// Longest value the gateway accepts.
pub const MAX_VALUE_LEN: usize = 500;

/// Metadata keys.
pub mod keys {
    pub const EMAIL: &str = "email";
    pub const SUBTOTAL: &str = "subtotal";
    pub const TAX: &str = "tax";
    pub const SHIPPING: &str = "shipping";
    pub const TOTAL: &str = "total";
    pub const ITEMS: &str = "items";
    pub const SHIPPING_ADDRESS: &str = "shipping_address";
    pub const BILLING_ADDRESS: &str = "billing_address";
    pub const FLOW: &str = "flow";
}

/// Which checkout path created a gateway object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Hosted checkout session.
    CheckoutSession,
    /// Payment intent confirmed by an embedded form.
    PaymentIntent,
}

impl Flow {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CheckoutSession => "checkout_session",
            Self::PaymentIntent => "payment_intent",
        }
    }
}

impl FromStr for Flow {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "checkout_session" => Ok(Self::CheckoutSession),
            "payment_intent" => Ok(Self::PaymentIntent),
            _ => Err(()),
        }
    }
}

/// Facts recorded at checkout time.
#[derive(Debug, Clone, Copy)]
pub struct CheckoutMetadata<'a> {
    pub email: &'a Email,
    pub totals: &'a Totals,
    pub items: &'a [ValidatedItem],
    pub shipping_address: Option<&'a Value>,
    pub billing_address: Option<&'a Value>,
    pub flow: Flow,
}

impl CheckoutMetadata<'_> {
    /// Encode as gateway metadata.
    #[must_use]
    pub fn encode(&self) -> Metadata {
        let mut metadata = Metadata::new();
        metadata.insert(keys::EMAIL.to_string(), self.email.to_string());
        metadata.insert(keys::SUBTOTAL.to_string(), self.totals.subtotal.to_string());
        metadata.insert(keys::TAX.to_string(), self.totals.tax.to_string());
        metadata.insert(keys::SHIPPING.to_string(), self.totals.shipping.to_string());
        metadata.insert(keys::TOTAL.to_string(), self.totals.total.to_string());
        metadata.insert(keys::FLOW.to_string(), self.flow.as_str().to_string());

        // Serializing plain structs and JSON values cannot fail
        let items = serde_json::to_string(self.items).unwrap_or_default();
        insert_chunked(&mut metadata, keys::ITEMS, &items);
        for (key, address) in [
            (keys::SHIPPING_ADDRESS, self.shipping_address),
            (keys::BILLING_ADDRESS, self.billing_address),
        ] {
            if let Some(address) = address.filter(|a| !a.is_null()) {
                insert_chunked(&mut metadata, key, &address.to_string());
            }
        }

        metadata
    }
}

/// Metadata as read back from a webhook event.
///
/// Every field is optional: the webhook falls back to gateway-reported values
/// for anything missing or unreadable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedMetadata {
    pub email: Option<String>,
    pub subtotal: Option<Decimal>,
    pub total: Option<Decimal>,
    pub items: Option<Vec<ValidatedItem>>,
    pub shipping_address: Option<Value>,
    pub billing_address: Option<Value>,
    pub flow: Option<Flow>,
}

impl DecodedMetadata {
    /// Decode leniently; unreadable fields become `None`.
    #[must_use]
    pub fn decode(metadata: &Metadata) -> Self {
        let decimal = |key: &str| {
            metadata
                .get(key)
                .and_then(|v| Decimal::from_str(v.trim()).ok())
        };
        let json = |key: &str| {
            read_chunked(metadata, key).and_then(|raw| serde_json::from_str::<Value>(&raw).ok())
        };

        Self {
            email: metadata.get(keys::EMAIL).cloned(),
            subtotal: decimal(keys::SUBTOTAL),
            total: decimal(keys::TOTAL),
            items: read_chunked(metadata, keys::ITEMS)
                .and_then(|raw| serde_json::from_str(&raw).ok()),
            shipping_address: json(keys::SHIPPING_ADDRESS).filter(|v| !v.is_null()),
            billing_address: json(keys::BILLING_ADDRESS).filter(|v| !v.is_null()),
            flow: metadata.get(keys::FLOW).and_then(|v| v.parse().ok()),
        }
    }
}

/// Insert `value` under `key`, splitting it when it exceeds [`MAX_VALUE_LEN`].
pub fn insert_chunked(metadata: &mut Metadata, key: &str, value: &str) {
    if value.chars().count() <= MAX_VALUE_LEN {
        metadata.insert(key.to_string(), value.to_string());
        return;
    }

    let chars: Vec<char> = value.chars().collect();
    let chunks = chars.chunks(MAX_VALUE_LEN);
    let count = chunks.len();
    for (i, chunk) in chunks.enumerate() {
        metadata.insert(format!("{key}_{i}"), chunk.iter().collect());
    }
    metadata.insert(format!("{key}_chunks"), count.to_string());
}

/// Read a value written by [`insert_chunked`].
///
/// Returns `None` if any chunk is missing.
#[must_use]
pub fn read_chunked(metadata: &Metadata, key: &str) -> Option<String> {
    if let Some(value) = metadata.get(key) {
        return Some(value.clone());
    }

    let count: usize = metadata.get(&format!("{key}_chunks"))?.parse().ok()?;
    (0..count)
        .map(|i| metadata.get(&format!("{key}_{i}")).map(String::as_str))
        .collect::<Option<String>>()
}
