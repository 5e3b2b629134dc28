//! Untrusted cart payload validation.
//!
//! The cart arrives as arbitrary JSON from the browser. Nothing in it is
//! trusted except the shape checked here: product IDs and quantities. Prices
//! always come from the catalog.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::types::{Email, EmailError, ProductId};

/// Canonical lowercase-or-uppercase hyphenated UUID v4.
/// Hyphenated RFC 4122 form; the version is checked after parsing.
static UUID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[89ab][0-9a-f]{3}-[0-9a-f]{12}$")
        .expect("uuid pattern is a valid regex")
});

/// Bounds applied to every cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CartLimits {
    /// Maximum number of distinct lines.
    pub max_items: usize,
    /// Maximum quantity of a single product.
    pub max_quantity: u32,
    /// Maximum raw request size, checked before JSON parsing.
    pub max_payload_bytes: usize,
}

impl Default for CartLimits {
    fn default() -> Self {
        Self {
            max_items: 50,
            max_quantity: 99,
            max_payload_bytes: 64 * 1024,
        }
    }
}

/// A cart line that passed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatedItem {
    pub product_id: ProductId,
    pub quantity: u32,
}

/// Why a cart (or its accompanying email) was rejected.
///
/// Every variant is a client error: retrying the same payload will fail the
/// same way.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CartError {
    #[error("request body is {size} bytes, maximum is {max}")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("request body is not valid JSON: {0}")]
    MalformedBody(String),

    #[error("cart items must be an array")]
    NotAnArray,

    #[error("cart is empty")]
    Empty,

    #[error("cart has {count} items, maximum is {max}")]
    TooManyItems { count: usize, max: usize },

    #[error("item {index} must be an object")]
    InvalidItem { index: usize },

    #[error("item {index} has an invalid product id")]
    InvalidProductId { index: usize },

    #[error("item {index} quantity must be a whole number between 1 and {max}")]
    InvalidQuantity { index: usize, max: u32 },

    #[error("email is required")]
    MissingEmail,

    #[error("invalid email: {0}")]
    InvalidEmail(#[from] EmailError),
}

impl CartError {
    /// Stable machine-readable code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::PayloadTooLarge { .. } => "payload_too_large",
            Self::MalformedBody(_) => "malformed_body",
            Self::NotAnArray => "items_not_array",
            Self::Empty => "cart_empty",
            Self::TooManyItems { .. } => "too_many_items",
            Self::InvalidItem { .. } => "invalid_item",
            Self::InvalidProductId { .. } => "invalid_product_id",
            Self::InvalidQuantity { .. } => "invalid_quantity",
            Self::MissingEmail => "email_required",
            Self::InvalidEmail(_) => "invalid_email",
        }
    }

    /// Index of the offending item, when the error is about one item.
    #[must_use]
    pub const fn item_index(&self) -> Option<usize> {
        match self {
            Self::InvalidItem { index }
            | Self::InvalidProductId { index }
            | Self::InvalidQuantity { index, .. } => Some(*index),
            _ => None,
        }
    }
}

/// Reject a request body larger than the configured ceiling.
///
/// # Errors
///
/// Returns [`CartError::PayloadTooLarge`] when `size` exceeds the limit.
pub fn check_payload_size(size: usize, limits: &CartLimits) -> Result<(), CartError> {
    if size > limits.max_payload_bytes {
        return Err(CartError::PayloadTooLarge {
            size,
            max: limits.max_payload_bytes,
        });
    }
    Ok(())
}

/// Validate the `items` value of a checkout request.
///
/// Lines with the same product are merged; the merged quantity must still be
/// within bounds. Order of first appearance is preserved.
///
/// # Errors
///
/// Returns the first [`CartError`] encountered.
pub fn validate_cart(raw: &Value, limits: &CartLimits) -> Result<Vec<ValidatedItem>, CartError> {
    let Value::Array(entries) = raw else {
        return Err(CartError::NotAnArray);
    };
    if entries.is_empty() {
        return Err(CartError::Empty);
    }
    if entries.len() > limits.max_items {
        return Err(CartError::TooManyItems {
            count: entries.len(),
            max: limits.max_items,
        });
    }

    let mut items: Vec<ValidatedItem> = Vec::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        let Value::Object(fields) = entry else {
            return Err(CartError::InvalidItem { index });
        };

        let product_id = fields
            .get("productId")
            .and_then(Value::as_str)
            .and_then(parse_product_id)
            .ok_or(CartError::InvalidProductId { index })?;

        let quantity = parse_quantity(fields.get("quantity"), limits.max_quantity)
            .ok_or(CartError::InvalidQuantity {
                index,
                max: limits.max_quantity,
            })?;

        if let Some(existing) = items.iter_mut().find(|i| i.product_id == product_id) {
            existing.quantity = existing
                .quantity
                .checked_add(quantity)
                .filter(|q| *q <= limits.max_quantity)
                .ok_or(CartError::InvalidQuantity {
                    index,
                    max: limits.max_quantity,
                })?;
        } else {
            items.push(ValidatedItem {
                product_id,
                quantity,
            });
        }
    }

    Ok(items)
}

/// Validate and normalize the email that accompanies a cart.
///
/// # Errors
///
/// Returns [`CartError::MissingEmail`] when absent and
/// [`CartError::InvalidEmail`] when malformed.
pub fn validate_email(raw: Option<&str>) -> Result<Email, CartError> {
    let raw = raw.ok_or(CartError::MissingEmail)?;
    Ok(Email::parse(raw)?)
}

fn parse_product_id(raw: &str) -> Option<ProductId> {
    if !UUID_PATTERN.is_match(raw) {
        return None;
    }
    Uuid::parse_str(raw)
        .ok()
        .map(ProductId::new)
        .filter(ProductId::is_v4)
}

/// Absent or null quantity means one unit.
fn parse_quantity(raw: Option<&Value>, max: u32) -> Option<u32> {
    let quantity = match raw {
        None | Some(Value::Null) => return Some(1),
        Some(Value::Number(n)) => match n.as_u64() {
            Some(q) => q,
            None => whole_float(n.as_f64()?, max)?,
        },
        Some(_) => return None,
    };

    u32::try_from(quantity)
        .ok()
        .filter(|q| (1..=max).contains(q))
}

/// JSON clients may send `2.0`; accept it only when it is whole and in range.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn whole_float(f: f64, max: u32) -> Option<u64> {
    (f.fract() == 0.0 && f >= 1.0 && f <= f64::from(max)).then(|| f as u64)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    const A: &str = "3f2504e0-4f89-41d3-9a0c-0305e82c3301";
    const B: &str = "9b2d7c1e-5a4f-4e8b-8c3d-2f1a0b9e7d65";

    fn limits() -> CartLimits {
        CartLimits::default()
    }

    #[test]
    fn test_valid_cart() {
        let items = validate_cart(
            &json!([{ "productId": A, "quantity": 2 }, { "productId": B, "quantity": 1 }]),
            &limits(),
        )
        .unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].product_id.to_string(), A);
        assert_eq!(items[0].quantity, 2);
    }

    #[test]
    fn test_uppercase_uuid_accepted() {
        let items =
            validate_cart(&json!([{ "productId": A.to_uppercase() }]), &limits()).unwrap();
        assert_eq!(items[0].product_id.to_string(), A);
    }

    #[test]
    fn test_missing_quantity_defaults_to_one() {
        let items = validate_cart(&json!([{ "productId": A }]), &limits()).unwrap();
        assert_eq!(items[0].quantity, 1);
        let items =
            validate_cart(&json!([{ "productId": A, "quantity": null }]), &limits()).unwrap();
        assert_eq!(items[0].quantity, 1);
    }

    #[test]
    fn test_whole_float_quantity_accepted() {
        let items =
            validate_cart(&json!([{ "productId": A, "quantity": 3.0 }]), &limits()).unwrap();
        assert_eq!(items[0].quantity, 3);
    }

    #[test]
    fn test_not_an_array() {
        assert_eq!(
            validate_cart(&json!({ "productId": A }), &limits()),
            Err(CartError::NotAnArray)
        );
        assert_eq!(validate_cart(&Value::Null, &limits()), Err(CartError::NotAnArray));
    }

    #[test]
    fn test_empty_cart() {
        assert_eq!(validate_cart(&json!([]), &limits()), Err(CartError::Empty));
    }

    #[test]
    fn test_too_many_items() {
        let entries: Vec<Value> = (0..51).map(|_| json!({ "productId": A })).collect();
        assert!(matches!(
            validate_cart(&Value::Array(entries), &limits()),
            Err(CartError::TooManyItems { count: 51, max: 50 })
        ));
    }

    #[test]
    fn test_invalid_product_ids() {
        for bad in [
            json!("not-a-uuid"),
            json!("3f2504e0-4f89-11d3-9a0c-0305e82c3301"), // v1
            json!("018f3a2b-7c4d-7e8f-9a0b-1c2d3e4f5a6b"), // v7
            json!("3f2504e04f8941d39a0c0305e82c3301"),      // unhyphenated
            json!(42),
        ] {
            let result = validate_cart(&json!([{ "productId": bad }]), &limits());
            assert_eq!(result, Err(CartError::InvalidProductId { index: 0 }), "{bad}");
        }
    }

    #[test]
    fn test_invalid_quantities() {
        for bad in [json!(0), json!(-1), json!(1.5), json!(100), json!("2"), json!(true)] {
            let result = validate_cart(&json!([{ "productId": A, "quantity": bad }]), &limits());
            assert!(
                matches!(result, Err(CartError::InvalidQuantity { index: 0, .. })),
                "{bad}"
            );
        }
    }

    #[test]
    fn test_item_must_be_object() {
        let result = validate_cart(&json!([{ "productId": A }, A]), &limits());
        assert_eq!(result, Err(CartError::InvalidItem { index: 1 }));
        assert_eq!(result.unwrap_err().item_index(), Some(1));
    }

    #[test]
    fn test_duplicates_are_merged() {
        let items = validate_cart(
            &json!([
                { "productId": A, "quantity": 2 },
                { "productId": B },
                { "productId": A, "quantity": 3 }
            ]),
            &limits(),
        )
        .unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].quantity, 5);
        assert_eq!(items[1].quantity, 1);
    }

    #[test]
    fn test_merged_quantity_is_bounded() {
        let result = validate_cart(
            &json!([{ "productId": A, "quantity": 60 }, { "productId": A, "quantity": 40 }]),
            &limits(),
        );
        assert!(matches!(
            result,
            Err(CartError::InvalidQuantity { index: 1, max: 99 })
        ));
    }

    #[test]
    fn test_payload_size() {
        let limits = limits();
        assert!(check_payload_size(limits.max_payload_bytes, &limits).is_ok());
        assert_eq!(
            check_payload_size(limits.max_payload_bytes + 1, &limits)
                .unwrap_err()
                .code(),
            "payload_too_large"
        );
    }

    #[test]
    fn test_validate_email() {
        assert_eq!(
            validate_email(Some(" Buyer@Example.com ")).unwrap().as_str(),
            "buyer@example.com"
        );
        assert_eq!(validate_email(None), Err(CartError::MissingEmail));
        assert_eq!(
            validate_email(Some("nope")).unwrap_err().code(),
            "invalid_email"
        );
    }
}
