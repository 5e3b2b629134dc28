//! Checkout request parsing and cart pricing.

use serde::Serialize;
use serde_json::Value;

use kestrel_core::cart::{check_payload_size, validate_cart, validate_email};
use kestrel_core::pricing::compute_totals;
use kestrel_core::{
    CartError, CartLimits, Email, EmailError, LineAmount, PricingError, PricingRules, Totals,
    ValidatedItem,
};

use super::catalog::{ResolvedCatalog, ResolvedProduct};

/// A checkout request body that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutRequest {
    pub items: Vec<ValidatedItem>,
    /// Normalized email, when one was sent.
    pub email: Option<Email>,
    pub shipping_address: Option<Value>,
    pub billing_address: Option<Value>,
}

impl CheckoutRequest {
    /// Parse and validate a raw checkout body.
    ///
    /// The size check runs before JSON parsing. Nothing here touches the
    /// catalog or the gateway.
    ///
    /// # Errors
    ///
    /// Returns the first `CartError` found.
    pub fn parse(body: &[u8], limits: &CartLimits) -> Result<Self, CartError> {
        check_payload_size(body.len(), limits)?;

        let value: Value =
            serde_json::from_slice(body).map_err(|e| CartError::MalformedBody(e.to_string()))?;
        let Value::Object(mut fields) = value else {
            return Err(CartError::MalformedBody("expected a JSON object".to_string()));
        };

        let items = validate_cart(fields.get("items").unwrap_or(&Value::Null), limits)?;

        let email = match fields.get("email") {
            None | Some(Value::Null) => None,
            Some(Value::String(raw)) => Some(validate_email(Some(raw.as_str()))?),
            Some(_) => return Err(CartError::InvalidEmail(EmailError::Malformed)),
        };

        Ok(Self {
            items,
            email,
            shipping_address: take_address(&mut fields, "shippingAddress"),
            billing_address: take_address(&mut fields, "billingAddress"),
        })
    }

    /// The email, which session and intent creation require.
    ///
    /// # Errors
    ///
    /// Returns `CartError::MissingEmail` if none was sent.
    pub fn require_email(&self) -> Result<&Email, CartError> {
        self.email.as_ref().ok_or(CartError::MissingEmail)
    }
}

/// Addresses are opaque snapshots; only objects are kept.
fn take_address(fields: &mut serde_json::Map<String, Value>, key: &str) -> Option<Value> {
    fields.remove(key).filter(Value::is_object)
}

/// A cart line with its authoritative product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricedLine {
    pub product: ResolvedProduct,
    pub quantity: u32,
}

/// A cart priced against the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricedCart {
    pub lines: Vec<PricedLine>,
    pub totals: Totals,
}

impl PricedCart {
    /// Price `lines` with the store rules.
    ///
    /// # Errors
    ///
    /// Returns `PricingError` if the totals are invalid.
    pub fn new(lines: Vec<PricedLine>, rules: &PricingRules) -> Result<Self, PricingError> {
        let amounts: Vec<LineAmount> = lines
            .iter()
            .map(|line| LineAmount {
                unit_price: line.product.unit_price,
                quantity: line.quantity,
            })
            .collect();
        let totals = compute_totals(&amounts, rules)?;
        Ok(Self { lines, totals })
    }

    /// Join validated items with the resolved catalog, in cart order.
    ///
    /// Items missing from `catalog` are skipped; resolution has already
    /// failed the request for those.
    ///
    /// # Errors
    ///
    /// Returns `PricingError` if the totals are invalid.
    pub fn from_catalog(
        items: &[ValidatedItem],
        catalog: &ResolvedCatalog,
        rules: &PricingRules,
    ) -> Result<Self, PricingError> {
        let lines = items
            .iter()
            .filter_map(|item| {
                catalog.get(&item.product_id).map(|product| PricedLine {
                    product: product.clone(),
                    quantity: item.quantity,
                })
            })
            .collect();
        Self::new(lines, rules)
    }

    /// The normalized item list (product ID and quantity only).
    #[must_use]
    pub fn items(&self) -> Vec<ValidatedItem> {
        self.lines
            .iter()
            .map(|line| ValidatedItem {
                product_id: line.product.id,
                quantity: line.quantity,
            })
            .collect()
    }
}

/// One line of a checkout preview.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewLine {
    pub product_id: kestrel_core::ProductId,
    pub name: String,
    pub quantity: u32,
    pub unit_price: rust_decimal::Decimal,
    pub image_urls: Vec<String>,
}

/// Priced cart as shown before payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutPreview {
    pub items: Vec<PreviewLine>,
    #[serde(flatten)]
    pub totals: Totals,
    pub currency: String,
}

impl CheckoutPreview {
    #[must_use]
    pub fn new(cart: &PricedCart, currency: &str) -> Self {
        Self {
            items: cart
                .lines
                .iter()
                .map(|line| PreviewLine {
                    product_id: line.product.id,
                    name: line.product.name.clone(),
                    quantity: line.quantity,
                    unit_price: line.product.unit_price,
                    image_urls: line.product.image_urls.clone(),
                })
                .collect(),
            totals: cart.totals,
            currency: currency.to_string(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    const A: &str = "3f2504e0-4f89-41d3-9a0c-0305e82c3301";

    fn parse(body: &Value) -> Result<CheckoutRequest, CartError> {
        CheckoutRequest::parse(body.to_string().as_bytes(), &CartLimits::default())
    }

    #[test]
    fn test_parse_full_request() {
        let request = parse(&json!({
            "items": [{ "productId": A, "quantity": 2 }],
            "email": "  Jan@Example.PL ",
            "shippingAddress": { "city": "Kraków" },
            "billingAddress": "not an object"
        }))
        .unwrap();

        assert_eq!(request.items.len(), 1);
        assert_eq!(request.require_email().unwrap().as_str(), "jan@example.pl");
        assert_eq!(request.shipping_address, Some(json!({ "city": "Kraków" })));
        assert_eq!(request.billing_address, None);
    }

    #[test]
    fn test_missing_items() {
        assert_eq!(parse(&json!({ "email": "a@b.pl" })), Err(CartError::NotAnArray));
    }

    #[test]
    fn test_missing_email_only_fails_when_required() {
        let request = parse(&json!({ "items": [{ "productId": A }] })).unwrap();
        assert_eq!(request.require_email(), Err(CartError::MissingEmail));
    }

    #[test]
    fn test_non_string_email() {
        assert!(matches!(
            parse(&json!({ "items": [{ "productId": A }], "email": 42 })),
            Err(CartError::InvalidEmail(_))
        ));
    }

    #[test]
    fn test_malformed_json() {
        let result = CheckoutRequest::parse(b"{\"items\": [", &CartLimits::default());
        assert!(matches!(result, Err(CartError::MalformedBody(_))));
        let result = CheckoutRequest::parse(b"[]", &CartLimits::default());
        assert!(matches!(result, Err(CartError::MalformedBody(_))));
    }

    #[test]
    fn test_oversized_body_rejected_before_parsing() {
        let limits = CartLimits {
            max_payload_bytes: 8,
            ..CartLimits::default()
        };
        // Not even JSON: the size check must fire first
        let result = CheckoutRequest::parse(b"xxxxxxxxxxxx", &limits);
        assert!(matches!(result, Err(CartError::PayloadTooLarge { size: 12, max: 8 })));
    }
}
