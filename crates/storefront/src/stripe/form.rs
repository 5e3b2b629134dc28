//! Form encoding for gateway create calls.
//!
//! The gateway takes `application/x-www-form-urlencoded` bodies with nested
//! keys written as `line_items[0][price_data][unit_amount]=1299`.

use super::types::{CheckoutSessionRequest, GatewayLineItem, Metadata, PaymentIntentRequest};

/// Ordered list of form fields with bracketed nested keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Form {
    pairs: Vec<(String, String)>,
}

impl Form {
    #[must_use]
    pub const fn new() -> Self {
        Self { pairs: Vec::new() }
    }

    /// Append one field.
    pub fn push(&mut self, key: impl Into<String>, value: impl ToString) -> &mut Self {
        self.pairs.push((key.into(), value.to_string()));
        self
    }

    /// Append a field only when `value` is present.
    pub fn push_opt(&mut self, key: impl Into<String>, value: Option<impl ToString>) -> &mut Self {
        if let Some(value) = value {
            self.push(key, value);
        }
        self
    }

    /// Append `prefix[0]`, `prefix[1]`, ...
    pub fn push_list<T: std::fmt::Display>(&mut self, prefix: &str, values: &[T]) -> &mut Self {
        for (i, value) in values.iter().enumerate() {
            self.push(format!("{prefix}[{i}]"), value);
        }
        self
    }

    /// Append `prefix[key]` for every entry.
    pub fn push_metadata(&mut self, prefix: &str, metadata: &Metadata) -> &mut Self {
        for (key, value) in metadata {
            self.push(format!("{prefix}[{key}]"), value);
        }
        self
    }

    /// Value of the first field named `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }
}

/// Encode a checkout session request.
#[must_use]
pub fn checkout_session_form(request: &CheckoutSessionRequest) -> Form {
    let mut form = Form::new();
    form.push("mode", "payment")
        .push("customer_email", &request.customer_email)
        .push("success_url", &request.success_url)
        .push("cancel_url", &request.cancel_url)
        .push_list("payment_method_types", &request.payment_method_types)
        .push_metadata("metadata", &request.metadata)
        .push_metadata("payment_intent_data[metadata]", &request.payment_intent_metadata);

    for (i, item) in request.line_items.iter().enumerate() {
        push_line_item(&mut form, &format!("line_items[{i}]"), item, &request.currency);
    }

    form
}

fn push_line_item(form: &mut Form, prefix: &str, item: &GatewayLineItem, currency: &str) {
    let price = format!("{prefix}[price_data]");
    let product = format!("{price}[product_data]");

    form.push(format!("{prefix}[quantity]"), item.quantity)
        .push(format!("{price}[currency]"), currency)
        .push(format!("{price}[unit_amount]"), item.unit_amount)
        .push(format!("{product}[name]"), &item.name)
        .push_opt(format!("{product}[description]"), item.description.as_ref())
        .push_list(&format!("{product}[images]"), &item.images);
}

/// Encode a payment intent request.
#[must_use]
pub fn payment_intent_form(request: &PaymentIntentRequest) -> Form {
    let mut form = Form::new();
    form.push("amount", request.amount)
        .push("currency", &request.currency)
        .push("receipt_email", &request.receipt_email)
        .push_list("payment_method_types", &request.payment_method_types)
        .push_metadata("metadata", &request.metadata);
    form
}
