//! Order domain types.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use kestrel_core::{Email, OrderId, OrderStatus, Totals};

/// A persisted order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    /// Gateway session or payment intent ID. Unique across all orders.
    pub external_id: String,
    /// Normalized customer email, when the gateway reported one.
    pub email: Option<Email>,
    pub totals: Totals,
    /// Shipping address snapshot (opaque JSON).
    pub shipping_address: Option<Value>,
    /// Billing address snapshot (opaque JSON).
    pub billing_address: Option<Value>,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An order about to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub external_id: String,
    pub email: Option<Email>,
    pub totals: Totals,
    pub shipping_address: Option<Value>,
    pub billing_address: Option<Value>,
    pub status: OrderStatus,
}

/// Result of an insert keyed by external ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// A new row was written.
    Created(OrderId),
    /// Another writer got there first; nothing was written.
    AlreadyExists,
}
