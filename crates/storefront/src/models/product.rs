//! Catalog product (domain type).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use kestrel_core::ProductId;

/// An authoritative catalog product.
///
/// The catalog is the only source of unit prices; nothing the browser sends
/// ever overrides `price`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    /// Product ID.
    pub id: ProductId,
    /// Display name.
    pub name: String,
    /// Long description.
    pub description: Option<String>,
    /// Unit price in the store currency.
    pub price: Decimal,
    /// Whether stock is available.
    pub in_stock: bool,
    /// Whether the product is listed at all.
    pub is_active: bool,
    /// Category slug.
    pub category: Option<String>,
    /// Object storage keys of product images, in display order.
    pub image_keys: Vec<String>,
    /// Last modification time, used for image cache-busting.
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Whether the product can be put into a payment session.
    #[must_use]
    pub const fn is_purchasable(&self) -> bool {
        self.is_active && self.in_stock
    }
}
