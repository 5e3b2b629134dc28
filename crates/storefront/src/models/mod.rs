//! Domain models for the storefront.
//!
//! These are validated domain objects, separate from database row types.

pub mod order;
pub mod product;

pub use order::{InsertOutcome, NewOrder, Order};
pub use product::Product;
