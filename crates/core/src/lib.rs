//! Kestrel Core - checkout domain library.
//!
//! This crate holds the parts of checkout that must be identical wherever
//! they run:
//! - `storefront` - checkout API and payment webhook receiver
//! - `cli` - operator tooling (quotes, migrations, seeding)
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no
//! database access, no HTTP clients. Enable the `postgres` feature to get
//! `sqlx` encode/decode impls for the ID, email and status types.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for IDs, emails and order status
//! - [`pricing`] - Subtotal, VAT, shipping and total computation
//! - [`cart`] - Validation of untrusted cart payloads

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cart;
pub mod pricing;
pub mod types;

pub use cart::{CartError, CartLimits, ValidatedItem};
pub use pricing::{LineAmount, PricingError, PricingRules, Totals};
pub use types::*;
