//! Business logic services for storefront.
//!
//! # Services
//!
//! - `checkout` - Cart validation, pricing, gateway sessions and webhook
//!   settlement

pub mod checkout;
