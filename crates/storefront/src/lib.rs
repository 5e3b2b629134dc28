//! Kestrel storefront library.
//!
//! Checkout API and payment webhook receiver, exposed as a library so the
//! pipeline can be driven by the CLI and the integration tests.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
pub mod storage;
pub mod stripe;
