//! Database operations for storefront `PostgreSQL`.
//!
//! # Database: `kestrel`
//!
//! ## Tables
//!
//! - `storefront.products` - Catalog (read-only here)
//! - `storefront.orders` - Orders, unique on `external_id`
//! - `storefront.cart_items` - Saved carts keyed by customer email
//!
//! # Collaborator Traits
//!
//! Checkout code talks to the datastore only through [`CatalogStore`],
//! [`OrderStore`] and [`CartStore`]. The `PostgreSQL` repositories in this
//! module implement them; tests substitute in-memory fakes.
//!
//! # Migrations
//!
//! Migrations are stored in `crates/storefront/migrations/` and run via:
//! ```bash
//! cargo run -p kestrel-cli -- migrate
//! ```

pub mod carts;
pub mod orders;
pub mod products;

use std::future::Future;
use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use kestrel_core::{Email, OrderId, OrderStatus, ProductId};

use crate::models::{InsertOutcome, NewOrder, Order, Product};

pub use carts::CartRepository;
pub use orders::OrderRepository;
pub use products::ProductRepository;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// Read access to the product catalog.
pub trait CatalogStore: Send + Sync {
    /// Load every product whose ID is in `ids`, in one round trip.
    ///
    /// IDs with no row are simply absent from the result.
    fn find_by_ids(
        &self,
        ids: &[ProductId],
    ) -> impl Future<Output = Result<Vec<Product>, RepositoryError>> + Send;
}

/// Order persistence.
pub trait OrderStore: Send + Sync {
    /// Look up an order by gateway session or intent ID.
    fn find_by_external_id(
        &self,
        external_id: &str,
    ) -> impl Future<Output = Result<Option<Order>, RepositoryError>> + Send;

    /// Insert an order unless one with the same external ID already exists.
    ///
    /// Uniqueness must be enforced by the store itself, not by a prior
    /// lookup: two concurrent inserts for one external ID produce exactly one
    /// `Created`.
    fn insert(
        &self,
        order: &NewOrder,
    ) -> impl Future<Output = Result<InsertOutcome, RepositoryError>> + Send;

    /// Move an order from `from` to `to`.
    ///
    /// Returns `false` when the order is no longer in `from` (another writer
    /// changed it first) and nothing was written.
    fn update_status(
        &self,
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    ) -> impl Future<Output = Result<bool, RepositoryError>> + Send;
}

/// Saved cart rows.
pub trait CartStore: Send + Sync {
    /// Delete every cart row owned by `owner`. Returns the number removed.
    fn delete_by_owner(
        &self,
        owner: &Email,
    ) -> impl Future<Output = Result<u64, RepositoryError>> + Send;
}
