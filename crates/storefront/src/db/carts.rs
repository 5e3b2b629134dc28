//! Saved cart repository.

use sqlx::PgPool;

use kestrel_core::Email;

use super::{CartStore, RepositoryError};

/// Repository for saved cart rows.
pub struct CartRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CartRepository<'a> {
    /// Create a new cart repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }
}

impl CartStore for CartRepository<'_> {
    async fn delete_by_owner(&self, owner: &Email) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM storefront.cart_items WHERE owner_email = $1")
            .bind(owner.as_str())
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
