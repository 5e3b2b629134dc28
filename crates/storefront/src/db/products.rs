//! Product repository (catalog reads).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use kestrel_core::ProductId;

use super::{CatalogStore, RepositoryError};
use crate::models::Product;

/// Repository for catalog product reads.
pub struct ProductRepository<'a> {
    pool: &'a PgPool,
}

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: Uuid,
    name: String,
    description: Option<String>,
    price: Decimal,
    in_stock: bool,
    is_active: bool,
    category: Option<String>,
    image_keys: Vec<String>,
    updated_at: DateTime<Utc>,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Self {
            id: ProductId::new(row.id),
            name: row.name,
            description: row.description,
            price: row.price,
            in_stock: row.in_stock,
            is_active: row.is_active,
            category: row.category,
            image_keys: row.image_keys,
            updated_at: row.updated_at,
        }
    }
}

impl<'a> ProductRepository<'a> {
    /// Create a new product repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Insert or update a product by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn upsert(&self, product: &Product) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO storefront.products
                (id, name, description, price, in_stock, is_active, category, image_keys)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                description = EXCLUDED.description,
                price = EXCLUDED.price,
                in_stock = EXCLUDED.in_stock,
                is_active = EXCLUDED.is_active,
                category = EXCLUDED.category,
                image_keys = EXCLUDED.image_keys,
                updated_at = NOW()
            ",
        )
        .bind(product.id.as_uuid())
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.price)
        .bind(product.in_stock)
        .bind(product.is_active)
        .bind(&product.category)
        .bind(&product.image_keys)
        .execute(self.pool)
        .await?;

        Ok(())
    }
}

impl CatalogStore for ProductRepository<'_> {
    async fn find_by_ids(&self, ids: &[ProductId]) -> Result<Vec<Product>, RepositoryError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<Uuid> = ids.iter().map(ProductId::as_uuid).collect();

        let rows: Vec<ProductRow> = sqlx::query_as(
            r"
            SELECT id, name, description, price, in_stock, is_active, category,
                   image_keys, updated_at
            FROM storefront.products
            WHERE id = ANY($1)
            ",
        )
        .bind(&ids)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(Product::from).collect())
    }
}
