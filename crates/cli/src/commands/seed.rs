//! Seed the catalog with products from a YAML file.
//!
//! Products are upserted by ID, so running the command twice is harmless and
//! edits to the file are picked up on the next run.

use std::path::Path;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use kestrel_core::ProductId;
use kestrel_storefront::db::{self, ProductRepository, RepositoryError};
use kestrel_storefront::models::Product;

/// Errors that can occur while seeding.
#[derive(Debug, Error)]
pub enum SeedError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid product {name}: {reason}")]
    Invalid { name: String, reason: &'static str },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SeedProduct {
    id: Uuid,
    name: String,
    #[serde(default)]
    description: Option<String>,
    price: Decimal,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    image_keys: Vec<String>,
    #[serde(default = "enabled")]
    in_stock: bool,
    #[serde(default = "enabled")]
    is_active: bool,
}

const fn enabled() -> bool {
    true
}

impl TryFrom<SeedProduct> for Product {
    type Error = SeedError;

    fn try_from(seed: SeedProduct) -> Result<Self, Self::Error> {
        let invalid = |reason| SeedError::Invalid {
            name: seed.name.clone(),
            reason,
        };
        if seed.name.trim().is_empty() {
            return Err(invalid("name is empty"));
        }
        if seed.price <= Decimal::ZERO {
            return Err(invalid("price must be positive"));
        }
        if seed.price.scale() > 2 {
            return Err(invalid("price has more than two decimal places"));
        }

        Ok(Self {
            id: ProductId::new(seed.id),
            name: seed.name,
            description: seed.description,
            price: seed.price,
            in_stock: seed.in_stock,
            is_active: seed.is_active,
            category: seed.category,
            image_keys: seed.image_keys,
            updated_at: Utc::now(),
        })
    }
}

/// Parse and validate a products file.
///
/// # Errors
///
/// Returns `SeedError::Yaml` or `SeedError::Invalid` for bad input.
pub fn parse_products(yaml: &str) -> Result<Vec<Product>, SeedError> {
    let seeds: Vec<SeedProduct> = serde_yaml::from_str(yaml)?;
    seeds.into_iter().map(Product::try_from).collect()
}

/// Upsert every product in `file`.
///
/// The file is validated in full before the database is touched.
///
/// # Errors
///
/// Returns `SeedError` if the file is unreadable or invalid, or a write fails.
pub async fn products(file: &Path) -> Result<(), SeedError> {
    let content = tokio::fs::read_to_string(file)
        .await
        .map_err(|source| SeedError::Io {
            path: file.display().to_string(),
            source,
        })?;
    let products = parse_products(&content)?;
    info!(count = products.len(), path = %file.display(), "Parsed products");

    let database_url =
        super::database_url().ok_or(SeedError::MissingEnvVar("STOREFRONT_DATABASE_URL"))?;
    let pool = db::create_pool(&database_url).await?;
    let repository = ProductRepository::new(&pool);

    for product in &products {
        repository.upsert(product).await?;
        info!(id = %product.id, name = %product.name, price = %product.price, "Upserted product");
    }

    info!("Seeding complete!");
    Ok(())
}
