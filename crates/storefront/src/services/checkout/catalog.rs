//! Catalog resolution: authoritative product data for a validated cart.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, instrument};

use kestrel_core::ProductId;

use crate::db::{CatalogStore, RepositoryError};
use crate::models::Product;
use crate::storage::ObjectStorage;

/// A purchasable product as checkout sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedProduct {
    pub id: ProductId,
    pub name: String,
    pub description: Option<String>,
    /// Authoritative unit price.
    pub unit_price: Decimal,
    /// Absolute, cache-busted image URLs.
    pub image_urls: Vec<String>,
}

/// Resolved products keyed by ID.
pub type ResolvedCatalog = HashMap<ProductId, ResolvedProduct>;

#[derive(Debug, Error)]
pub enum CatalogError {
    /// Some requested products do not exist or cannot be sold.
    #[error("products unavailable: {}", format_ids(.missing))]
    ProductsUnavailable { missing: Vec<ProductId> },

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Load every product in `ids` with a single catalog query.
///
/// Missing, inactive and out-of-stock products all fail the whole request;
/// `missing` lists them in request order.
///
/// # Errors
///
/// Returns `CatalogError::ProductsUnavailable` naming the unavailable IDs, or
/// `CatalogError::Repository` if the lookup fails.
#[instrument(skip_all, fields(requested = ids.len()))]
pub async fn resolve<C, S>(
    catalog: &C,
    storage: &S,
    ids: &[ProductId],
) -> Result<ResolvedCatalog, CatalogError>
where
    C: CatalogStore,
    S: ObjectStorage,
{
    let products = catalog.find_by_ids(ids).await?;

    let found: HashMap<ProductId, Product> = products
        .into_iter()
        .filter(Product::is_purchasable)
        .map(|p| (p.id, p))
        .collect();

    let missing: Vec<ProductId> = ids
        .iter()
        .filter(|id| !found.contains_key(*id))
        .copied()
        .collect();
    if !missing.is_empty() {
        debug!(missing = %format_ids(&missing), "Cart references unavailable products");
        return Err(CatalogError::ProductsUnavailable { missing });
    }

    Ok(found
        .into_values()
        .map(|product| {
            let image_urls = image_urls(&product, storage);
            let resolved = ResolvedProduct {
                id: product.id,
                name: product.name,
                description: product.description,
                unit_price: product.price,
                image_urls,
            };
            (resolved.id, resolved)
        })
        .collect())
}

/// Public image URLs with a `v=<last modified>` cache buster.
fn image_urls<S: ObjectStorage>(product: &Product, storage: &S) -> Vec<String> {
    let version = product.updated_at.timestamp();
    product
        .image_keys
        .iter()
        .filter(|key| !key.trim().is_empty())
        .map(|key| {
            let url = storage.public_url(key);
            let separator = if url.contains('?') { '&' } else { '?' };
            format!("{url}{separator}v={version}")
        })
        .collect()
}

fn format_ids(ids: &[ProductId]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::{TimeZone, Utc};
    use url::Url;
    use uuid::Uuid;

    use super::*;
    use crate::storage::PublicBucket;

    struct Catalog {
        products: Vec<Product>,
        lookups: AtomicUsize,
    }

    impl CatalogStore for Catalog {
        async fn find_by_ids(&self, ids: &[ProductId]) -> Result<Vec<Product>, RepositoryError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .products
                .iter()
                .filter(|p| ids.contains(&p.id))
                .cloned()
                .collect())
        }
    }

    fn product(n: u128) -> Product {
        Product {
            id: ProductId::new(Uuid::from_u128(n)),
            name: format!("Product {n}"),
            description: None,
            price: Decimal::new(1999, 2),
            in_stock: true,
            is_active: true,
            category: None,
            image_keys: vec!["products/a.webp".to_string()],
            updated_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        }
    }

    fn storage() -> PublicBucket {
        PublicBucket::new(Url::parse("https://cdn.example.pl/media/").unwrap())
    }

    #[tokio::test]
    async fn test_resolves_in_one_lookup() {
        let catalog = Catalog {
            products: vec![product(1), product(2)],
            lookups: AtomicUsize::new(0),
        };
        let ids = [product(1).id, product(2).id];

        let resolved = resolve(&catalog, &storage(), &ids).await.unwrap();

        assert_eq!(resolved.len(), 2);
        assert_eq!(catalog.lookups.load(Ordering::SeqCst), 1);
        assert_eq!(
            resolved[&ids[0]].image_urls,
            vec!["https://cdn.example.pl/media/products/a.webp?v=1700000000"]
        );
    }

    #[tokio::test]
    async fn test_missing_products_named() {
        let catalog = Catalog {
            products: vec![product(1)],
            lookups: AtomicUsize::new(0),
        };
        let absent = ProductId::new(Uuid::from_u128(9));

        let err = resolve(&catalog, &storage(), &[product(1).id, absent])
            .await
            .unwrap_err();

        assert!(matches!(err, CatalogError::ProductsUnavailable { missing } if missing == vec![absent]));
    }

    #[tokio::test]
    async fn test_inactive_and_out_of_stock_are_unavailable() {
        let mut inactive = product(1);
        inactive.is_active = false;
        let mut sold_out = product(2);
        sold_out.in_stock = false;
        let catalog = Catalog {
            products: vec![inactive.clone(), sold_out.clone(), product(3)],
            lookups: AtomicUsize::new(0),
        };

        let err = resolve(&catalog, &storage(), &[inactive.id, product(3).id, sold_out.id])
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            CatalogError::ProductsUnavailable { missing } if missing == vec![inactive.id, sold_out.id]
        ));
    }
}
