//! Order repository.
//!
//! `external_id` carries a unique constraint; it is the only thing standing
//! between two concurrent webhook deliveries and a duplicate order, so inserts
//! rely on `ON CONFLICT` rather than on a prior lookup.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use kestrel_core::{Email, OrderId, OrderStatus, Totals};

use super::{OrderStore, RepositoryError};
use crate::models::{InsertOutcome, NewOrder, Order};

/// Repository for order persistence.
pub struct OrderRepository<'a> {
    pool: &'a PgPool,
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    external_id: String,
    email: Option<String>,
    subtotal: Decimal,
    tax: Decimal,
    shipping: Decimal,
    total: Decimal,
    shipping_address: Option<Value>,
    billing_address: Option<Value>,
    status: OrderStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = RepositoryError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let email = row
            .email
            .as_deref()
            .map(Email::parse)
            .transpose()
            .map_err(|e| {
                RepositoryError::DataCorruption(format!("invalid email in database: {e}"))
            })?;

        Ok(Self {
            id: OrderId::new(row.id),
            external_id: row.external_id,
            email,
            totals: Totals {
                subtotal: row.subtotal,
                tax: row.tax,
                shipping: row.shipping,
                total: row.total,
            },
            shipping_address: row.shipping_address,
            billing_address: row.billing_address,
            status: row.status,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl<'a> OrderRepository<'a> {
    /// Create a new order repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }
}

impl OrderStore for OrderRepository<'_> {
    async fn find_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<Order>, RepositoryError> {
        let row: Option<OrderRow> = sqlx::query_as(
            r"
            SELECT id, external_id, email, subtotal, tax, shipping, total,
                   shipping_address, billing_address, status, created_at, updated_at
            FROM storefront.orders
            WHERE external_id = $1
            ",
        )
        .bind(external_id)
        .fetch_optional(self.pool)
        .await?;

        row.map(Order::try_from).transpose()
    }

    async fn insert(&self, order: &NewOrder) -> Result<InsertOutcome, RepositoryError> {
        let id: Option<Uuid> = sqlx::query_scalar(
            r"
            INSERT INTO storefront.orders
                (id, external_id, email, subtotal, tax, shipping, total,
                 shipping_address, billing_address, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (external_id) DO NOTHING
            RETURNING id
            ",
        )
        .bind(OrderId::generate().as_uuid())
        .bind(&order.external_id)
        .bind(order.email.as_ref().map(Email::as_str))
        .bind(order.totals.subtotal)
        .bind(order.totals.tax)
        .bind(order.totals.shipping)
        .bind(order.totals.total)
        .bind(&order.shipping_address)
        .bind(&order.billing_address)
        .bind(order.status)
        .fetch_optional(self.pool)
        .await?;

        Ok(id.map_or(InsertOutcome::AlreadyExists, |id| {
            InsertOutcome::Created(OrderId::new(id))
        }))
    }

    async fn update_status(
        &self,
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE storefront.orders
            SET status = $3, updated_at = NOW()
            WHERE id = $1 AND status = $2
            ",
        )
        .bind(id.as_uuid())
        .bind(from)
        .bind(to)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
