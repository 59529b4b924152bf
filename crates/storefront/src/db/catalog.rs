//! Catalog repository: sku and product reads.
//!
//! This is the read side of the catalog collaborator. The mutating side
//! (conditional stock decrement, sales bumps) runs inside the checkout unit
//! of work and lives in [`crate::checkout::store`]; no other code writes
//! stock or sales.

use rust_decimal::Decimal;
use sqlx::PgPool;

use clementine_core::{ProductId, SkuId};

use super::RepositoryError;

/// A purchasable sku row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Sku {
    pub id: SkuId,
    pub product_id: ProductId,
    pub name: String,
    pub price: Decimal,
    pub stock: i32,
    pub sales: i32,
}

/// Repository for catalog reads.
pub struct CatalogRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CatalogRepository<'a> {
    /// Create a new catalog repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get one sku by id.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn find(&self, sku_id: SkuId) -> Result<Option<Sku>, RepositoryError> {
        let sku = sqlx::query_as::<_, Sku>(
            r"
            SELECT id, product_id, name, price, stock, sales
            FROM sku
            WHERE id = $1
            ",
        )
        .bind(sku_id)
        .fetch_optional(self.pool)
        .await?;

        Ok(sku)
    }

    /// Get many skus by id, in id order.
    ///
    /// Unknown ids are silently absent from the result; callers decide
    /// whether a missing sku matters.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn find_many(&self, sku_ids: &[SkuId]) -> Result<Vec<Sku>, RepositoryError> {
        if sku_ids.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<i32> = sku_ids.iter().map(|id| id.as_i32()).collect();
        let skus = sqlx::query_as::<_, Sku>(
            r"
            SELECT id, product_id, name, price, stock, sales
            FROM sku
            WHERE id = ANY($1)
            ORDER BY id
            ",
        )
        .bind(&ids)
        .fetch_all(self.pool)
        .await?;

        Ok(skus)
    }
}
