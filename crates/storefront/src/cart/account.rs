//! Authenticated cart backend over the `cart_line` table.
//!
//! Count and selection live on the same row, so every operation here is a
//! single SQL statement: a concurrent reader sees either the whole mutation
//! or none of it, never a quantity change without its selection change.

use clementine_core::{CartLine, CartSnapshot, SkuId, UserId};
use sqlx::PgPool;

use super::{CartError, CartStore};

/// Server-side cart for one signed-in buyer.
pub struct AccountCart<'a> {
    pool: &'a PgPool,
    user_id: UserId,
}

impl<'a> AccountCart<'a> {
    /// Create a cart handle for `user_id`.
    #[must_use]
    pub const fn new(pool: &'a PgPool, user_id: UserId) -> Self {
        Self { pool, user_id }
    }

    /// Fold one anonymous line into this cart: count adds, selection
    /// overwrites. Used only by the login merge.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Store` if the upsert fails.
    pub async fn merge_line(
        &self,
        sku_id: SkuId,
        count: u32,
        selected: bool,
    ) -> Result<(), CartError> {
        sqlx::query(
            r"
            INSERT INTO cart_line (user_id, sku_id, count, selected)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, sku_id)
            DO UPDATE SET count = cart_line.count + EXCLUDED.count,
                          selected = EXCLUDED.selected
            ",
        )
        .bind(self.user_id)
        .bind(sku_id)
        .bind(i64::from(count))
        .bind(selected)
        .execute(self.pool)
        .await
        .map_err(crate::db::RepositoryError::from)?;

        Ok(())
    }
}

impl CartStore for AccountCart<'_> {
    async fn snapshot(&mut self) -> Result<CartSnapshot, CartError> {
        let rows: Vec<(SkuId, i64, bool)> = sqlx::query_as(
            r"
            SELECT sku_id, count, selected
            FROM cart_line
            WHERE user_id = $1
            ORDER BY sku_id
            ",
        )
        .bind(self.user_id)
        .fetch_all(self.pool)
        .await
        .map_err(crate::db::RepositoryError::from)?;

        Ok(rows
            .into_iter()
            .map(|(sku_id, count, selected)| {
                (
                    sku_id,
                    CartLine {
                        count: u32::try_from(count).unwrap_or(0),
                        selected,
                    },
                )
            })
            .filter(|(_, line)| line.count > 0)
            .collect())
    }

    async fn apply_delta(
        &mut self,
        sku_id: SkuId,
        delta: u32,
        selected_default: bool,
    ) -> Result<(), CartError> {
        if delta == 0 {
            return Ok(());
        }
        // `selected OR EXCLUDED.selected`: ticking is sticky on add, an
        // untick only happens through an explicit selection change.
        sqlx::query(
            r"
            INSERT INTO cart_line (user_id, sku_id, count, selected)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, sku_id)
            DO UPDATE SET count = cart_line.count + EXCLUDED.count,
                          selected = cart_line.selected OR EXCLUDED.selected
            ",
        )
        .bind(self.user_id)
        .bind(sku_id)
        .bind(i64::from(delta))
        .bind(selected_default)
        .execute(self.pool)
        .await
        .map_err(crate::db::RepositoryError::from)?;

        Ok(())
    }

    async fn set_line(
        &mut self,
        sku_id: SkuId,
        count: u32,
        selected: bool,
    ) -> Result<(), CartError> {
        if count == 0 {
            return self.remove(sku_id).await;
        }
        sqlx::query(
            r"
            INSERT INTO cart_line (user_id, sku_id, count, selected)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, sku_id)
            DO UPDATE SET count = EXCLUDED.count,
                          selected = EXCLUDED.selected
            ",
        )
        .bind(self.user_id)
        .bind(sku_id)
        .bind(i64::from(count))
        .bind(selected)
        .execute(self.pool)
        .await
        .map_err(crate::db::RepositoryError::from)?;

        Ok(())
    }

    async fn set_selection(&mut self, sku_id: SkuId, selected: bool) -> Result<(), CartError> {
        sqlx::query(
            r"
            UPDATE cart_line
            SET selected = $3
            WHERE user_id = $1 AND sku_id = $2
            ",
        )
        .bind(self.user_id)
        .bind(sku_id)
        .bind(selected)
        .execute(self.pool)
        .await
        .map_err(crate::db::RepositoryError::from)?;

        Ok(())
    }

    async fn set_selection_all(&mut self, selected: bool) -> Result<(), CartError> {
        sqlx::query(
            r"
            UPDATE cart_line
            SET selected = $2
            WHERE user_id = $1
            ",
        )
        .bind(self.user_id)
        .bind(selected)
        .execute(self.pool)
        .await
        .map_err(crate::db::RepositoryError::from)?;

        Ok(())
    }

    async fn remove(&mut self, sku_id: SkuId) -> Result<(), CartError> {
        sqlx::query(
            r"
            DELETE FROM cart_line
            WHERE user_id = $1 AND sku_id = $2
            ",
        )
        .bind(self.user_id)
        .bind(sku_id)
        .execute(self.pool)
        .await
        .map_err(crate::db::RepositoryError::from)?;

        Ok(())
    }

    async fn purge(&mut self, sku_ids: &[SkuId]) -> Result<(), CartError> {
        if sku_ids.is_empty() {
            return Ok(());
        }
        let ids: Vec<i32> = sku_ids.iter().map(|id| id.as_i32()).collect();
        sqlx::query(
            r"
            DELETE FROM cart_line
            WHERE user_id = $1 AND sku_id = ANY($2)
            ",
        )
        .bind(self.user_id)
        .bind(&ids)
        .execute(self.pool)
        .await
        .map_err(crate::db::RepositoryError::from)?;

        Ok(())
    }
}
