//! Order repository: reads over committed orders.
//!
//! Order rows are only ever created inside the checkout unit of work
//! ([`crate::checkout::store`]); this repository serves the read path
//! (order detail after commit). Orders are never deleted.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;

use clementine_core::{AddressId, OrderId, OrderStatus, PayMethod, SkuId, UserId};

use super::RepositoryError;

/// A committed order row.
#[derive(Debug, Clone, serde::Serialize, sqlx::FromRow)]
pub struct Order {
    pub order_id: OrderId,
    #[serde(skip)]
    pub user_id: UserId,
    pub address_id: AddressId,
    pub pay_method: PayMethod,
    pub status: OrderStatus,
    pub total_count: i32,
    pub total_amount: Decimal,
    pub freight: Decimal,
    pub created_at: DateTime<Utc>,
}

/// An order line joined with its sku name for display.
#[derive(Debug, Clone, serde::Serialize, sqlx::FromRow)]
pub struct OrderLineDetail {
    pub sku_id: SkuId,
    pub name: String,
    pub count: i32,
    /// Price captured at commit time; never updated afterwards.
    pub unit_price: Decimal,
}

/// Repository for order reads.
pub struct OrderRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> OrderRepository<'a> {
    /// Create a new order repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get an order only if it belongs to `user_id`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn find_for_user(
        &self,
        order_id: &OrderId,
        user_id: UserId,
    ) -> Result<Option<Order>, RepositoryError> {
        let order = sqlx::query_as::<_, Order>(
            r"
            SELECT order_id, user_id, address_id, pay_method, status,
                   total_count, total_amount, freight, created_at
            FROM orders
            WHERE order_id = $1 AND user_id = $2
            ",
        )
        .bind(order_id)
        .bind(user_id)
        .fetch_optional(self.pool)
        .await?;

        Ok(order)
    }

    /// The lines of an order, joined with sku names, in sku order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn lines(
        &self,
        order_id: &OrderId,
    ) -> Result<Vec<OrderLineDetail>, RepositoryError> {
        let lines = sqlx::query_as::<_, OrderLineDetail>(
            r"
            SELECT l.sku_id, s.name, l.count, l.unit_price
            FROM order_line l
            JOIN sku s ON s.id = l.sku_id
            WHERE l.order_id = $1
            ORDER BY l.sku_id
            ",
        )
        .bind(order_id)
        .fetch_all(self.pool)
        .await?;

        Ok(lines)
    }
}
