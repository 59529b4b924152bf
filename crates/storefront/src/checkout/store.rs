//! Transactional boundary for order commit.
//!
//! The engine sees two traits: [`CheckoutStore`] opens a unit of work, and
//! [`CheckoutUow`] is the scoped transaction it runs inside — every write
//! in a commit attempt goes through one unit of work and becomes visible
//! all at once on [`commit`](CheckoutUow::commit), or not at all on
//! [`rollback`](CheckoutUow::rollback).
//!
//! The conditional update here is the sole legal mutation path for sku
//! stock and sales.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};

use clementine_core::{AddressId, OrderId, OrderStatus, PayMethod, ProductId, SkuId, UserId};

use crate::db::RepositoryError;

/// Stock, sales, and price of a sku as read inside the unit of work.
#[derive(Debug, Clone)]
pub struct SkuRead {
    pub product_id: ProductId,
    pub price: Decimal,
    pub stock: i32,
    pub sales: i32,
}

/// The order row as first inserted, with zeroed running totals.
#[derive(Debug, Clone)]
pub struct OrderDraft {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub address_id: AddressId,
    pub pay_method: PayMethod,
    pub status: OrderStatus,
    pub freight: Decimal,
    pub created_at: DateTime<Utc>,
}

/// A scoped unit of work for one commit attempt.
pub trait CheckoutUow: Send {
    /// Read a sku's current stock, sales, and price.
    async fn read_sku(&mut self, sku_id: SkuId) -> Result<Option<SkuRead>, RepositoryError>;

    /// Compare-and-swap on the stock counter: writes `new_stock`/`new_sales`
    /// only if stock still equals `expected_stock`. Returns whether the
    /// swap won.
    async fn conditional_update(
        &mut self,
        sku_id: SkuId,
        expected_stock: i32,
        new_stock: i32,
        new_sales: i32,
    ) -> Result<bool, RepositoryError>;

    /// Bump the parent product's aggregate sales.
    async fn bump_product_sales(
        &mut self,
        product_id: ProductId,
        delta: i32,
    ) -> Result<(), RepositoryError>;

    /// Insert the order row. Fails with `RepositoryError::Conflict` if the
    /// derived order id already exists (same buyer, same clock second).
    async fn insert_order(&mut self, draft: &OrderDraft) -> Result<(), RepositoryError>;

    /// Insert one order line with the price captured at reservation time.
    async fn insert_order_line(
        &mut self,
        order_id: &OrderId,
        sku_id: SkuId,
        count: i32,
        unit_price: Decimal,
    ) -> Result<(), RepositoryError>;

    /// Persist the final order totals.
    async fn finalize_totals(
        &mut self,
        order_id: &OrderId,
        total_count: i32,
        total_amount: Decimal,
    ) -> Result<(), RepositoryError>;

    /// Make every write in this unit of work durable.
    async fn commit(self) -> Result<(), RepositoryError>;

    /// Discard every write in this unit of work.
    async fn rollback(self) -> Result<(), RepositoryError>;
}

/// Opens units of work and answers pre-transaction validation reads.
pub trait CheckoutStore {
    type Uow: CheckoutUow;

    /// Whether `address_id` belongs to `user_id`.
    async fn address_owned(
        &self,
        address_id: AddressId,
        user_id: UserId,
    ) -> Result<bool, RepositoryError>;

    /// Open a new unit of work.
    async fn begin(&self) -> Result<Self::Uow, RepositoryError>;
}

/// `PostgreSQL` checkout store.
#[derive(Clone)]
pub struct PgCheckoutStore {
    pool: PgPool,
}

impl PgCheckoutStore {
    /// Create a store over the given pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl CheckoutStore for PgCheckoutStore {
    type Uow = PgCheckoutUow;

    async fn address_owned(
        &self,
        address_id: AddressId,
        user_id: UserId,
    ) -> Result<bool, RepositoryError> {
        let row: Option<(i32,)> = sqlx::query_as(
            r"
            SELECT 1
            FROM address
            WHERE id = $1 AND user_id = $2
            ",
        )
        .bind(address_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.is_some())
    }

    async fn begin(&self) -> Result<Self::Uow, RepositoryError> {
        let tx = self.pool.begin().await?;
        Ok(PgCheckoutUow { tx })
    }
}

/// A `PostgreSQL` transaction wrapped as a checkout unit of work.
pub struct PgCheckoutUow {
    tx: Transaction<'static, Postgres>,
}

impl CheckoutUow for PgCheckoutUow {
    async fn read_sku(&mut self, sku_id: SkuId) -> Result<Option<SkuRead>, RepositoryError> {
        let row: Option<(ProductId, Decimal, i32, i32)> = sqlx::query_as(
            r"
            SELECT product_id, price, stock, sales
            FROM sku
            WHERE id = $1
            ",
        )
        .bind(sku_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.map(|(product_id, price, stock, sales)| SkuRead {
            product_id,
            price,
            stock,
            sales,
        }))
    }

    async fn conditional_update(
        &mut self,
        sku_id: SkuId,
        expected_stock: i32,
        new_stock: i32,
        new_sales: i32,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE sku
            SET stock = $3, sales = $4
            WHERE id = $1 AND stock = $2
            ",
        )
        .bind(sku_id)
        .bind(expected_stock)
        .bind(new_stock)
        .bind(new_sales)
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn bump_product_sales(
        &mut self,
        product_id: ProductId,
        delta: i32,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            UPDATE product
            SET sales = sales + $2
            WHERE id = $1
            ",
        )
        .bind(product_id)
        .bind(delta)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn insert_order(&mut self, draft: &OrderDraft) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO orders
                (order_id, user_id, address_id, pay_method, status,
                 total_count, total_amount, freight, created_at)
            VALUES ($1, $2, $3, $4, $5, 0, 0, $6, $7)
            ",
        )
        .bind(&draft.order_id)
        .bind(draft.user_id)
        .bind(draft.address_id)
        .bind(draft.pay_method)
        .bind(draft.status)
        .bind(draft.freight)
        .bind(draft.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_unique_violation()
            {
                return RepositoryError::Conflict("order id already exists".to_owned());
            }
            RepositoryError::Database(e)
        })?;

        Ok(())
    }

    async fn insert_order_line(
        &mut self,
        order_id: &OrderId,
        sku_id: SkuId,
        count: i32,
        unit_price: Decimal,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO order_line (order_id, sku_id, count, unit_price)
            VALUES ($1, $2, $3, $4)
            ",
        )
        .bind(order_id)
        .bind(sku_id)
        .bind(count)
        .bind(unit_price)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn finalize_totals(
        &mut self,
        order_id: &OrderId,
        total_count: i32,
        total_amount: Decimal,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE orders
            SET total_count = $2, total_amount = $3
            WHERE order_id = $1
            ",
        )
        .bind(order_id)
        .bind(total_count)
        .bind(total_amount)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        Ok(())
    }

    async fn commit(self) -> Result<(), RepositoryError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<(), RepositoryError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
