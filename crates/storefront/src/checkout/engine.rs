//! The order commit engine.
//!
//! Drives one commit attempt through
//! `snapshot → validated → per-line stock-reserved → persisted → committed | aborted`.
//! Stock is reserved per line with a bounded optimistic compare-and-swap;
//! any failure anywhere rolls the whole unit of work back, so an order and
//! its lines either all exist or none do, and stock is never oversold.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

use clementine_core::{AddressId, OrderId, OrderStatus, PayMethod, SkuId, UserId};

use super::store::{CheckoutStore, CheckoutUow, OrderDraft};
use crate::db::RepositoryError;

/// Why a commit attempt was aborted.
///
/// `Validation`, `Stock`, and `Conflict` carry distinct machine-readable
/// meanings so a client can fix its form, adjust quantities, or simply
/// retry; `CommitFailed` is deliberately opaque.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// Bad input: foreign address, unrecognized pay method, empty selection.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A selected sku no longer exists in the catalog.
    #[error("sku {0} not found")]
    UnknownSku(SkuId),

    /// Requested count exceeds current stock on some line.
    #[error("insufficient stock for sku {0}")]
    Stock(SkuId),

    /// Lost the stock race more times than the retry budget allows.
    #[error("could not reserve stock for sku {0}, please retry")]
    Conflict(SkuId),

    /// The transactional store failed; everything was rolled back.
    #[error("order commit failed")]
    CommitFailed(#[source] RepositoryError),
}

/// A successfully committed order.
#[derive(Debug, Clone, Serialize)]
pub struct CommittedOrder {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub pay_method: PayMethod,
    pub total_count: u32,
    pub total_amount: Decimal,
    pub freight: Decimal,
}

/// Converts a selected-lines snapshot into a durable order.
///
/// Holds no storage internals; everything runs through the
/// [`CheckoutStore`] boundary.
pub struct OrderCommitEngine<S> {
    store: S,
    freight: Decimal,
    max_attempts: u32,
}

impl<S: CheckoutStore> OrderCommitEngine<S> {
    /// Create an engine with the given freight charge and per-line CAS
    /// retry budget.
    pub const fn new(store: S, freight: Decimal, max_attempts: u32) -> Self {
        Self {
            store,
            freight,
            max_attempts,
        }
    }

    /// Commit the selected lines as a new order, stamped with the current
    /// wall clock.
    ///
    /// # Errors
    ///
    /// See [`CheckoutError`]. On any error the unit of work is fully rolled
    /// back; no partial order is ever visible.
    pub async fn commit(
        &self,
        user_id: UserId,
        address_id: AddressId,
        pay_method_code: i16,
        lines: &[(SkuId, u32)],
    ) -> Result<CommittedOrder, CheckoutError> {
        self.commit_at(user_id, address_id, pay_method_code, lines, Utc::now())
            .await
    }

    /// Commit with an explicit clock, from which the order id is derived.
    ///
    /// # Errors
    ///
    /// See [`CheckoutError`].
    pub async fn commit_at(
        &self,
        user_id: UserId,
        address_id: AddressId,
        pay_method_code: i16,
        lines: &[(SkuId, u32)],
        at: DateTime<Utc>,
    ) -> Result<CommittedOrder, CheckoutError> {
        // Validation happens before the unit of work opens: a rejected
        // commit leaves no trace.
        let pay_method = PayMethod::try_from(pay_method_code)
            .map_err(|err| CheckoutError::Validation(err.to_string()))?;

        if lines.is_empty() {
            return Err(CheckoutError::Validation(
                "no lines selected for checkout".to_owned(),
            ));
        }

        let owned = self
            .store
            .address_owned(address_id, user_id)
            .await
            .map_err(CheckoutError::CommitFailed)?;
        if !owned {
            return Err(CheckoutError::Validation(
                "address does not belong to this buyer".to_owned(),
            ));
        }

        let order_id = OrderId::derive(at, user_id);
        let status = pay_method.initial_status();
        let draft = OrderDraft {
            order_id: order_id.clone(),
            user_id,
            address_id,
            pay_method,
            status,
            freight: self.freight,
            created_at: at,
        };

        let mut uow = self
            .store
            .begin()
            .await
            .map_err(CheckoutError::CommitFailed)?;

        match self.reserve_and_persist(&mut uow, &draft, lines).await {
            Ok((total_count, total_amount)) => {
                uow.commit().await.map_err(CheckoutError::CommitFailed)?;
                tracing::info!(
                    order_id = %order_id,
                    user_id = %user_id,
                    total_count,
                    %total_amount,
                    "order committed"
                );
                Ok(CommittedOrder {
                    order_id,
                    status,
                    pay_method,
                    total_count,
                    total_amount,
                    freight: self.freight,
                })
            }
            Err(err) => {
                if let Err(rollback_err) = uow.rollback().await {
                    tracing::error!(error = %rollback_err, "rollback failed after aborted commit");
                }
                Err(err)
            }
        }
    }

    /// Insert the order row, reserve stock line by line, and persist final
    /// totals. Any error aborts the caller's unit of work.
    async fn reserve_and_persist(
        &self,
        uow: &mut S::Uow,
        draft: &OrderDraft,
        lines: &[(SkuId, u32)],
    ) -> Result<(u32, Decimal), CheckoutError> {
        uow.insert_order(draft)
            .await
            .map_err(CheckoutError::CommitFailed)?;

        let mut total_count: u32 = 0;
        let mut goods_amount = Decimal::ZERO;

        for &(sku_id, count) in lines {
            let price = self.reserve_line(uow, draft, sku_id, count).await?;
            total_count += count;
            goods_amount += price * Decimal::from(count);
        }

        let total_amount = goods_amount + self.freight;
        uow.finalize_totals(
            &draft.order_id,
            i32::try_from(total_count).unwrap_or(i32::MAX),
            total_amount,
        )
        .await
        .map_err(CheckoutError::CommitFailed)?;

        Ok((total_count, total_amount))
    }

    /// One line's read-decide-update cycle, bounded by the retry budget.
    ///
    /// Returns the unit price captured at the winning read.
    async fn reserve_line(
        &self,
        uow: &mut S::Uow,
        draft: &OrderDraft,
        sku_id: SkuId,
        count: u32,
    ) -> Result<Decimal, CheckoutError> {
        for _attempt in 0..self.max_attempts {
            let sku = uow
                .read_sku(sku_id)
                .await
                .map_err(CheckoutError::CommitFailed)?
                .ok_or(CheckoutError::UnknownSku(sku_id))?;

            if i64::from(count) > i64::from(sku.stock) {
                return Err(CheckoutError::Stock(sku_id));
            }
            // count <= stock <= i32::MAX after the check above.
            #[allow(clippy::cast_possible_wrap)]
            let count_i32 = count as i32;

            let won = uow
                .conditional_update(
                    sku_id,
                    sku.stock,
                    sku.stock - count_i32,
                    sku.sales + count_i32,
                )
                .await
                .map_err(CheckoutError::CommitFailed)?;

            if won {
                uow.insert_order_line(&draft.order_id, sku_id, count_i32, sku.price)
                    .await
                    .map_err(CheckoutError::CommitFailed)?;
                uow.bump_product_sales(sku.product_id, count_i32)
                    .await
                    .map_err(CheckoutError::CommitFailed)?;
                return Ok(sku.price);
            }

            tracing::debug!(%sku_id, "lost stock race, retrying");
        }

        Err(CheckoutError::Conflict(sku_id))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::{BTreeMap, HashSet};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    use chrono::TimeZone;
    use clementine_core::ProductId;

    use super::super::store::SkuRead;
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[derive(Debug, Clone)]
    struct MemSku {
        product_id: ProductId,
        price: Decimal,
        stock: i32,
        sales: i32,
    }

    #[derive(Debug, Clone)]
    struct MemOrder {
        draft: OrderDraft,
        total_count: i32,
        total_amount: Decimal,
    }

    #[derive(Debug, Default)]
    struct MemState {
        skus: BTreeMap<SkuId, MemSku>,
        product_sales: BTreeMap<ProductId, i64>,
        addresses: HashSet<(AddressId, UserId)>,
        orders: BTreeMap<String, MemOrder>,
        order_lines: Vec<(String, SkuId, i32, Decimal)>,
    }

    /// In-memory checkout store mirroring the transactional semantics the
    /// engine relies on: stock CAS is visible across units of work as soon
    /// as it wins, order rows become visible only on commit, and rollback
    /// reverses every reservation this unit of work made.
    #[derive(Clone)]
    struct MemStore {
        state: Arc<Mutex<MemState>>,
        /// Force the next N conditional updates to lose their race.
        contend: Arc<AtomicU32>,
        /// Simulate a store failure at the final totals write.
        fail_finalize: bool,
    }

    impl MemStore {
        fn new(state: MemState) -> Self {
            Self {
                state: Arc::new(Mutex::new(state)),
                contend: Arc::new(AtomicU32::new(0)),
                fail_finalize: false,
            }
        }

        fn stock_of(&self, sku_id: SkuId) -> i32 {
            self.state.lock().unwrap().skus[&sku_id].stock
        }

        fn sales_of(&self, sku_id: SkuId) -> i32 {
            self.state.lock().unwrap().skus[&sku_id].sales
        }

        fn order_count(&self) -> usize {
            self.state.lock().unwrap().orders.len()
        }
    }

    struct MemUow {
        state: Arc<Mutex<MemState>>,
        contend: Arc<AtomicU32>,
        fail_finalize: bool,
        // Reservations applied by this unit of work, reversed on rollback.
        stock_undo: Vec<(SkuId, i32)>,
        product_undo: Vec<(ProductId, i32)>,
        staged_order: Option<OrderDraft>,
        staged_lines: Vec<(SkuId, i32, Decimal)>,
        staged_totals: Option<(i32, Decimal)>,
    }

    impl CheckoutStore for MemStore {
        type Uow = MemUow;

        async fn address_owned(
            &self,
            address_id: AddressId,
            user_id: UserId,
        ) -> Result<bool, RepositoryError> {
            Ok(self
                .state
                .lock()
                .unwrap()
                .addresses
                .contains(&(address_id, user_id)))
        }

        async fn begin(&self) -> Result<Self::Uow, RepositoryError> {
            Ok(MemUow {
                state: Arc::clone(&self.state),
                contend: Arc::clone(&self.contend),
                fail_finalize: self.fail_finalize,
                stock_undo: Vec::new(),
                product_undo: Vec::new(),
                staged_order: None,
                staged_lines: Vec::new(),
                staged_totals: None,
            })
        }
    }

    impl CheckoutUow for MemUow {
        async fn read_sku(&mut self, sku_id: SkuId) -> Result<Option<SkuRead>, RepositoryError> {
            Ok(self.state.lock().unwrap().skus.get(&sku_id).map(|sku| {
                SkuRead {
                    product_id: sku.product_id,
                    price: sku.price,
                    stock: sku.stock,
                    sales: sku.sales,
                }
            }))
        }

        async fn conditional_update(
            &mut self,
            sku_id: SkuId,
            expected_stock: i32,
            new_stock: i32,
            new_sales: i32,
        ) -> Result<bool, RepositoryError> {
            if self
                .contend
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Ok(false);
            }

            let mut state = self.state.lock().unwrap();
            let sku = state.skus.get_mut(&sku_id).ok_or(RepositoryError::NotFound)?;
            if sku.stock != expected_stock {
                return Ok(false);
            }
            let reserved = expected_stock - new_stock;
            sku.stock = new_stock;
            sku.sales = new_sales;
            self.stock_undo.push((sku_id, reserved));
            Ok(true)
        }

        async fn bump_product_sales(
            &mut self,
            product_id: ProductId,
            delta: i32,
        ) -> Result<(), RepositoryError> {
            *self
                .state
                .lock()
                .unwrap()
                .product_sales
                .entry(product_id)
                .or_default() += i64::from(delta);
            self.product_undo.push((product_id, delta));
            Ok(())
        }

        async fn insert_order(&mut self, draft: &OrderDraft) -> Result<(), RepositoryError> {
            if self
                .state
                .lock()
                .unwrap()
                .orders
                .contains_key(draft.order_id.as_str())
            {
                return Err(RepositoryError::Conflict(
                    "order id already exists".to_owned(),
                ));
            }
            self.staged_order = Some(draft.clone());
            Ok(())
        }

        async fn insert_order_line(
            &mut self,
            _order_id: &OrderId,
            sku_id: SkuId,
            count: i32,
            unit_price: Decimal,
        ) -> Result<(), RepositoryError> {
            self.staged_lines.push((sku_id, count, unit_price));
            Ok(())
        }

        async fn finalize_totals(
            &mut self,
            _order_id: &OrderId,
            total_count: i32,
            total_amount: Decimal,
        ) -> Result<(), RepositoryError> {
            if self.fail_finalize {
                return Err(RepositoryError::DataCorruption(
                    "simulated store failure".to_owned(),
                ));
            }
            self.staged_totals = Some((total_count, total_amount));
            Ok(())
        }

        async fn commit(self) -> Result<(), RepositoryError> {
            let mut state = self.state.lock().unwrap();
            let draft = self.staged_order.ok_or(RepositoryError::NotFound)?;
            let (total_count, total_amount) = self.staged_totals.unwrap_or((0, Decimal::ZERO));
            let key = draft.order_id.as_str().to_owned();
            for (sku_id, count, unit_price) in self.staged_lines {
                state
                    .order_lines
                    .push((key.clone(), sku_id, count, unit_price));
            }
            state.orders.insert(
                key,
                MemOrder {
                    draft,
                    total_count,
                    total_amount,
                },
            );
            Ok(())
        }

        async fn rollback(self) -> Result<(), RepositoryError> {
            let mut state = self.state.lock().unwrap();
            for (sku_id, reserved) in self.stock_undo {
                if let Some(sku) = state.skus.get_mut(&sku_id) {
                    sku.stock += reserved;
                    sku.sales -= reserved;
                }
            }
            for (product_id, delta) in self.product_undo {
                if let Some(sales) = state.product_sales.get_mut(&product_id) {
                    *sales -= i64::from(delta);
                }
            }
            Ok(())
        }
    }

    const FREIGHT: &str = "10.00";

    fn seeded_state() -> MemState {
        let mut state = MemState::default();
        state.skus.insert(
            SkuId::new(101),
            MemSku {
                product_id: ProductId::new(1),
                price: dec("3.50"),
                stock: 5,
                sales: 0,
            },
        );
        state.skus.insert(
            SkuId::new(102),
            MemSku {
                product_id: ProductId::new(2),
                price: dec("7.25"),
                stock: 4,
                sales: 0,
            },
        );
        state
            .addresses
            .insert((AddressId::new(1), UserId::new(42)));
        state
            .addresses
            .insert((AddressId::new(2), UserId::new(43)));
        state
    }

    fn engine(store: MemStore) -> OrderCommitEngine<MemStore> {
        OrderCommitEngine::new(store, FREIGHT.parse().unwrap(), 3)
    }

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 6, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_commit_totals_and_price_snapshot() {
        let store = MemStore::new(seeded_state());
        let engine = engine(store.clone());

        let order = engine
            .commit_at(
                UserId::new(42),
                AddressId::new(1),
                PayMethod::Online.as_i16(),
                &[(SkuId::new(101), 2), (SkuId::new(102), 1)],
                noon(),
            )
            .await
            .unwrap();

        assert_eq!(order.total_count, 3);
        // total_amount == freight + sum(count * unit_price)
        assert_eq!(order.total_amount, dec("24.25"));
        assert_eq!(order.status, OrderStatus::Unpaid);

        assert_eq!(store.stock_of(SkuId::new(101)), 3);
        assert_eq!(store.sales_of(SkuId::new(101)), 2);
        assert_eq!(store.stock_of(SkuId::new(102)), 3);

        let state = store.state.lock().unwrap();
        assert_eq!(state.product_sales[&ProductId::new(1)], 2);
        assert_eq!(state.product_sales[&ProductId::new(2)], 1);
        let committed = &state.orders[order.order_id.as_str()];
        assert_eq!(committed.total_count, 3);
        assert_eq!(committed.total_amount, dec("24.25"));
        assert_eq!(committed.draft.pay_method, PayMethod::Online);
        assert_eq!(committed.draft.address_id, AddressId::new(1));
        assert_eq!(state.order_lines.len(), 2);
        // Unit prices captured at commit.
        assert!(state
            .order_lines
            .iter()
            .any(|(_, sku, count, price)| *sku == SkuId::new(101)
                && *count == 2
                && *price == dec("3.50")));
    }

    #[tokio::test]
    async fn test_unknown_pay_method_is_validation_error() {
        let store = MemStore::new(seeded_state());
        let engine = engine(store.clone());

        let err = engine
            .commit_at(
                UserId::new(42),
                AddressId::new(1),
                99,
                &[(SkuId::new(101), 1)],
                noon(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, CheckoutError::Validation(_)));
        assert_eq!(store.order_count(), 0);
    }

    #[tokio::test]
    async fn test_foreign_address_is_validation_error_with_no_side_effects() {
        let store = MemStore::new(seeded_state());
        let engine = engine(store.clone());

        // Address 2 belongs to user 43, not 42.
        let err = engine
            .commit_at(
                UserId::new(42),
                AddressId::new(2),
                PayMethod::Online.as_i16(),
                &[(SkuId::new(101), 1)],
                noon(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, CheckoutError::Validation(_)));
        assert_eq!(store.order_count(), 0);
        assert_eq!(store.stock_of(SkuId::new(101)), 5);
        assert_eq!(store.sales_of(SkuId::new(101)), 0);
    }

    #[tokio::test]
    async fn test_empty_selection_is_validation_error() {
        let store = MemStore::new(seeded_state());
        let engine = engine(store.clone());

        let err = engine
            .commit_at(
                UserId::new(42),
                AddressId::new(1),
                PayMethod::Online.as_i16(),
                &[],
                noon(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, CheckoutError::Validation(_)));
    }

    #[tokio::test]
    async fn test_insufficient_stock_aborts_whole_order() {
        let store = MemStore::new(seeded_state());
        let engine = engine(store.clone());

        // First line fits, second asks for more than its stock of 4.
        let err = engine
            .commit_at(
                UserId::new(42),
                AddressId::new(1),
                PayMethod::Online.as_i16(),
                &[(SkuId::new(101), 2), (SkuId::new(102), 10)],
                noon(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, CheckoutError::Stock(sku) if sku == SkuId::new(102)));
        // The first line's reservation was rolled back with the rest.
        assert_eq!(store.stock_of(SkuId::new(101)), 5);
        assert_eq!(store.sales_of(SkuId::new(101)), 0);
        assert_eq!(store.stock_of(SkuId::new(102)), 4);
        assert_eq!(store.order_count(), 0);
        assert!(store.state.lock().unwrap().order_lines.is_empty());
        assert!(store.state.lock().unwrap().product_sales.values().all(|s| *s == 0));
    }

    #[tokio::test]
    async fn test_lost_cas_race_retries_and_succeeds() {
        let store = MemStore::new(seeded_state());
        store.contend.store(2, Ordering::SeqCst);
        let engine = engine(store.clone());

        let order = engine
            .commit_at(
                UserId::new(42),
                AddressId::new(1),
                PayMethod::Online.as_i16(),
                &[(SkuId::new(101), 3)],
                noon(),
            )
            .await
            .unwrap();

        assert_eq!(order.total_count, 3);
        assert_eq!(store.stock_of(SkuId::new(101)), 2);
    }

    #[tokio::test]
    async fn test_exhausted_retry_budget_is_conflict() {
        let store = MemStore::new(seeded_state());
        store.contend.store(10, Ordering::SeqCst);
        let engine = engine(store.clone());

        let err = engine
            .commit_at(
                UserId::new(42),
                AddressId::new(1),
                PayMethod::Online.as_i16(),
                &[(SkuId::new(101), 1)],
                noon(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, CheckoutError::Conflict(sku) if sku == SkuId::new(101)));
        assert_eq!(store.stock_of(SkuId::new(101)), 5);
        assert_eq!(store.order_count(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_order_id_is_rejected_by_uniqueness_guard() {
        let store = MemStore::new(seeded_state());
        let engine = engine(store.clone());

        // Same buyer, same clock second: the derived ids collide and the
        // persistence guard rejects the second insert.
        engine
            .commit_at(
                UserId::new(42),
                AddressId::new(1),
                PayMethod::Online.as_i16(),
                &[(SkuId::new(101), 1)],
                noon(),
            )
            .await
            .unwrap();

        let err = engine
            .commit_at(
                UserId::new(42),
                AddressId::new(1),
                PayMethod::Online.as_i16(),
                &[(SkuId::new(101), 1)],
                noon(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, CheckoutError::CommitFailed(_)));
        // Only the first commit touched stock.
        assert_eq!(store.stock_of(SkuId::new(101)), 4);
        assert_eq!(store.order_count(), 1);
    }

    #[tokio::test]
    async fn test_store_failure_rolls_back_reservations() {
        let mut store = MemStore::new(seeded_state());
        store.fail_finalize = true;
        let engine = engine(store.clone());

        let err = engine
            .commit_at(
                UserId::new(42),
                AddressId::new(1),
                PayMethod::Online.as_i16(),
                &[(SkuId::new(101), 2)],
                noon(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, CheckoutError::CommitFailed(_)));
        assert_eq!(store.stock_of(SkuId::new(101)), 5);
        assert_eq!(store.sales_of(SkuId::new(101)), 0);
        assert_eq!(store.order_count(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_commits_never_oversell() {
        // Stock 5, two buyers each want 3: exactly one can win.
        let store = MemStore::new(seeded_state());
        let barrier = Arc::new(tokio::sync::Barrier::new(2));

        let mut handles = Vec::new();
        for (user, address) in [(42, 1), (43, 2)] {
            let store = store.clone();
            let barrier = Arc::clone(&barrier);
            handles.push(tokio::spawn(async move {
                let engine = engine(store);
                barrier.wait().await;
                engine
                    .commit_at(
                        UserId::new(user),
                        AddressId::new(address),
                        PayMethod::Online.as_i16(),
                        &[(SkuId::new(101), 3)],
                        noon(),
                    )
                    .await
            }));
        }

        let mut ok = 0;
        let mut out_of_stock = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => ok += 1,
                Err(CheckoutError::Stock(_)) => out_of_stock += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(ok, 1);
        assert_eq!(out_of_stock, 1);
        assert_eq!(store.stock_of(SkuId::new(101)), 2);
        assert_eq!(store.sales_of(SkuId::new(101)), 3);
        assert_eq!(store.order_count(), 1);
    }
}
