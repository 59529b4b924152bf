//! Checkout route handlers: settlement, order commit, order detail.
//!
//! All three require a signed-in buyer and read only the server-side cart;
//! an anonymous buyer is expected to sign in (merging their cart) before
//! checking out.

use axum::{
    Json,
    extract::{Path, State},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use clementine_core::{AddressId, OrderId, SkuId};

use crate::cart::{ActiveCart, CartStore};
use crate::checkout::{CommittedOrder, OrderCommitEngine, PgCheckoutStore};
use crate::db::addresses::Address;
use crate::db::orders::{Order, OrderLineDetail};
use crate::db::{AddressRepository, CatalogRepository, OrderRepository};
use crate::error::{AppError, Result};
use crate::middleware::{Identity, RequireCustomer};
use crate::state::AppState;

/// One selected line priced for the settlement page.
#[derive(Debug, Serialize)]
pub struct SettlementLine {
    pub sku_id: SkuId,
    pub name: String,
    pub price: Decimal,
    pub count: u32,
    pub amount: Decimal,
}

/// Settlement view: what the buyer confirms before committing.
#[derive(Debug, Serialize)]
pub struct SettlementView {
    pub addresses: Vec<Address>,
    pub lines: Vec<SettlementLine>,
    pub total_count: u64,
    pub total_amount: Decimal,
    pub freight: Decimal,
    pub payment_amount: Decimal,
}

/// Commit request body.
#[derive(Debug, Deserialize)]
pub struct CommitOrderForm {
    pub address_id: AddressId,
    pub pay_method: i16,
}

/// Order detail view.
#[derive(Debug, Serialize)]
pub struct OrderDetailView {
    #[serde(flatten)]
    pub order: Order,
    pub lines: Vec<OrderLineDetail>,
}

/// Settlement page data: addresses plus the selected lines, priced now.
///
/// Prices shown here are informational; the binding price snapshot is taken
/// again inside the commit transaction.
#[instrument(skip(state, customer))]
pub async fn settlement(
    State(state): State<AppState>,
    RequireCustomer(customer): RequireCustomer,
) -> Result<Json<SettlementView>> {
    let addresses = AddressRepository::new(state.pool())
        .list_for_user(customer.id)
        .await?;

    let identity = Identity::Customer(customer);
    let mut cart = ActiveCart::for_identity(state.pool(), &identity);
    let snapshot = cart.snapshot().await?;
    let selected = snapshot.selected_lines();

    let sku_ids: Vec<SkuId> = selected.iter().map(|(id, _)| *id).collect();
    let skus = CatalogRepository::new(state.pool()).find_many(&sku_ids).await?;

    let mut lines = Vec::with_capacity(selected.len());
    let mut total_count: u64 = 0;
    let mut total_amount = Decimal::ZERO;
    for sku in skus {
        let Some((_, count)) = selected.iter().find(|(id, _)| *id == sku.id) else {
            continue;
        };
        let amount = sku.price * Decimal::from(*count);
        total_count += u64::from(*count);
        total_amount += amount;
        lines.push(SettlementLine {
            sku_id: sku.id,
            name: sku.name,
            price: sku.price,
            count: *count,
            amount,
        });
    }

    let freight = state.config().freight;
    Ok(Json(SettlementView {
        addresses,
        lines,
        total_count,
        total_amount,
        freight,
        payment_amount: total_amount + freight,
    }))
}

/// Commit the selected cart lines as a durable order.
///
/// On success the purchased lines (and only those) are purged from the
/// buyer's cart.
#[instrument(skip(state, customer))]
pub async fn commit(
    State(state): State<AppState>,
    RequireCustomer(customer): RequireCustomer,
    Json(form): Json<CommitOrderForm>,
) -> Result<Json<CommittedOrder>> {
    let identity = Identity::Customer(customer);
    let mut cart = ActiveCart::for_identity(state.pool(), &identity);
    let selected = cart.snapshot().await?.selected_lines();

    let engine = OrderCommitEngine::new(
        PgCheckoutStore::new(state.pool().clone()),
        state.config().freight,
        state.config().stock_retry_attempts,
    );
    let order = engine
        .commit(customer.id, form.address_id, form.pay_method, &selected)
        .await?;

    // The order is durable at this point; a failed purge leaves stale cart
    // lines but must not fail the request.
    let purchased: Vec<SkuId> = selected.iter().map(|(id, _)| *id).collect();
    if let Err(err) = cart.purge(&purchased).await {
        tracing::error!(
            order_id = %order.order_id,
            error = %err,
            "failed to purge purchased lines from cart"
        );
    }

    Ok(Json(order))
}

/// Order detail after commit.
#[instrument(skip(state, customer))]
pub async fn detail(
    State(state): State<AppState>,
    RequireCustomer(customer): RequireCustomer,
    Path(order_id): Path<String>,
) -> Result<Json<OrderDetailView>> {
    let order_id = OrderId::from(order_id);
    let orders = OrderRepository::new(state.pool());

    let order = orders
        .find_for_user(&order_id, customer.id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("order {order_id}")))?;
    let lines = orders.lines(&order_id).await?;

    Ok(Json(OrderDetailView { order, lines }))
}
