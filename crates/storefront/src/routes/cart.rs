//! Cart route handlers.
//!
//! Every endpoint works for both identities: signed-in buyers hit the
//! `cart_line` table, anonymous buyers get their mutated cart back as a
//! refreshed cookie on the response. Handlers validate against the catalog,
//! then talk to the cart purely through [`CartStore`].

use axum::{
    Json,
    extract::State,
    http::header,
    response::{AppendHeaders, IntoResponse, Response},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use clementine_core::{CartSnapshot, SkuId};

use crate::cart::{ActiveCart, CartStore, GuestCart, guest, merge_into_account};
use crate::db::CatalogRepository;
use crate::error::{AppError, Result};
use crate::middleware::{GuestCartToken, Identity, RequireCustomer};
use crate::state::AppState;

/// One cart line joined with its catalog data.
#[derive(Debug, Serialize)]
pub struct CartLineView {
    pub sku_id: SkuId,
    pub name: String,
    pub price: Decimal,
    pub count: u32,
    pub selected: bool,
    /// `price * count` for this line.
    pub amount: Decimal,
}

/// Full cart display data.
#[derive(Debug, Serialize)]
pub struct CartView {
    pub lines: Vec<CartLineView>,
    pub total_count: u64,
}

/// Mini cart line (header badge dropdown).
#[derive(Debug, Serialize)]
pub struct CartSummaryLine {
    pub sku_id: SkuId,
    pub name: String,
    pub count: u32,
}

/// Mini cart display data.
#[derive(Debug, Serialize)]
pub struct CartSummary {
    pub lines: Vec<CartSummaryLine>,
    pub total_count: u64,
}

/// Count returned after cart mutations.
#[derive(Debug, Serialize)]
pub struct CartTotals {
    pub total_count: u64,
}

/// Add to cart request body.
#[derive(Debug, Deserialize)]
pub struct AddToCartForm {
    pub sku_id: SkuId,
    pub count: u32,
    pub selected: Option<bool>,
}

/// Update cart request body (absolute set).
#[derive(Debug, Deserialize)]
pub struct UpdateCartForm {
    pub sku_id: SkuId,
    pub count: u32,
    pub selected: bool,
}

/// Remove from cart request body.
#[derive(Debug, Deserialize)]
pub struct RemoveFromCartForm {
    pub sku_id: SkuId,
}

/// Per-line selection request body.
#[derive(Debug, Deserialize)]
pub struct SelectForm {
    pub sku_id: SkuId,
    pub selected: bool,
}

/// Select-all request body.
#[derive(Debug, Deserialize)]
pub struct SelectAllForm {
    pub selected: bool,
}

/// Attach the refreshed guest token to a mutation response.
///
/// Account carts return the body untouched: their state never leaves the
/// server.
fn with_guest_cookie(cart: &ActiveCart<'_>, body: impl IntoResponse) -> Response {
    match cart.guest_token() {
        Some(token) => (
            AppendHeaders([(header::SET_COOKIE, guest::cart_cookie(token))]),
            body,
        )
            .into_response(),
        None => body.into_response(),
    }
}

/// Build the full cart view from a snapshot plus catalog data.
async fn cart_view(state: &AppState, snapshot: &CartSnapshot) -> Result<CartView> {
    let sku_ids: Vec<SkuId> = snapshot.iter().map(|(id, _)| id).collect();
    let skus = CatalogRepository::new(state.pool()).find_many(&sku_ids).await?;

    let lines = skus
        .into_iter()
        .filter_map(|sku| {
            snapshot.get(sku.id).map(|line| CartLineView {
                sku_id: sku.id,
                name: sku.name,
                price: sku.price,
                count: line.count,
                selected: line.selected,
                amount: sku.price * Decimal::from(line.count),
            })
        })
        .collect();

    Ok(CartView {
        lines,
        total_count: snapshot.total_count(),
    })
}

/// Display the full cart.
#[instrument(skip(state, identity))]
pub async fn show(State(state): State<AppState>, identity: Identity) -> Result<Json<CartView>> {
    let mut cart = ActiveCart::for_identity(state.pool(), &identity);
    let snapshot = cart.snapshot().await?;
    Ok(Json(cart_view(&state, &snapshot).await?))
}

/// Add units of a sku to the cart (add-semantics).
#[instrument(skip(state, identity))]
pub async fn add(
    State(state): State<AppState>,
    identity: Identity,
    Json(form): Json<AddToCartForm>,
) -> Result<Response> {
    if form.count == 0 {
        return Err(AppError::BadRequest("count must be positive".to_owned()));
    }
    require_sku(&state, form.sku_id).await?;

    let mut cart = ActiveCart::for_identity(state.pool(), &identity);
    cart.apply_delta(form.sku_id, form.count, form.selected.unwrap_or(true))
        .await?;

    let total_count = cart.snapshot().await?.total_count();
    Ok(with_guest_cookie(&cart, Json(CartTotals { total_count })))
}

/// Replace a line's count and selection (set-semantics).
#[instrument(skip(state, identity))]
pub async fn update(
    State(state): State<AppState>,
    identity: Identity,
    Json(form): Json<UpdateCartForm>,
) -> Result<Response> {
    if form.count == 0 {
        return Err(AppError::BadRequest("count must be positive".to_owned()));
    }
    let sku = require_sku(&state, form.sku_id).await?;

    let mut cart = ActiveCart::for_identity(state.pool(), &identity);
    cart.set_line(form.sku_id, form.count, form.selected).await?;

    let line = CartLineView {
        sku_id: sku.id,
        name: sku.name,
        price: sku.price,
        count: form.count,
        selected: form.selected,
        amount: sku.price * Decimal::from(form.count),
    };
    Ok(with_guest_cookie(&cart, Json(line)))
}

/// Remove a line from the cart.
#[instrument(skip(state, identity))]
pub async fn remove(
    State(state): State<AppState>,
    identity: Identity,
    Json(form): Json<RemoveFromCartForm>,
) -> Result<Response> {
    let mut cart = ActiveCart::for_identity(state.pool(), &identity);
    cart.remove(form.sku_id).await?;

    let total_count = cart.snapshot().await?.total_count();
    Ok(with_guest_cookie(&cart, Json(CartTotals { total_count })))
}

/// Tick or untick one line.
#[instrument(skip(state, identity))]
pub async fn select(
    State(state): State<AppState>,
    identity: Identity,
    Json(form): Json<SelectForm>,
) -> Result<Response> {
    let mut cart = ActiveCart::for_identity(state.pool(), &identity);
    cart.set_selection(form.sku_id, form.selected).await?;

    let total_count = cart.snapshot().await?.total_count();
    Ok(with_guest_cookie(&cart, Json(CartTotals { total_count })))
}

/// Tick or untick every line.
#[instrument(skip(state, identity))]
pub async fn select_all(
    State(state): State<AppState>,
    identity: Identity,
    Json(form): Json<SelectAllForm>,
) -> Result<Response> {
    let mut cart = ActiveCart::for_identity(state.pool(), &identity);
    cart.set_selection_all(form.selected).await?;

    let total_count = cart.snapshot().await?.total_count();
    Ok(with_guest_cookie(&cart, Json(CartTotals { total_count })))
}

/// Mini cart for the header badge.
#[instrument(skip(state, identity))]
pub async fn summary(
    State(state): State<AppState>,
    identity: Identity,
) -> Result<Json<CartSummary>> {
    let mut cart = ActiveCart::for_identity(state.pool(), &identity);
    let snapshot = cart.snapshot().await?;

    let sku_ids: Vec<SkuId> = snapshot.iter().map(|(id, _)| id).collect();
    let skus = CatalogRepository::new(state.pool()).find_many(&sku_ids).await?;

    let lines = skus
        .into_iter()
        .filter_map(|sku| {
            snapshot.get(sku.id).map(|line| CartSummaryLine {
                sku_id: sku.id,
                name: sku.name,
                count: line.count,
            })
        })
        .collect();

    Ok(Json(CartSummary {
        lines,
        total_count: snapshot.total_count(),
    }))
}

/// Fold the anonymous cart into the signed-in buyer's cart.
///
/// Called by the auth flow once, right after it establishes the session.
/// The anonymous cookie is cleared unconditionally, whatever the per-line
/// outcome, so the same token cannot merge twice in normal operation.
#[instrument(skip(state, customer, token))]
pub async fn merge(
    State(state): State<AppState>,
    RequireCustomer(customer): RequireCustomer,
    GuestCartToken(token): GuestCartToken,
) -> Result<Response> {
    let mut guest_cart = GuestCart::from_token(token.as_deref());
    let snapshot = guest_cart.snapshot().await?;

    let outcome = merge_into_account(state.pool(), customer.id, &snapshot).await;
    tracing::info!(
        user_id = %customer.id,
        merged = outcome.merged,
        failed = outcome.failed,
        "anonymous cart merged"
    );

    Ok((
        AppendHeaders([(header::SET_COOKIE, guest::clear_cart_cookie())]),
        Json(outcome),
    )
        .into_response())
}

/// Look up a sku or fail with `not_found`.
async fn require_sku(
    state: &AppState,
    sku_id: SkuId,
) -> Result<crate::db::catalog::Sku> {
    CatalogRepository::new(state.pool())
        .find(sku_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("sku {sku_id}")))
}
