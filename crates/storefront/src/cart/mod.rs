//! Shopping cart storage.
//!
//! One capability trait, two backends: authenticated carts live in the
//! `cart_line` table keyed by user id; anonymous carts live entirely in a
//! reversible cookie token held by the client. Handlers pick the backend
//! from the request identity at the edge and talk to [`CartStore`] only —
//! business logic never inspects which backend is active.

pub mod account;
pub mod guest;
pub mod merge;

use clementine_core::{CartSnapshot, SkuId};
use sqlx::PgPool;
use thiserror::Error;

pub use account::AccountCart;
pub use guest::{CART_COOKIE_NAME, GuestCart};
pub use merge::{MergeOutcome, merge_into_account};

use crate::db::RepositoryError;
use crate::middleware::Identity;

/// Errors from cart storage.
///
/// Guest carts mutate in memory and cannot fail; only the database-backed
/// operations surface errors.
#[derive(Debug, Error)]
pub enum CartError {
    /// Underlying repository failure.
    #[error(transparent)]
    Store(#[from] RepositoryError),
}

/// Uniform cart operations over either backend.
///
/// Counts use add-semantics through [`apply_delta`](Self::apply_delta) and
/// set-semantics through [`set_line`](Self::set_line); selection changes are
/// independent of quantity changes. Each call is atomic with respect to
/// concurrent readers of the same cart.
pub trait CartStore {
    /// The full cart contents.
    async fn snapshot(&mut self) -> Result<CartSnapshot, CartError>;

    /// Add `delta` units (creating the line if absent).
    async fn apply_delta(
        &mut self,
        sku_id: SkuId,
        delta: u32,
        selected_default: bool,
    ) -> Result<(), CartError>;

    /// Replace count and selection outright.
    async fn set_line(&mut self, sku_id: SkuId, count: u32, selected: bool)
    -> Result<(), CartError>;

    /// Tick or untick one line.
    async fn set_selection(&mut self, sku_id: SkuId, selected: bool) -> Result<(), CartError>;

    /// Tick or untick every line.
    async fn set_selection_all(&mut self, selected: bool) -> Result<(), CartError>;

    /// Remove one line.
    async fn remove(&mut self, sku_id: SkuId) -> Result<(), CartError>;

    /// Remove exactly the given skus; unrelated lines stay. Idempotent.
    async fn purge(&mut self, sku_ids: &[SkuId]) -> Result<(), CartError>;
}

/// The backend chosen for the current request.
///
/// Constructed once at the top of each cart handler; everything below works
/// through the [`CartStore`] methods.
pub enum ActiveCart<'a> {
    Account(AccountCart<'a>),
    Guest(GuestCart),
}

impl<'a> ActiveCart<'a> {
    /// Pick the backend for the request identity.
    #[must_use]
    pub fn for_identity(pool: &'a PgPool, identity: &Identity) -> Self {
        match identity {
            Identity::Customer(customer) => Self::Account(AccountCart::new(pool, customer.id)),
            Identity::Guest { cart_token } => {
                Self::Guest(GuestCart::from_token(cart_token.as_deref()))
            }
        }
    }

    /// The re-encoded token to hand back to the client, if this is a guest
    /// cart. Account carts return `None`: their state never leaves the
    /// server.
    #[must_use]
    pub fn guest_token(&self) -> Option<String> {
        match self {
            Self::Account(_) => None,
            Self::Guest(cart) => Some(cart.token()),
        }
    }
}

impl CartStore for ActiveCart<'_> {
    async fn snapshot(&mut self) -> Result<CartSnapshot, CartError> {
        match self {
            Self::Account(cart) => cart.snapshot().await,
            Self::Guest(cart) => cart.snapshot().await,
        }
    }

    async fn apply_delta(
        &mut self,
        sku_id: SkuId,
        delta: u32,
        selected_default: bool,
    ) -> Result<(), CartError> {
        match self {
            Self::Account(cart) => cart.apply_delta(sku_id, delta, selected_default).await,
            Self::Guest(cart) => cart.apply_delta(sku_id, delta, selected_default).await,
        }
    }

    async fn set_line(
        &mut self,
        sku_id: SkuId,
        count: u32,
        selected: bool,
    ) -> Result<(), CartError> {
        match self {
            Self::Account(cart) => cart.set_line(sku_id, count, selected).await,
            Self::Guest(cart) => cart.set_line(sku_id, count, selected).await,
        }
    }

    async fn set_selection(&mut self, sku_id: SkuId, selected: bool) -> Result<(), CartError> {
        match self {
            Self::Account(cart) => cart.set_selection(sku_id, selected).await,
            Self::Guest(cart) => cart.set_selection(sku_id, selected).await,
        }
    }

    async fn set_selection_all(&mut self, selected: bool) -> Result<(), CartError> {
        match self {
            Self::Account(cart) => cart.set_selection_all(selected).await,
            Self::Guest(cart) => cart.set_selection_all(selected).await,
        }
    }

    async fn remove(&mut self, sku_id: SkuId) -> Result<(), CartError> {
        match self {
            Self::Account(cart) => cart.remove(sku_id).await,
            Self::Guest(cart) => cart.remove(sku_id).await,
        }
    }

    async fn purge(&mut self, sku_ids: &[SkuId]) -> Result<(), CartError> {
        match self {
            Self::Account(cart) => cart.purge(sku_ids).await,
            Self::Guest(cart) => cart.purge(sku_ids).await,
        }
    }
}
