//! Order commit: turning a selected cart snapshot into a durable order.
//!
//! The [`engine`] drives the state machine (validate, reserve stock per
//! line, persist, commit-or-abort); the [`store`] defines the transactional
//! boundary it runs against and its `PostgreSQL` implementation. All stock
//! and sales mutation in the whole service is confined to the store's
//! conditional update.

pub mod engine;
pub mod store;

pub use engine::{CheckoutError, CommittedOrder, OrderCommitEngine};
pub use store::{CheckoutStore, CheckoutUow, OrderDraft, PgCheckoutStore, SkuRead};
