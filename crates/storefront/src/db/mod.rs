//! Database operations for the storefront `PostgreSQL`.
//!
//! # Tables
//!
//! - `product` - Purchasable products and their aggregate sales
//! - `sku` - Concrete variants with price, stock, and sales counters
//! - `address` - Buyer shipping addresses (written elsewhere, read here)
//! - `cart_line` - Authenticated cart lines (count + selection per sku)
//! - `orders` - Committed orders
//! - `order_line` - Per-sku lines with the price captured at commit
//! - `sessions` - Tower-sessions storage
//!
//! Stock and sales on `sku` are only ever written through
//! [`checkout`](crate::checkout)'s conditional update; nothing else in the
//! codebase touches those columns.
//!
//! # Migrations
//!
//! Migrations live in `crates/storefront/migrations/` and run via:
//! ```bash
//! cargo run -p clementine-cli -- migrate
//! ```

pub mod addresses;
pub mod catalog;
pub mod orders;

use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

pub use addresses::AddressRepository;
pub use catalog::CatalogRepository;
pub use orders::OrderRepository;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., duplicate order id).
    #[error("constraint violation: {0}")]
    Conflict(String),
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}
