//! Database migration command.
//!
//! # Usage
//!
//! ```bash
//! clem-cli migrate
//! ```
//!
//! # Environment Variables
//!
//! - `STOREFRONT_DATABASE_URL` - `PostgreSQL` connection string (falls back
//!   to `DATABASE_URL`)

use sqlx::PgPool;
use tracing::info;

/// Run all pending storefront migrations.
///
/// # Errors
///
/// Returns an error if the database is unreachable or a migration fails.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let database_url = super::database_url()?;

    info!("Connecting to storefront database...");
    let pool = PgPool::connect(&database_url).await?;

    info!("Running migrations...");
    sqlx::migrate!("../storefront/migrations").run(&pool).await?;

    info!("Migrations complete!");
    Ok(())
}
