//! CLI subcommand implementations.

pub mod migrate;
pub mod seed;

/// Resolve the storefront database URL from the environment.
///
/// Tries `STOREFRONT_DATABASE_URL` first, then the generic `DATABASE_URL`.
pub fn database_url() -> Result<String, Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    std::env::var("STOREFRONT_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .map_err(|_| "STOREFRONT_DATABASE_URL not set".into())
}
