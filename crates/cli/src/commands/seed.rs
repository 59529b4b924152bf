//! Seed the database with sample catalog and address data.
//!
//! Development convenience only: inserts a couple of products with sku
//! variants, plus one address for buyer 1, so the cart and checkout flows
//! can be exercised against a fresh database. Re-running is harmless.

use sqlx::PgPool;
use tracing::info;

/// Sample skus: (product name, sku name, price, stock).
const SAMPLE_SKUS: &[(&str, &str, &str, i32)] = &[
    ("Garden Tee", "Garden Tee / S", "19.00", 40),
    ("Garden Tee", "Garden Tee / M", "19.00", 55),
    ("Garden Tee", "Garden Tee / L", "19.00", 30),
    ("Canvas Tote", "Canvas Tote / Natural", "24.50", 25),
    ("Canvas Tote", "Canvas Tote / Black", "24.50", 18),
    ("Enamel Mug", "Enamel Mug / 350ml", "12.75", 60),
];

/// Insert the sample data.
///
/// # Errors
///
/// Returns an error if the database is unreachable or an insert fails.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let database_url = super::database_url()?;

    info!("Connecting to storefront database...");
    let pool = PgPool::connect(&database_url).await?;

    let mut seeded = 0;
    for (product_name, sku_name, price, stock) in SAMPLE_SKUS {
        let product_id = upsert_product(&pool, product_name).await?;

        let inserted = sqlx::query(
            r"
            INSERT INTO sku (product_id, name, price, stock)
            SELECT $1, $2, $3::numeric, $4
            WHERE NOT EXISTS (SELECT 1 FROM sku WHERE name = $2)
            ",
        )
        .bind(product_id)
        .bind(sku_name)
        .bind(price)
        .bind(stock)
        .execute(&pool)
        .await?;
        seeded += inserted.rows_affected();
    }

    sqlx::query(
        r"
        INSERT INTO address (user_id, recipient, phone, line1, city, region)
        SELECT 1, 'Sam Seeder', '555-0100', '1 Orchard Lane', 'Springfield', 'OR'
        WHERE NOT EXISTS (SELECT 1 FROM address WHERE user_id = 1)
        ",
    )
    .execute(&pool)
    .await?;

    info!(new_skus = seeded, "Seeding complete!");
    Ok(())
}

/// Find or create a product by name, returning its id.
async fn upsert_product(pool: &PgPool, name: &str) -> Result<i32, sqlx::Error> {
    if let Some((id,)) = sqlx::query_as::<_, (i32,)>("SELECT id FROM product WHERE name = $1")
        .bind(name)
        .fetch_optional(pool)
        .await?
    {
        return Ok(id);
    }

    let (id,): (i32,) =
        sqlx::query_as("INSERT INTO product (name) VALUES ($1) RETURNING id")
            .bind(name)
            .fetch_one(pool)
            .await?;
    Ok(id)
}
