//! Address repository.
//!
//! Address CRUD belongs to the account service; checkout only ever reads,
//! and always scoped to the owning buyer so a commit can never ship to
//! someone else's address.

use sqlx::PgPool;

use clementine_core::{AddressId, UserId};

use super::RepositoryError;

/// A buyer shipping address.
#[derive(Debug, Clone, serde::Serialize, sqlx::FromRow)]
pub struct Address {
    pub id: AddressId,
    #[serde(skip)]
    pub user_id: UserId,
    pub recipient: String,
    pub phone: String,
    pub line1: String,
    pub city: String,
    pub region: String,
}

/// Repository for address reads.
pub struct AddressRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> AddressRepository<'a> {
    /// Create a new address repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get an address only if it belongs to `user_id`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn find_for_user(
        &self,
        address_id: AddressId,
        user_id: UserId,
    ) -> Result<Option<Address>, RepositoryError> {
        let address = sqlx::query_as::<_, Address>(
            r"
            SELECT id, user_id, recipient, phone, line1, city, region
            FROM address
            WHERE id = $1 AND user_id = $2
            ",
        )
        .bind(address_id)
        .bind(user_id)
        .fetch_optional(self.pool)
        .await?;

        Ok(address)
    }

    /// List a buyer's addresses, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Address>, RepositoryError> {
        let addresses = sqlx::query_as::<_, Address>(
            r"
            SELECT id, user_id, recipient, phone, line1, city, region
            FROM address
            WHERE user_id = $1
            ORDER BY id
            ",
        )
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;

        Ok(addresses)
    }
}
