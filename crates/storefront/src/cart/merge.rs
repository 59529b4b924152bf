//! One-shot merge of an anonymous cart into an authenticated cart at login.
//!
//! Counts merge with add-semantics, selection with overwrite-semantics.
//! The merge is best-effort per line: a line that fails to upsert is logged
//! and skipped, the rest proceed. The caller clears the anonymous cookie
//! unconditionally after the attempt, so under normal operation a token is
//! merged at most once — a design assumption, not an idempotence guarantee.

use clementine_core::{CartSnapshot, UserId};
use sqlx::PgPool;

use super::AccountCart;

/// What a merge attempt did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct MergeOutcome {
    /// Lines folded into the account cart.
    pub merged: usize,
    /// Lines that failed and were skipped.
    pub failed: usize,
}

/// Fold every line of `guest` into `user_id`'s server-side cart.
pub async fn merge_into_account(
    pool: &PgPool,
    user_id: UserId,
    guest: &CartSnapshot,
) -> MergeOutcome {
    let account = AccountCart::new(pool, user_id);
    let mut outcome = MergeOutcome {
        merged: 0,
        failed: 0,
    };

    for (sku_id, line) in guest.iter() {
        match account.merge_line(sku_id, line.count, line.selected).await {
            Ok(()) => outcome.merged += 1,
            Err(err) => {
                tracing::warn!(
                    %sku_id,
                    user_id = %user_id,
                    error = %err,
                    "skipping cart line that failed to merge"
                );
                outcome.failed += 1;
            }
        }
    }

    outcome
}
