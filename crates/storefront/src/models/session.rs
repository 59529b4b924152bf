//! Session-related types.
//!
//! Types stored in the session for authentication state. Session issuance
//! itself belongs to the external auth service; this crate only reads the
//! identity it placed there.

use serde::{Deserialize, Serialize};

use clementine_core::UserId;

/// Session-stored buyer identity.
///
/// Minimal data stored in the session to identify the signed-in buyer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CurrentCustomer {
    /// Buyer's database ID.
    pub id: UserId,
}

/// Session keys for authentication data.
pub mod keys {
    /// Key for storing the current signed-in buyer.
    pub const CURRENT_CUSTOMER: &str = "current_customer";
}
