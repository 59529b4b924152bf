//! Request middleware: sessions and identity extraction.

pub mod identity;
pub mod session;

pub use identity::{GuestCartToken, Identity, RequireCustomer};
pub use session::create_session_layer;
