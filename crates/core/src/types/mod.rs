//! Core types for Clementine.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod cart;
pub mod id;
pub mod order;

pub use cart::{CartLine, CartSnapshot, CartTokenError};
pub use id::*;
pub use order::{OrderId, OrderStatus, PayMethod, PayMethodError};
