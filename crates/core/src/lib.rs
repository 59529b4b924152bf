//! Clementine Core - Shared types library.
//!
//! This crate provides common types used across all Clementine components:
//! - `storefront` - Public-facing checkout service
//! - `cli` - Command-line tools for migrations and seeding
//!
//! # Architecture
//!
//! The core crate contains only types and pure logic - no I/O, no database
//! access, no HTTP clients. This keeps it lightweight and allows it to be
//! used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype IDs, the cart snapshot and its wire token, and
//!   order identity/status types

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
