//! # airlink_core
//!
//! Core security domain logic for the Airlink Panel API: credential
//! primitives, domain models and the persistence boundary consumed by the
//! HTTP middleware chain.

pub mod auth;
pub mod migrate;
pub mod models;
pub mod store;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
