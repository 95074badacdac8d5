//! Domain models.
//!
//! These are internal domain models, distinct from the API response shapes
//! (which carry `#[serde(rename_all = "camelCase")]` and friends).

pub mod auth;
pub mod security;
