//! Authentication primitives.
//!
//! Provides session-token signing, password hashing and API key hashing
//! shared by the HTTP middleware chain and the operator tooling.

pub mod api_keys;
pub mod jwt;
pub mod password;

use thiserror::Error;

/// Authentication errors.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid token: {0}")]
    TokenInvalid(String),

    #[error("JWT secret is not configured (set JWT_SECRET)")]
    MissingSecret,

    #[error("Internal error: {0}")]
    Internal(String),
}
