//! Session token generation and verification.

use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::distr::Alphanumeric;
use rand::{Rng, rng};
use tracing::warn;

use super::AuthError;
use crate::models::auth::{Session, TokenClaims, User};

/// Issue a signed HS256 token bound to `session`.
pub fn issue_session_token(
    user: &User,
    session: &Session,
    secret: &[u8],
    ttl: Duration,
) -> Result<String, AuthError> {
    let now = Utc::now();
    let claims = TokenClaims {
        sub: user.id,
        sid: session.id.clone(),
        email: user.email.clone(),
        is_admin: user.is_admin,
        exp: (now + ttl).timestamp(),
        iat: now.timestamp(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret),
    )
    .map_err(|e| AuthError::Internal(format!("jwt encode: {e}")))
}

/// Verify a session token's signature and `exp` claim.
pub fn verify_session_token(token: &str, secret: &[u8]) -> Result<TokenClaims, AuthError> {
    let key = DecodingKey::from_secret(secret);
    let mut validation = Validation::default();
    validation.validate_exp = true;
    decode::<TokenClaims>(token, &key, &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::TokenInvalid(e.to_string()),
        })
}

/// Resolve the signing secret from `JWT_SECRET`, then `AUTH_SECRET`.
///
/// Outside development there is no fallback: a missing secret is an error
/// the caller must surface at startup. In development an ephemeral random
/// secret is generated, so tokens do not survive a restart.
pub fn resolve_jwt_secret(development: bool) -> Result<String, AuthError> {
    for var in ["JWT_SECRET", "AUTH_SECRET"] {
        if let Ok(secret) = std::env::var(var)
            && !secret.trim().is_empty()
        {
            return Ok(secret);
        }
    }
    if !development {
        return Err(AuthError::MissingSecret);
    }
    warn!("JWT_SECRET not set; generating an ephemeral development secret");
    Ok(rng()
        .sample_iter(&Alphanumeric)
        .take(64)
        .map(char::from)
        .collect())
}
