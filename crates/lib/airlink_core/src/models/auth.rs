//! Authentication domain models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Panel user as seen by the authentication chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub username: String,
    pub is_admin: bool,
    pub suspended: bool,
    pub last_activity: Option<DateTime<Utc>>,
}

/// User with password hash (for the login flow).
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user: User,
    pub password_hash: String,
}

/// Server-side session backing an issued token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub user_id: i64,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// A session is valid strictly before its expiry instant.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// API key record. Only the SHA-256 hash of the secret is stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: i64,
    pub name: String,
    pub active: bool,
    /// `None` means the key never expires.
    pub expires: Option<DateTime<Utc>>,
    pub permissions: Vec<String>,
    pub last_used: Option<DateTime<Utc>>,
    pub usage_count: i64,
}

impl ApiKey {
    /// `active AND (expires IS NULL OR expires > now)`.
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.active && self.expires.is_none_or(|expires| expires > now)
    }
}

/// JWT claims embedded in session tokens.
///
/// `sid` is the canonical link to the session record; `sub` must match the
/// session's owner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject: user ID.
    pub sub: i64,
    /// Session ID (primary key of the `sessions` row).
    pub sid: String,
    pub email: String,
    #[serde(rename = "isAdmin")]
    pub is_admin: bool,
    /// Expiry (unix timestamp).
    pub exp: i64,
    /// Issued at (unix timestamp).
    pub iat: i64,
}
