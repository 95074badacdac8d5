//! Security audit models: event types, log entries and blacklist entries.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kinds of security events written to the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SecurityEventType {
    RateLimitExceeded,
    BlockedIpAccess,
    AuthHeaderMissing,
    InvalidToken,
    InvalidSession,
    UserNotFound,
    SuspendedUserAccess,
    InsufficientPermissions,
    ApiKeyMissing,
    InvalidApiKey,
    /// Failed password login.
    AuthFailed,
}

impl SecurityEventType {
    /// Stable string stored in `security_logs.event_type`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            Self::BlockedIpAccess => "BLOCKED_IP_ACCESS",
            Self::AuthHeaderMissing => "AUTH_HEADER_MISSING",
            Self::InvalidToken => "INVALID_TOKEN",
            Self::InvalidSession => "INVALID_SESSION",
            Self::UserNotFound => "USER_NOT_FOUND",
            Self::SuspendedUserAccess => "SUSPENDED_USER_ACCESS",
            Self::InsufficientPermissions => "INSUFFICIENT_PERMISSIONS",
            Self::ApiKeyMissing => "API_KEY_MISSING",
            Self::InvalidApiKey => "INVALID_API_KEY",
            Self::AuthFailed => "AUTH_FAILED",
        }
    }
}

impl fmt::Display for SecurityEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityLogEntry {
    pub event_type: SecurityEventType,
    pub ip_address: String,
    pub path: String,
    pub user_id: Option<i64>,
    pub timestamp: DateTime<Utc>,
}

impl SecurityLogEntry {
    pub fn new(
        event_type: SecurityEventType,
        ip_address: impl Into<String>,
        path: impl Into<String>,
        user_id: Option<i64>,
    ) -> Self {
        Self {
            event_type,
            ip_address: ip_address.into(),
            path: path.into(),
            user_id,
            timestamp: Utc::now(),
        }
    }
}

/// Denylisted source address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlacklistEntry {
    pub ip: String,
    pub reason: Option<String>,
}

/// Which events to count when reporting.
#[derive(Debug, Clone, Copy)]
pub enum EventFilter<'a> {
    All,
    Exact(SecurityEventType),
    /// Event type string starts with the given prefix (e.g. `"API_"`).
    Prefix(&'a str),
}

impl EventFilter<'_> {
    pub fn matches(&self, event_type: SecurityEventType) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::Exact(t) => *t == event_type,
            EventFilter::Prefix(p) => event_type.as_str().starts_with(p),
        }
    }
}
