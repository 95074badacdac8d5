//! Persistence boundary for the security chain.
//!
//! Each middleware stage talks to exactly one store trait. `PgStore` backs
//! them with PostgreSQL; `MemoryStore` keeps everything in process and is
//! what the test suites inject.

pub mod memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::auth::{ApiKey, Session, User, UserCredentials};
use crate::models::security::{BlacklistEntry, EventFilter, SecurityLogEntry};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Which store a failure or operation concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreKind {
    Users,
    Sessions,
    ApiKeys,
    Blacklist,
    SecurityLog,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_user(&self, id: i64) -> StoreResult<Option<User>>;

    async fn find_credentials_by_email(&self, email: &str)
    -> StoreResult<Option<UserCredentials>>;

    /// IDs of servers owned by `user_id`.
    async fn owned_server_ids(&self, user_id: i64) -> StoreResult<Vec<i64>>;

    async fn touch_last_activity(&self, user_id: i64, at: DateTime<Utc>) -> StoreResult<()>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create_session(&self, user_id: i64, expires_at: DateTime<Utc>)
    -> StoreResult<Session>;

    async fn find_session(&self, id: &str) -> StoreResult<Option<Session>>;
}

#[async_trait]
pub trait ApiKeyStore: Send + Sync {
    /// Look up a key by the SHA-256 hex digest of its secret.
    async fn find_api_key(&self, key_hash: &str) -> StoreResult<Option<ApiKey>>;

    /// Set `last_used = at` and increment `usage_count` in one atomic update.
    async fn record_api_key_usage(&self, id: i64, at: DateTime<Utc>) -> StoreResult<()>;

    async fn count_active_api_keys(&self) -> StoreResult<i64>;
}

#[async_trait]
pub trait IpBlacklistStore: Send + Sync {
    async fn find_blacklisted(&self, ip: &str) -> StoreResult<Option<BlacklistEntry>>;

    async fn count_blacklisted(&self) -> StoreResult<i64>;
}

#[async_trait]
pub trait SecurityLogStore: Send + Sync {
    async fn append_security_event(&self, entry: &SecurityLogEntry) -> StoreResult<()>;

    async fn count_security_events(
        &self,
        since: DateTime<Utc>,
        filter: EventFilter<'_>,
    ) -> StoreResult<i64>;
}

/// One handle per store, shared by every request.
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn UserStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub api_keys: Arc<dyn ApiKeyStore>,
    pub blacklist: Arc<dyn IpBlacklistStore>,
    pub security_log: Arc<dyn SecurityLogStore>,
}

impl Stores {
    /// Build from a single backend that implements every store.
    pub fn shared<T>(backend: Arc<T>) -> Self
    where
        T: UserStore + SessionStore + ApiKeyStore + IpBlacklistStore + SecurityLogStore + 'static,
    {
        Self {
            users: backend.clone(),
            sessions: backend.clone(),
            api_keys: backend.clone(),
            blacklist: backend.clone(),
            security_log: backend,
        }
    }
}
