//! In-process stores over `dashmap`.
//!
//! Used by the test suites and for local experiments. Per-key mutations run
//! under the owning shard's lock, so concurrent usage increments are never
//! lost. Any store can be switched into a failing state to exercise the
//! chain's infrastructure-error policies.

use std::sync::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::{DashMap, DashSet};
use uuid::Uuid;

use super::{
    ApiKeyStore, IpBlacklistStore, SecurityLogStore, SessionStore, StoreError, StoreKind,
    StoreResult, UserStore,
};
use crate::auth::api_keys::{generate_api_key, hash_api_key};
use crate::auth::password::hash_password;
use crate::models::auth::{ApiKey, Session, User, UserCredentials};
use crate::models::security::{BlacklistEntry, EventFilter, SecurityLogEntry};

/// In-memory implementation of every store trait.
#[derive(Default)]
pub struct MemoryStore {
    users: DashMap<i64, UserCredentials>,
    /// server id → owner id
    servers: DashMap<i64, i64>,
    sessions: DashMap<String, Session>,
    /// key hash → record
    api_keys: DashMap<String, ApiKey>,
    blacklist: DashMap<String, BlacklistEntry>,
    security_log: Mutex<Vec<SecurityLogEntry>>,
    next_id: AtomicI64,
    failing: DashSet<StoreKind>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn check(&self, kind: StoreKind) -> StoreResult<()> {
        if self.failing.contains(&kind) {
            return Err(StoreError::Unavailable(format!("{kind:?} store is failing")));
        }
        Ok(())
    }

    /// Make every operation on `kind` fail with `StoreError::Unavailable`.
    pub fn set_failing(&self, kind: StoreKind, failing: bool) {
        if failing {
            self.failing.insert(kind);
        } else {
            self.failing.remove(&kind);
        }
    }

    /// Insert a user with a bcrypt-hashed password. Returns the new user.
    pub fn insert_user(&self, email: &str, password: &str, is_admin: bool) -> User {
        let id = self.next_id();
        let user = User {
            id,
            email: email.to_string(),
            username: email.split('@').next().unwrap_or(email).to_string(),
            is_admin,
            suspended: false,
            last_activity: None,
        };
        // Cost-10 bcrypt of a short password cannot fail.
        let password_hash = hash_password(password).unwrap_or_default();
        self.users.insert(
            id,
            UserCredentials {
                user: user.clone(),
                password_hash,
            },
        );
        user
    }

    pub fn set_suspended(&self, user_id: i64, suspended: bool) {
        if let Some(mut creds) = self.users.get_mut(&user_id) {
            creds.user.suspended = suspended;
        }
    }

    pub fn remove_user(&self, user_id: i64) {
        self.users.remove(&user_id);
    }

    /// Register a server owned by `owner_id`. Returns its id.
    pub fn insert_server(&self, owner_id: i64) -> i64 {
        let id = self.next_id();
        self.servers.insert(id, owner_id);
        id
    }

    /// Insert a session with an explicit id and expiry.
    pub fn insert_session(&self, session: Session) {
        self.sessions.insert(session.id.clone(), session);
    }

    /// Create an API key. Returns (plaintext_key, record).
    pub fn insert_api_key(
        &self,
        name: &str,
        permissions: &[&str],
        active: bool,
        expires: Option<DateTime<Utc>>,
    ) -> (String, ApiKey) {
        let plaintext = generate_api_key();
        let record = ApiKey {
            id: self.next_id(),
            name: name.to_string(),
            active,
            expires,
            permissions: permissions.iter().map(|p| p.to_string()).collect(),
            last_used: None,
            usage_count: 0,
        };
        self.api_keys
            .insert(hash_api_key(&plaintext), record.clone());
        (plaintext, record)
    }

    /// Current state of an API key, by id.
    pub fn api_key(&self, id: i64) -> Option<ApiKey> {
        self.api_keys
            .iter()
            .find(|entry| entry.value().id == id)
            .map(|entry| entry.value().clone())
    }

    pub fn block_ip(&self, ip: &str, reason: Option<&str>) {
        self.blacklist.insert(
            ip.to_string(),
            BlacklistEntry {
                ip: ip.to_string(),
                reason: reason.map(str::to_string),
            },
        );
    }

    pub fn user(&self, id: i64) -> Option<User> {
        self.users.get(&id).map(|creds| creds.user.clone())
    }

    /// Snapshot of the security log in insertion order.
    pub fn security_events(&self) -> Vec<SecurityLogEntry> {
        match self.security_log.lock() {
            Ok(log) => log.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_user(&self, id: i64) -> StoreResult<Option<User>> {
        self.check(StoreKind::Users)?;
        Ok(self.user(id))
    }

    async fn find_credentials_by_email(
        &self,
        email: &str,
    ) -> StoreResult<Option<UserCredentials>> {
        self.check(StoreKind::Users)?;
        Ok(self
            .users
            .iter()
            .find(|entry| entry.value().user.email == email)
            .map(|entry| entry.value().clone()))
    }

    async fn owned_server_ids(&self, user_id: i64) -> StoreResult<Vec<i64>> {
        self.check(StoreKind::Users)?;
        let mut ids: Vec<i64> = self
            .servers
            .iter()
            .filter(|entry| *entry.value() == user_id)
            .map(|entry| *entry.key())
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }

    async fn touch_last_activity(&self, user_id: i64, at: DateTime<Utc>) -> StoreResult<()> {
        self.check(StoreKind::Users)?;
        if let Some(mut creds) = self.users.get_mut(&user_id) {
            creds.user.last_activity = Some(at);
        }
        Ok(())
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn create_session(
        &self,
        user_id: i64,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<Session> {
        self.check(StoreKind::Sessions)?;
        let session = Session {
            id: Uuid::now_v7().to_string(),
            user_id,
            expires_at,
        };
        self.sessions.insert(session.id.clone(), session.clone());
        Ok(session)
    }

    async fn find_session(&self, id: &str) -> StoreResult<Option<Session>> {
        self.check(StoreKind::Sessions)?;
        Ok(self.sessions.get(id).map(|s| s.value().clone()))
    }
}

#[async_trait]
impl ApiKeyStore for MemoryStore {
    async fn find_api_key(&self, key_hash: &str) -> StoreResult<Option<ApiKey>> {
        self.check(StoreKind::ApiKeys)?;
        Ok(self.api_keys.get(key_hash).map(|k| k.value().clone()))
    }

    async fn record_api_key_usage(&self, id: i64, at: DateTime<Utc>) -> StoreResult<()> {
        self.check(StoreKind::ApiKeys)?;
        let mut entry = self
            .api_keys
            .iter_mut()
            .find(|entry| entry.value().id == id)
            .ok_or_else(|| StoreError::Conflict(format!("api key {id} disappeared")))?;
        let key = entry.value_mut();
        key.usage_count += 1;
        key.last_used = Some(at);
        Ok(())
    }

    async fn count_active_api_keys(&self) -> StoreResult<i64> {
        self.check(StoreKind::ApiKeys)?;
        Ok(self.api_keys.iter().filter(|k| k.value().active).count() as i64)
    }
}

#[async_trait]
impl IpBlacklistStore for MemoryStore {
    async fn find_blacklisted(&self, ip: &str) -> StoreResult<Option<BlacklistEntry>> {
        self.check(StoreKind::Blacklist)?;
        Ok(self.blacklist.get(ip).map(|e| e.value().clone()))
    }

    async fn count_blacklisted(&self) -> StoreResult<i64> {
        self.check(StoreKind::Blacklist)?;
        Ok(self.blacklist.len() as i64)
    }
}

#[async_trait]
impl SecurityLogStore for MemoryStore {
    async fn append_security_event(&self, entry: &SecurityLogEntry) -> StoreResult<()> {
        self.check(StoreKind::SecurityLog)?;
        match self.security_log.lock() {
            Ok(mut log) => log.push(entry.clone()),
            Err(poisoned) => poisoned.into_inner().push(entry.clone()),
        }
        Ok(())
    }

    async fn count_security_events(
        &self,
        since: DateTime<Utc>,
        filter: EventFilter<'_>,
    ) -> StoreResult<i64> {
        self.check(StoreKind::SecurityLog)?;
        Ok(self
            .security_events()
            .iter()
            .filter(|e| e.timestamp >= since && filter.matches(e.event_type))
            .count() as i64)
    }
}
