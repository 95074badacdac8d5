//! PostgreSQL-backed stores.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{
    ApiKeyStore, IpBlacklistStore, SecurityLogStore, SessionStore, StoreError, StoreResult,
    UserStore,
};
use crate::auth::api_keys::{generate_api_key, hash_api_key};
use crate::models::auth::{ApiKey, Session, User, UserCredentials};
use crate::models::security::{BlacklistEntry, EventFilter, SecurityLogEntry};

type UserRow = (i64, String, String, bool, bool, Option<DateTime<Utc>>);

type ApiKeyRow = (
    i64,
    String,
    bool,
    Option<DateTime<Utc>>,
    Option<DateTime<Utc>>,
    i64,
    Vec<String>,
);

fn user_from_row(row: UserRow) -> User {
    let (id, email, username, is_admin, suspended, last_activity) = row;
    User {
        id,
        email,
        username,
        is_admin,
        suspended,
        last_activity,
    }
}

/// Store implementation over a shared `PgPool`.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create an API key. Returns (plaintext_key, record); the plaintext is
    /// not recoverable afterwards.
    pub async fn create_api_key(
        &self,
        name: &str,
        permissions: &[String],
        expires: Option<DateTime<Utc>>,
    ) -> StoreResult<(String, ApiKey)> {
        let plaintext = generate_api_key();
        let mut tx = self.pool.begin().await?;

        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO api_keys (key_hash, name, expires) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(hash_api_key(&plaintext))
        .bind(name)
        .bind(expires)
        .fetch_one(&mut *tx)
        .await?;

        for permission in permissions {
            sqlx::query("INSERT INTO api_key_permissions (api_key_id, name) VALUES ($1, $2)")
                .bind(id)
                .bind(permission)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        let record = ApiKey {
            id,
            name: name.to_string(),
            active: true,
            expires,
            permissions: permissions.to_vec(),
            last_used: None,
            usage_count: 0,
        };
        Ok((plaintext, record))
    }

    /// Add or update a blacklist entry.
    pub async fn block_ip(&self, ip: &str, reason: Option<&str>) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO ip_blacklist (ip, reason) VALUES ($1, $2) \
             ON CONFLICT (ip) DO UPDATE SET reason = EXCLUDED.reason",
        )
        .bind(ip)
        .bind(reason)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn find_user(&self, id: i64) -> StoreResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, email, username, is_admin, suspended, last_activity \
             FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(user_from_row))
    }

    async fn find_credentials_by_email(
        &self,
        email: &str,
    ) -> StoreResult<Option<UserCredentials>> {
        let row = sqlx::query_as::<
            _,
            (
                i64,
                String,
                String,
                bool,
                bool,
                Option<DateTime<Utc>>,
                String,
            ),
        >(
            "SELECT id, email, username, is_admin, suspended, last_activity, password_hash \
             FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(
            |(id, email, username, is_admin, suspended, last_activity, password_hash)| {
                UserCredentials {
                    user: user_from_row((id, email, username, is_admin, suspended, last_activity)),
                    password_hash,
                }
            },
        ))
    }

    async fn owned_server_ids(&self, user_id: i64) -> StoreResult<Vec<i64>> {
        let ids =
            sqlx::query_scalar::<_, i64>("SELECT id FROM servers WHERE owner_id = $1 ORDER BY id")
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(ids)
    }

    async fn touch_last_activity(&self, user_id: i64, at: DateTime<Utc>) -> StoreResult<()> {
        sqlx::query("UPDATE users SET last_activity = $2 WHERE id = $1")
            .bind(user_id)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for PgStore {
    async fn create_session(
        &self,
        user_id: i64,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<Session> {
        let id = Uuid::now_v7();
        sqlx::query("INSERT INTO sessions (id, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(id)
            .bind(user_id)
            .bind(expires_at)
            .execute(&self.pool)
            .await?;
        Ok(Session {
            id: id.to_string(),
            user_id,
            expires_at,
        })
    }

    async fn find_session(&self, id: &str) -> StoreResult<Option<Session>> {
        // A token can carry anything in `sid`; a non-UUID simply matches nothing.
        let Ok(id) = Uuid::parse_str(id) else {
            return Ok(None);
        };
        let row = sqlx::query_as::<_, (Uuid, i64, DateTime<Utc>)>(
            "SELECT id, user_id, expires_at FROM sessions WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(id, user_id, expires_at)| Session {
            id: id.to_string(),
            user_id,
            expires_at,
        }))
    }
}

#[async_trait]
impl ApiKeyStore for PgStore {
    async fn find_api_key(&self, key_hash: &str) -> StoreResult<Option<ApiKey>> {
        let row = sqlx::query_as::<_, ApiKeyRow>(
            "SELECT k.id, k.name, k.active, k.expires, k.last_used, k.usage_count, \
                    COALESCE(ARRAY_AGG(p.name ORDER BY p.id) FILTER (WHERE p.name IS NOT NULL), '{}') \
             FROM api_keys k \
             LEFT JOIN api_key_permissions p ON p.api_key_id = k.id \
             WHERE k.key_hash = $1 \
             GROUP BY k.id",
        )
        .bind(key_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(
            |(id, name, active, expires, last_used, usage_count, permissions)| ApiKey {
                id,
                name,
                active,
                expires,
                permissions,
                last_used,
                usage_count,
            },
        ))
    }

    async fn record_api_key_usage(&self, id: i64, at: DateTime<Utc>) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE api_keys SET usage_count = usage_count + 1, last_used = $2 WHERE id = $1",
        )
        .bind(id)
        .bind(at)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!("api key {id} disappeared")));
        }
        Ok(())
    }

    async fn count_active_api_keys(&self) -> StoreResult<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM api_keys WHERE active")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl IpBlacklistStore for PgStore {
    async fn find_blacklisted(&self, ip: &str) -> StoreResult<Option<BlacklistEntry>> {
        let row = sqlx::query_as::<_, (String, Option<String>)>(
            "SELECT ip, reason FROM ip_blacklist WHERE ip = $1",
        )
        .bind(ip)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(ip, reason)| BlacklistEntry { ip, reason }))
    }

    async fn count_blacklisted(&self) -> StoreResult<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM ip_blacklist")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl SecurityLogStore for PgStore {
    async fn append_security_event(&self, entry: &SecurityLogEntry) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO security_logs (event_type, ip_address, path, user_id, timestamp) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(entry.event_type.as_str())
        .bind(&entry.ip_address)
        .bind(&entry.path)
        .bind(entry.user_id)
        .bind(entry.timestamp)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn count_security_events(
        &self,
        since: DateTime<Utc>,
        filter: EventFilter<'_>,
    ) -> StoreResult<i64> {
        let query = match filter {
            EventFilter::All => {
                sqlx::query_scalar::<_, i64>(
                    "SELECT COUNT(*) FROM security_logs WHERE timestamp >= $1",
                )
                .bind(since)
            }
            EventFilter::Exact(event_type) => sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM security_logs WHERE timestamp >= $1 AND event_type = $2",
            )
            .bind(since)
            .bind(event_type.as_str()),
            EventFilter::Prefix(prefix) => sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM security_logs \
                 WHERE timestamp >= $1 AND starts_with(event_type, $2)",
            )
            .bind(since)
            .bind(prefix.to_string()),
        };
        Ok(query.fetch_one(&self.pool).await?)
    }
}
