//! API server configuration.

use std::str::FromStr;
use std::time::Duration;

use airlink_core::auth::jwt::resolve_jwt_secret;
use thiserror::Error;

/// Configuration errors. Any of these aborts startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("JWT_SECRET must be set outside development")]
    MissingJwtSecret,

    #[error("invalid value for {var}: {value:?}")]
    Invalid { var: &'static str, value: String },
}

/// Rate limiter policy.
#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    pub window: Duration,
    pub max_requests: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(60 * 60),
            max_requests: 100,
        }
    }
}

/// Configuration for the API server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Address to bind the HTTP listener (e.g. "127.0.0.1:3100").
    pub bind_addr: String,
    /// PostgreSQL connection URL.
    pub database_url: String,
    /// JWT signing secret.
    pub jwt_secret: String,
    /// Development mode: exposes internal error detail in responses.
    pub development: bool,
    pub rate_limit: RateLimitConfig,
    /// Lifetime of sessions (and their tokens) issued at login.
    pub session_ttl: Duration,
    /// Allowed CORS origin; `*` allows any.
    pub cors_origin: String,
    /// Capacity of the security event queue.
    pub security_log_queue: usize,
}

impl ApiConfig {
    /// Configuration with production defaults around the given secret.
    pub fn new(jwt_secret: impl Into<String>) -> Self {
        Self {
            bind_addr: "127.0.0.1:3100".into(),
            database_url: "postgres://localhost:5432/airlink".into(),
            jwt_secret: jwt_secret.into(),
            development: false,
            rate_limit: RateLimitConfig::default(),
            session_ttl: Duration::from_secs(24 * 60 * 60),
            cors_origin: "*".into(),
            security_log_queue: 1024,
        }
    }

    /// Reads configuration from environment variables.
    ///
    /// | Variable                   | Default                              |
    /// |----------------------------|--------------------------------------|
    /// | `BIND_ADDR`                | `127.0.0.1:3100`                     |
    /// | `DATABASE_URL`             | `postgres://localhost:5432/airlink`  |
    /// | `JWT_SECRET` / `AUTH_SECRET` | required unless development        |
    /// | `AIRLINK_ENV`              | `production`                         |
    /// | `RATE_LIMIT_WINDOW_SECS`   | `3600` (must be > 0)                 |
    /// | `RATE_LIMIT_MAX_REQUESTS`  | `100` (must be > 0)                  |
    /// | `SESSION_TTL_SECS`         | `86400`                              |
    /// | `CORS_ORIGIN`              | `*`                                  |
    /// | `SECURITY_LOG_QUEUE`       | `1024`                               |
    pub fn from_env() -> Result<Self, ConfigError> {
        let development = std::env::var("AIRLINK_ENV")
            .map(|v| v.eq_ignore_ascii_case("development"))
            .unwrap_or(false);
        let jwt_secret =
            resolve_jwt_secret(development).map_err(|_| ConfigError::MissingJwtSecret)?;

        let mut config = Self::new(jwt_secret);
        config.development = development;
        if let Ok(addr) = std::env::var("BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Ok(url) = std::env::var("DATABASE_URL") {
            config.database_url = url;
        }
        if let Ok(origin) = std::env::var("CORS_ORIGIN") {
            config.cors_origin = origin;
        }
        if let Some(secs) = env_parse_positive::<u64>("RATE_LIMIT_WINDOW_SECS")? {
            config.rate_limit.window = Duration::from_secs(secs);
        }
        if let Some(max) = env_parse_positive::<u32>("RATE_LIMIT_MAX_REQUESTS")? {
            config.rate_limit.max_requests = max;
        }
        if let Some(secs) = env_parse::<u64>("SESSION_TTL_SECS")? {
            config.session_ttl = Duration::from_secs(secs);
        }
        if let Some(cap) = env_parse::<usize>("SECURITY_LOG_QUEUE")? {
            config.security_log_queue = cap.max(1);
        }
        Ok(config)
    }
}

fn env_parse<T: FromStr>(var: &'static str) -> Result<Option<T>, ConfigError> {
    std::env::var(var)
        .ok()
        .map(|value| parse_value(var, value))
        .transpose()
}

/// Like [`env_parse`], but zero is rejected.
fn env_parse_positive<T: FromStr + Default + PartialEq>(
    var: &'static str,
) -> Result<Option<T>, ConfigError> {
    std::env::var(var)
        .ok()
        .map(|value| parse_positive(var, value))
        .transpose()
}

fn parse_value<T: FromStr>(var: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid { var, value })
}

fn parse_positive<T: FromStr + Default + PartialEq>(
    var: &'static str,
    value: String,
) -> Result<T, ConfigError> {
    match value.trim().parse::<T>() {
        Ok(parsed) if parsed != T::default() => Ok(parsed),
        _ => Err(ConfigError::Invalid { var, value }),
    }
}
