//! Per-client request rate limiting.
//!
//! Each client IP gets a window that opens with its first admitted request
//! and lasts `window`. Up to `max_requests` are admitted per window; the
//! rest are rejected with a retry hint until the window closes.

use std::time::{Duration, Instant};

use airlink_core::models::security::SecurityEventType;
use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use dashmap::DashMap;
use tracing::debug;

use super::client_ip::client_ip;
use crate::AppState;
use crate::config::RateLimitConfig;
use crate::error::AppError;

pub const RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("ratelimit-limit");
pub const RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("ratelimit-remaining");
pub const RATELIMIT_RESET: HeaderName = HeaderName::from_static("ratelimit-reset");

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// Quota left after an admitted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    pub limit: u32,
    pub remaining: u32,
    /// Seconds until the window closes.
    pub reset: u64,
}

impl Quota {
    /// Write the `RateLimit-*` headers.
    pub fn apply(&self, headers: &mut HeaderMap) {
        headers.insert(RATELIMIT_LIMIT, HeaderValue::from(self.limit));
        headers.insert(RATELIMIT_REMAINING, HeaderValue::from(self.remaining));
        headers.insert(RATELIMIT_RESET, HeaderValue::from(self.reset));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Admitted(Quota),
    /// `retry_after` is within `[0, window]` seconds.
    Rejected { retry_after: u64 },
}

/// Counter store keyed by client IP.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    windows: DashMap<String, Window>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: DashMap::new(),
        }
    }

    pub fn check(&self, key: &str) -> RateDecision {
        self.check_at(key, Instant::now())
    }

    /// Admit or reject one request from `key` at `now`.
    ///
    /// The window lookup, reset and increment happen under the entry's
    /// shard lock, so concurrent requests from one client never share a slot.
    pub fn check_at(&self, key: &str, now: Instant) -> RateDecision {
        let mut window = self.windows.entry(key.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });

        if now.saturating_duration_since(window.started) >= self.config.window {
            *window = Window {
                started: now,
                count: 0,
            };
        }

        let reset = self.seconds_until_reset(window.started, now);
        if window.count >= self.config.max_requests {
            return RateDecision::Rejected { retry_after: reset };
        }

        window.count += 1;
        RateDecision::Admitted(Quota {
            limit: self.config.max_requests,
            remaining: self.config.max_requests - window.count,
            reset,
        })
    }

    /// `window - elapsed`, rounded up to whole seconds and clamped to
    /// `[0, window]`.
    fn seconds_until_reset(&self, started: Instant, now: Instant) -> u64 {
        let window = self.config.window;
        let left = window.saturating_sub(now.saturating_duration_since(started));
        let secs = left.as_secs() + u64::from(left.subsec_nanos() > 0);
        secs.min(window.as_secs())
    }

    /// Drop windows that have closed. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Instant::now())
    }

    pub fn purge_expired_at(&self, now: Instant) -> usize {
        let before = self.windows.len();
        self.windows
            .retain(|_, w| now.saturating_duration_since(w.started) < self.config.window);
        before.saturating_sub(self.windows.len())
    }

    /// Number of clients currently tracked.
    pub fn tracked(&self) -> usize {
        self.windows.len()
    }

    pub fn window(&self) -> Duration {
        self.config.window
    }
}

/// Axum middleware: first stage of the chain.
pub async fn rate_limit(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let ip = client_ip(&request);
    match state.rate_limiter.check(&ip) {
        RateDecision::Rejected { retry_after } => {
            debug!(%ip, retry_after, "rate limit exceeded");
            state.security_log.record(
                SecurityEventType::RateLimitExceeded,
                &ip,
                request.uri().path(),
                None,
            );
            Err(AppError::RateLimited { retry_after })
        }
        RateDecision::Admitted(quota) => {
            let mut response = next.run(request).await;
            quota.apply(response.headers_mut());
            Ok(response)
        }
    }
}
