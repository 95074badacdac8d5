//! Security and API-key usage reporting over the last 24 hours.

use airlink_core::models::security::{EventFilter, SecurityEventType};
use chrono::{Duration, Utc};

use crate::AppState;
use crate::error::AppResult;
use crate::models::{ApiStatsResponse, SecurityStatsResponse};

/// Prefix shared by API-key event types.
const API_EVENT_PREFIX: &str = "API_";

pub async fn security_stats(state: &AppState) -> AppResult<SecurityStatsResponse> {
    let since = Utc::now() - Duration::hours(24);
    let log = &state.stores.security_log;

    let (total_events, failed_logins, blocked_ips, api_key_events) = tokio::try_join!(
        log.count_security_events(since, EventFilter::All),
        log.count_security_events(since, EventFilter::Exact(SecurityEventType::AuthFailed)),
        state.stores.blacklist.count_blacklisted(),
        log.count_security_events(since, EventFilter::Prefix(API_EVENT_PREFIX)),
    )?;

    Ok(SecurityStatsResponse {
        total_events,
        failed_logins,
        blocked_ips,
        api_key_events,
    })
}

pub async fn api_stats(state: &AppState) -> AppResult<ApiStatsResponse> {
    let since = Utc::now() - Duration::hours(24);
    let (active_keys, total_requests_24h) = tokio::try_join!(
        state.stores.api_keys.count_active_api_keys(),
        state
            .stores
            .security_log
            .count_security_events(since, EventFilter::Prefix(API_EVENT_PREFIX)),
    )?;

    Ok(ApiStatsResponse {
        active_keys,
        total_requests_24h,
    })
}
