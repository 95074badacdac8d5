//! IP denylist check.
//!
//! A listed address is refused regardless of any credential it presents.
//! If the blacklist store itself is unreachable the request is let through:
//! this stage favours availability, unlike the credential stages.

use airlink_core::models::security::SecurityEventType;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::{info, warn};

use super::client_ip::client_ip;
use crate::AppState;
use crate::error::AppError;

/// Axum middleware: second stage of the chain, after rate limiting.
pub async fn ip_security(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let ip = client_ip(&request);

    match state.stores.blacklist.find_blacklisted(&ip).await {
        Ok(Some(entry)) => {
            info!(%ip, reason = entry.reason.as_deref().unwrap_or(""), "blocked IP");
            state.security_log.record(
                SecurityEventType::BlockedIpAccess,
                &ip,
                request.uri().path(),
                None,
            );
            Err(AppError::Blacklisted)
        }
        Ok(None) => Ok(next.run(request).await),
        Err(e) => {
            warn!(%ip, "IP security check error, allowing request: {e}");
            Ok(next.run(request).await)
        }
    }
}
