//! Session authentication: bearer token → session → user → identity context.

use std::collections::BTreeSet;

use airlink_core::auth::jwt::verify_session_token;
use airlink_core::models::security::SecurityEventType;
use axum::http::header::{AUTHORIZATION, USER_AGENT};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::client_ip::client_ip;
use crate::AppState;
use crate::error::AppError;

/// The two roles of the panel, derived from `is_admin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }
}

/// Request metadata captured once, when authentication starts.
#[derive(Debug, Clone)]
pub struct SecurityContext {
    pub ip_address: String,
    pub user_agent: String,
    pub timestamp: DateTime<Utc>,
    pub request_path: String,
}

impl SecurityContext {
    pub fn capture(request: &Request) -> Self {
        Self {
            ip_address: client_ip(request),
            user_agent: request
                .headers()
                .get(USER_AGENT)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("unknown")
                .to_string(),
            timestamp: Utc::now(),
            request_path: request.uri().path().to_string(),
        }
    }
}

/// Authenticated caller, stored in request extensions for downstream
/// stages and handlers.
#[derive(Debug, Clone)]
pub struct IdentityContext {
    pub user_id: i64,
    pub email: String,
    pub is_admin: bool,
    /// Servers owned by the user.
    pub server_ids: BTreeSet<i64>,
    pub security_context: SecurityContext,
}

impl IdentityContext {
    pub fn role(&self) -> Role {
        if self.is_admin { Role::Admin } else { Role::User }
    }
}

/// Extract the token from `Authorization: Bearer <token>`.
fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// Axum middleware: verifies the bearer token, its session and its user,
/// then injects `IdentityContext` into request extensions.
///
/// Each failure is terminal. Store failures map to 500 without an audit
/// event.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let security = SecurityContext::capture(&request);
    let ip = security.ip_address.as_str();
    let path = security.request_path.as_str();
    let log = &state.security_log;

    // An empty value counts as absent.
    let Some(header) = request
        .headers()
        .get(AUTHORIZATION)
        .filter(|v| !v.as_bytes().trim_ascii().is_empty())
    else {
        log.record(SecurityEventType::AuthHeaderMissing, ip, path, None);
        return Err(AppError::MissingCredential(
            "Authorization header missing".into(),
        ));
    };

    let claims = match header
        .to_str()
        .ok()
        .and_then(bearer_token)
        .ok_or(AppError::InvalidCredential("Invalid token".into()))
        .and_then(|token| {
            verify_session_token(token, state.config.jwt_secret.as_bytes()).map_err(AppError::from)
        }) {
        Ok(claims) => claims,
        Err(e) => {
            debug!(%ip, path, "token rejected: {e}");
            log.record(SecurityEventType::InvalidToken, ip, path, None);
            return Err(e);
        }
    };

    let now = Utc::now();
    let session = state.stores.sessions.find_session(&claims.sid).await?;
    match session {
        Some(s) if s.user_id == claims.sub && s.is_active(now) => {}
        Some(s) if s.user_id == claims.sub => {
            log.record(SecurityEventType::InvalidSession, ip, path, Some(claims.sub));
            return Err(AppError::ExpiredCredential("Session expired".into()));
        }
        _ => {
            log.record(SecurityEventType::InvalidSession, ip, path, Some(claims.sub));
            return Err(AppError::InvalidCredential(
                "Session expired or invalid".into(),
            ));
        }
    }

    let Some(user) = state.stores.users.find_user(claims.sub).await? else {
        log.record(SecurityEventType::UserNotFound, ip, path, None);
        return Err(AppError::InvalidCredential("User not found".into()));
    };

    if user.suspended {
        log.record(SecurityEventType::SuspendedUserAccess, ip, path, Some(user.id));
        return Err(AppError::AccountSuspended);
    }

    let server_ids = state.stores.users.owned_server_ids(user.id).await?;

    // Off the response path: a failed activity write only warns.
    let users = state.stores.users.clone();
    let user_id = user.id;
    tokio::spawn(async move {
        if let Err(e) = users.touch_last_activity(user_id, now).await {
            warn!(user_id, "failed to update last activity: {e}");
        }
    });

    request.extensions_mut().insert(IdentityContext {
        user_id: user.id,
        email: user.email,
        is_admin: user.is_admin,
        server_ids: server_ids.into_iter().collect(),
        security_context: security,
    });

    Ok(next.run(request).await)
}
