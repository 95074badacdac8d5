//! API key authentication for machine clients.
//!
//! Independent of sessions: a valid key admits the request but does not
//! produce an `IdentityContext`. Routes behind this gate only see the
//! [`AuthenticatedApiKey`] and must not rely on a user identity.

use airlink_core::auth::api_keys::hash_api_key;
use airlink_core::models::security::SecurityEventType;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use tracing::error;

use super::client_ip::client_ip;
use crate::AppState;
use crate::error::AppError;

/// Header carrying the key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// The key a request was admitted with.
#[derive(Debug, Clone)]
pub struct AuthenticatedApiKey {
    pub id: i64,
    pub name: String,
    pub permissions: Vec<String>,
}

/// Axum middleware: validates `x-api-key` and records its use.
///
/// Store failures reject with 500; this stage does not fail open.
pub async fn validate_api_key(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let ip = client_ip(&request);
    let path = request.uri().path().to_string();

    let presented = match request.headers().get(API_KEY_HEADER) {
        None => None,
        Some(v) if v.is_empty() => None,
        Some(v) => Some(v.to_str().ok().map(hash_api_key)),
    };
    let Some(key_hash) = presented else {
        state
            .security_log
            .record(SecurityEventType::ApiKeyMissing, &ip, &path, None);
        return Err(AppError::MissingCredential("API key missing".into()));
    };

    let found = match key_hash {
        Some(hash) => state
            .stores
            .api_keys
            .find_api_key(&hash)
            .await
            .map_err(|e| {
                error!("API key validation error: {e}");
                AppError::StoreUnavailable(e.to_string())
            })?,
        None => None,
    };

    let now = Utc::now();
    let Some(api_key) = found.filter(|k| k.is_valid(now)) else {
        state
            .security_log
            .record(SecurityEventType::InvalidApiKey, &ip, &path, None);
        return Err(AppError::InvalidCredential("Invalid API key".into()));
    };

    // Spawned so a client disconnect cannot cancel the counter update.
    let api_keys = state.stores.api_keys.clone();
    let key_id = api_key.id;
    tokio::spawn(async move { api_keys.record_api_key_usage(key_id, now).await })
        .await
        .map_err(|e| AppError::Internal(format!("usage update task: {e}")))??;

    request.extensions_mut().insert(AuthenticatedApiKey {
        id: api_key.id,
        name: api_key.name,
        permissions: api_key.permissions,
    });

    Ok(next.run(request).await)
}
