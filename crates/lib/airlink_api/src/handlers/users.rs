//! User session handlers.

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::Uri;
use axum::{Extension, Json};
use tracing::debug;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::IdentityContext;
use crate::middleware::client_ip::ClientIp;
use crate::models::{IdentityResponse, LoginRequest, SecurityContextResponse, TokenResponse};
use crate::services::auth;

/// `POST /api/v1/users/login`: exchange email + password for a session token.
pub async fn login_handler(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    uri: Uri,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> AppResult<Json<TokenResponse>> {
    let Json(body) = body.map_err(|rejection| {
        debug!("login body rejected: {}", rejection.body_text());
        AppError::Validation("Invalid login request body".into())
    })?;
    let resp = auth::login(&state, &body.email, &body.password, &ip, uri.path()).await?;
    Ok(Json(resp))
}

/// `GET /api/v1/users/me`: the identity the request was authenticated as.
pub async fn me_handler(
    Extension(identity): Extension<IdentityContext>,
) -> Json<IdentityResponse> {
    let role = identity.role().as_str().to_string();
    let security = identity.security_context;
    Json(IdentityResponse {
        id: identity.user_id,
        email: identity.email,
        is_admin: identity.is_admin,
        role,
        servers: identity.server_ids.into_iter().collect(),
        security_context: SecurityContextResponse {
            ip_address: security.ip_address,
            user_agent: security.user_agent,
            timestamp: security.timestamp.to_rfc3339(),
            request_path: security.request_path,
        },
    })
}
