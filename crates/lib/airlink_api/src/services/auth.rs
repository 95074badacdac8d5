//! Login: password check, session creation, token issuance.

use airlink_core::auth::jwt::issue_session_token;
use airlink_core::auth::password::verify_password;
use airlink_core::models::security::SecurityEventType;
use chrono::{Duration, Utc};
use tracing::info;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::models::{AuthUser, TokenResponse};

/// Authenticate with email + password and open a new session.
///
/// Unknown email and wrong password are indistinguishable to the caller;
/// both are recorded as `AUTH_FAILED`.
pub async fn login(
    state: &AppState,
    email: &str,
    password: &str,
    ip: &str,
    path: &str,
) -> AppResult<TokenResponse> {
    let credentials = state.stores.users.find_credentials_by_email(email).await?;

    let user = match credentials {
        Some(c) if verify_password(password, &c.password_hash) => c.user,
        Some(c) => {
            state
                .security_log
                .record(SecurityEventType::AuthFailed, ip, path, Some(c.user.id));
            return Err(AppError::InvalidCredential("Invalid credentials".into()));
        }
        None => {
            state
                .security_log
                .record(SecurityEventType::AuthFailed, ip, path, None);
            return Err(AppError::InvalidCredential("Invalid credentials".into()));
        }
    };

    if user.suspended {
        state.security_log.record(
            SecurityEventType::SuspendedUserAccess,
            ip,
            path,
            Some(user.id),
        );
        return Err(AppError::AccountSuspended);
    }

    let ttl = Duration::from_std(state.config.session_ttl)
        .map_err(|e| AppError::Internal(format!("session ttl: {e}")))?;
    let session = state
        .stores
        .sessions
        .create_session(user.id, Utc::now() + ttl)
        .await?;
    let token = issue_session_token(&user, &session, state.config.jwt_secret.as_bytes(), ttl)?;

    info!(user_id = user.id, session_id = %session.id, "user logged in");

    Ok(TokenResponse {
        token,
        token_type: "Bearer".to_string(),
        expires_in: ttl.num_seconds(),
        user: AuthUser {
            id: user.id,
            email: user.email,
            is_admin: user.is_admin,
        },
    })
}
