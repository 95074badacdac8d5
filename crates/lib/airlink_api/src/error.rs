//! Application error types.

use axum::{
    Json,
    extract::Request,
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    middleware::Next,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use crate::models::ErrorResponse;

/// Convenience alias for handler return types.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level errors with HTTP status mapping.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Missing credential: {0}")]
    MissingCredential(String),

    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    #[error("Expired credential: {0}")]
    ExpiredCredential(String),

    #[error("Account suspended")]
    AccountSuspended,

    #[error("Insufficient permissions")]
    InsufficientRole,

    #[error("Rate limited, retry after {retry_after}s")]
    RateLimited { retry_after: u64 },

    #[error("Access denied")]
    Blacklisted,

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal server error")]
    Internal(String),
}

/// Internal detail of a 5xx response, kept out of the body unless the
/// development-mode layer copies it in.
#[derive(Debug, Clone)]
pub struct ErrorDetail(pub String);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, message) = match &self {
            AppError::MissingCredential(m) => {
                (StatusCode::UNAUTHORIZED, "missing_credential", m.as_str())
            }
            AppError::InvalidCredential(m) => {
                (StatusCode::UNAUTHORIZED, "invalid_credential", m.as_str())
            }
            AppError::ExpiredCredential(m) => {
                (StatusCode::UNAUTHORIZED, "expired_credential", m.as_str())
            }
            AppError::AccountSuspended => {
                (StatusCode::FORBIDDEN, "account_suspended", "Account suspended")
            }
            AppError::InsufficientRole => (
                StatusCode::FORBIDDEN,
                "insufficient_role",
                "Forbidden: Insufficient permissions",
            ),
            AppError::RateLimited { .. } => (
                StatusCode::TOO_MANY_REQUESTS,
                "rate_limited",
                "Too many requests, please try again later.",
            ),
            AppError::Blacklisted => (StatusCode::FORBIDDEN, "blacklisted", "Access denied"),
            AppError::StoreUnavailable(_) | AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "Internal server error",
            ),
            AppError::Validation(m) => (StatusCode::BAD_REQUEST, "validation_error", m.as_str()),
            AppError::NotFound(m) => (StatusCode::NOT_FOUND, "not_found", m.as_str()),
        };

        let retry_after = match &self {
            AppError::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        };

        let body = Json(ErrorResponse {
            error: error.to_string(),
            message: message.to_string(),
            retry_after,
        });
        let mut response = (status, body).into_response();

        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(secs));
        }
        if let AppError::StoreUnavailable(detail) | AppError::Internal(detail) = self {
            error!(%detail, "request failed");
            response.extensions_mut().insert(ErrorDetail(detail));
        }
        response
    }
}

impl From<airlink_core::store::StoreError> for AppError {
    fn from(e: airlink_core::store::StoreError) -> Self {
        AppError::StoreUnavailable(e.to_string())
    }
}

impl From<airlink_core::auth::AuthError> for AppError {
    fn from(e: airlink_core::auth::AuthError) -> Self {
        use airlink_core::auth::AuthError;
        match e {
            AuthError::TokenExpired => AppError::ExpiredCredential("Token expired".into()),
            AuthError::TokenInvalid(_) => AppError::InvalidCredential("Invalid token".into()),
            AuthError::MissingSecret | AuthError::Internal(_) => AppError::Internal(e.to_string()),
        }
    }
}

/// Fallback for unmatched routes.
pub async fn not_found() -> AppError {
    AppError::NotFound("The requested resource was not found".into())
}

/// Development-mode middleware: replaces the generic 5xx message with the
/// recorded internal detail.
pub async fn expose_error_detail(request: Request, next: Next) -> Response {
    let response = next.run(request).await;
    let Some(ErrorDetail(detail)) = response.extensions().get::<ErrorDetail>().cloned() else {
        return response;
    };
    let body = Json(ErrorResponse {
        error: "internal_error".into(),
        message: detail,
        retry_after: None,
    });
    (response.status(), body).into_response()
}
