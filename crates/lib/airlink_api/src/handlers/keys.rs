//! Machine-client handlers (API key authenticated).

use axum::{Extension, Json};

use crate::middleware::api_key::AuthenticatedApiKey;
use crate::models::ApiKeyInfo;

/// `GET /api/v1/keys/verify`: describe the key the request presented.
pub async fn verify_handler(
    Extension(key): Extension<AuthenticatedApiKey>,
) -> Json<ApiKeyInfo> {
    Json(ApiKeyInfo {
        id: key.id,
        name: key.name,
        permissions: key.permissions,
    })
}
