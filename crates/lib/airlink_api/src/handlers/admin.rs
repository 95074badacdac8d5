//! Admin reporting handlers.

use axum::Json;
use axum::extract::State;

use crate::AppState;
use crate::error::AppResult;
use crate::models::{ApiStatsResponse, SecurityStatsResponse};
use crate::services::stats;

/// `GET /api/v1/admin/security/stats`: security event counts, last 24h.
pub async fn security_stats_handler(
    State(state): State<AppState>,
) -> AppResult<Json<SecurityStatsResponse>> {
    Ok(Json(stats::security_stats(&state).await?))
}

/// `GET /api/v1/admin/api/stats`: active keys and API-key events, last 24h.
pub async fn api_stats_handler(
    State(state): State<AppState>,
) -> AppResult<Json<ApiStatsResponse>> {
    Ok(Json(stats::api_stats(&state).await?))
}
