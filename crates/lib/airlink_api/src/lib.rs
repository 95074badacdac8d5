//! # airlink_api
//!
//! HTTP API for the Airlink Panel: the security middleware chain (rate
//! limiting, IP blacklist, session and API-key authentication, role
//! authorization) and the handlers mounted behind it.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;

use std::sync::Arc;
use std::time::Duration;

use airlink_core::store::{PgStore, Stores};
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::header::{
    AUTHORIZATION, CONTENT_SECURITY_POLICY, CONTENT_TYPE, REFERRER_POLICY,
    X_CONTENT_TYPE_OPTIONS, X_FRAME_OPTIONS,
};
use axum::http::{HeaderName, HeaderValue, Method};
use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{get, post};
use sqlx::PgPool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::warn;

use crate::config::ApiConfig;
use crate::handlers::{admin, health, keys, users};
use crate::middleware::api_key::{API_KEY_HEADER, validate_api_key};
use crate::middleware::auth::require_auth;
use crate::middleware::authorize::{ADMIN, ANY_ROLE, RoleGate, authorize};
use crate::middleware::ip_blacklist::ip_security;
use crate::middleware::rate_limit::{RateLimiter, rate_limit};
use crate::services::security_log::SecurityLog;

/// Maximum accepted request body.
const BODY_LIMIT_BYTES: usize = 1024 * 1024;

const CONTENT_SECURITY_POLICY_VALUE: &str = "default-src 'self'; script-src 'self' 'unsafe-inline'; \
     style-src 'self' 'unsafe-inline'; img-src 'self' data: https:";

/// Shared application state passed to all handlers and middleware.
#[derive(Clone)]
pub struct AppState {
    pub stores: Stores,
    pub config: ApiConfig,
    pub rate_limiter: Arc<RateLimiter>,
    pub security_log: SecurityLog,
}

impl AppState {
    /// Build state over the given stores.
    ///
    /// Spawns the security log drain, so this must run inside a Tokio runtime.
    /// Call `security_log.flush()` before the runtime stops, or queued events
    /// are lost with the drain task.
    pub fn new(stores: Stores, config: ApiConfig) -> Self {
        let (security_log, _drain) =
            SecurityLog::spawn(stores.security_log.clone(), config.security_log_queue);
        let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));
        Self {
            stores,
            config,
            rate_limiter,
            security_log,
        }
    }

    /// State backed by PostgreSQL.
    pub fn postgres(pool: PgPool, config: ApiConfig) -> Self {
        Self::new(Stores::shared(Arc::new(PgStore::new(pool))), config)
    }
}

/// Run embedded database migrations.
///
/// Delegates to `airlink_core::migrate::migrate()` which owns the migration files.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    airlink_core::migrate::migrate(pool).await
}

fn cors_layer(origin: &str) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            CONTENT_TYPE,
            AUTHORIZATION,
            HeaderName::from_static(API_KEY_HEADER),
        ])
        .max_age(Duration::from_secs(86400));

    if origin == "*" {
        return cors.allow_origin(Any);
    }
    match HeaderValue::from_str(origin) {
        // Credentials are only legal with a concrete origin.
        Ok(origin) => cors.allow_origin(origin).allow_credentials(true),
        Err(_) => {
            warn!(origin, "invalid CORS_ORIGIN, allowing any origin");
            cors.allow_origin(Any)
        }
    }
}

/// Builds the Axum router with all routes, the security chain and shared state.
pub fn router(state: AppState) -> Router {
    // Public routes (only the global chain applies)
    let public = Router::new()
        .route("/api/health", get(health::health))
        .route("/api/v1/users/login", post(users::login_handler));

    // Session routes, any role
    let session = Router::new()
        .route("/api/v1/users/me", get(users::me_handler))
        .route_layer(from_fn_with_state(
            RoleGate::new(state.security_log.clone(), ANY_ROLE),
            authorize,
        ))
        .route_layer(from_fn_with_state(state.clone(), require_auth));

    // Session routes, admin only
    let admin = Router::new()
        .route(
            "/api/v1/admin/security/stats",
            get(admin::security_stats_handler),
        )
        .route("/api/v1/admin/api/stats", get(admin::api_stats_handler))
        .route_layer(from_fn_with_state(
            RoleGate::new(state.security_log.clone(), ADMIN),
            authorize,
        ))
        .route_layer(from_fn_with_state(state.clone(), require_auth));

    // Machine routes
    let machine = Router::new()
        .route("/api/v1/keys/verify", get(keys::verify_handler))
        .route_layer(from_fn_with_state(state.clone(), validate_api_key));

    // Layers run bottom-up: rate limit first, then the blacklist.
    let mut app = Router::new()
        .merge(public)
        .merge(session)
        .merge(admin)
        .merge(machine)
        .fallback(error::not_found)
        .layer(from_fn_with_state(state.clone(), ip_security))
        .layer(from_fn_with_state(state.clone(), rate_limit))
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES));

    if state.config.development {
        app = app.layer(from_fn(error::expose_error_detail));
    }

    app.layer(SetResponseHeaderLayer::if_not_present(
        X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    ))
    .layer(SetResponseHeaderLayer::if_not_present(
        REFERRER_POLICY,
        HeaderValue::from_static("same-origin"),
    ))
    .layer(SetResponseHeaderLayer::if_not_present(
        X_FRAME_OPTIONS,
        HeaderValue::from_static("SAMEORIGIN"),
    ))
    .layer(SetResponseHeaderLayer::if_not_present(
        CONTENT_SECURITY_POLICY,
        HeaderValue::from_static(CONTENT_SECURITY_POLICY_VALUE),
    ))
    .layer(cors_layer(&state.config.cors_origin))
    .with_state(state)
}
