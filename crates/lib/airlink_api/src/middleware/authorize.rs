//! Role-based authorization.
//!
//! Must be layered inside [`require_auth`](super::auth::require_auth); a
//! request reaching it without an `IdentityContext` is treated as
//! unauthenticated.

use airlink_core::models::security::SecurityEventType;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::debug;

use super::auth::{IdentityContext, Role};
use crate::error::AppError;
use crate::services::security_log::SecurityLog;

/// Only administrators.
pub const ADMIN: &[Role] = &[Role::Admin];

/// Any authenticated account.
pub const ANY_ROLE: &[Role] = &[Role::Admin, Role::User];

/// Middleware state: the roles a route admits.
#[derive(Clone)]
pub struct RoleGate {
    allowed: &'static [Role],
    security_log: SecurityLog,
}

impl RoleGate {
    pub fn new(security_log: SecurityLog, allowed: &'static [Role]) -> Self {
        Self {
            allowed,
            security_log,
        }
    }

    pub fn permits(&self, role: Role) -> bool {
        self.allowed.contains(&role)
    }
}

/// Axum middleware: rejects callers whose role the gate does not admit.
pub async fn authorize(
    State(gate): State<RoleGate>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(identity) = request.extensions().get::<IdentityContext>() else {
        return Err(AppError::MissingCredential("Unauthorized".into()));
    };

    let role = identity.role();
    if !gate.permits(role) {
        debug!(user_id = identity.user_id, role = role.as_str(), "insufficient role");
        gate.security_log.record(
            SecurityEventType::InsufficientPermissions,
            &identity.security_context.ip_address,
            request.uri().path(),
            Some(identity.user_id),
        );
        return Err(AppError::InsufficientRole);
    }

    Ok(next.run(request).await)
}
