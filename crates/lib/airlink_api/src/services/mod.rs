//! Services behind the handlers.

pub mod auth;
pub mod security_log;
pub mod stats;
