//! Security middleware chain.
//!
//! Order per request: `rate_limit` → `ip_blacklist`, then either
//! `auth` → `authorize` (session routes) or `api_key` (machine routes).

pub mod api_key;
pub mod auth;
pub mod authorize;
pub mod client_ip;
pub mod ip_blacklist;
pub mod rate_limit;
