//! Client address resolution shared by every stage of the chain.

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::extract::{ConnectInfo, FromRequestParts, Request};
use axum::http::HeaderMap;
use axum::http::request::Parts;

/// Header set by reverse proxies in front of the panel.
pub const FORWARDED_FOR: &str = "x-forwarded-for";

/// Placeholder when no address can be determined.
pub const UNKNOWN_IP: &str = "unknown";

/// Resolve the client IP: first `X-Forwarded-For` hop, then the socket
/// peer address, then `"unknown"`.
pub fn resolve(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    headers
        .get(FORWARDED_FOR)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| UNKNOWN_IP.to_string())
}

/// [`resolve`] against an incoming request.
pub fn client_ip(request: &Request) -> String {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0);
    resolve(request.headers(), peer)
}

/// Extractor for handlers that need the resolved client IP.
#[derive(Debug, Clone)]
pub struct ClientIp(pub String);

impl<S: Send + Sync> FromRequestParts<S> for ClientIp {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|info| info.0);
        Ok(ClientIp(resolve(&parts.headers, peer)))
    }
}
