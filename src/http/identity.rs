//! Client identity extraction.

use axum::http::HeaderMap;
use std::net::SocketAddr;

/// Header set by reverse proxies carrying the original client address.
pub const FORWARDED_FOR: &str = "x-forwarded-for";

/// Derive the identity key for a request.
///
/// The first entry of `X-Forwarded-For` wins when present, since the
/// connection peer is then the proxy. Otherwise the peer IP is used.
pub fn client_key(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    let forwarded = headers
        .get(FORWARDED_FOR)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    if let Some(client) = forwarded {
        return Some(client.to_string());
    }

    peer.map(|addr| addr.ip().to_string())
}
