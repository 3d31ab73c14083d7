use std::net::SocketAddr;

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::error::REQUEST_ID;

/// Per-request facts resolved before any handler runs.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub inet: Option<String>,
}

/// Normalises loopback and IPv4-mapped addresses.
pub fn normalize_ip(ip: &str) -> String {
    let ip = ip.trim();

    if ip == "::1" {
        return "127.0.0.1".to_string();
    }

    ip.strip_prefix("::ffff:").unwrap_or(ip).to_string()
}

fn client_address(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    if let Some(real) = header("x-real-ip") {
        return Some(normalize_ip(real));
    }

    if let Some(forwarded) = header("x-forwarded-for") {
        if let Some(last) = forwarded.split(',').map(str::trim).filter(|s| !s.is_empty()).last() {
            return Some(normalize_ip(last));
        }
    }

    peer.map(|addr| normalize_ip(&addr.ip().to_string()))
}

/// Assigns a request id, resolves the client address and scopes the id for
/// error rendering.
pub async fn request_context(mut request: Request<Body>, next: Next) -> Response {
    let request_id = Uuid::now_v7().to_string().to_uppercase();

    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let inet = client_address(request.headers(), peer);

    tracing::debug!("📨 {} {} rid={}", request.method(), request.uri().path(), request_id);

    request.extensions_mut().insert(RequestContext {
        request_id: request_id.clone(),
        inet,
    });

    REQUEST_ID.scope(request_id, next.run(request)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn address_resolution_order() {
        let mut headers = HeaderMap::new();
        let peer: SocketAddr = "[::1]:5000".parse().unwrap();
        assert_eq!(client_address(&headers, Some(peer)).as_deref(), Some("127.0.0.1"));

        headers.insert("x-forwarded-for", HeaderValue::from_static("10.0.0.1, ::ffff:10.0.0.2"));
        assert_eq!(client_address(&headers, Some(peer)).as_deref(), Some("10.0.0.2"));

        headers.insert("x-real-ip", HeaderValue::from_static("192.168.1.9"));
        assert_eq!(client_address(&headers, None).as_deref(), Some("192.168.1.9"));
    }

    #[test]
    fn no_address_at_all() {
        assert_eq!(client_address(&HeaderMap::new(), None), None);
    }
}
