//! Client identity and security response headers.
//!
//! # Responsibilities
//! - Derive the client identity used as the rate-limit key
//! - Add security response headers to non-exempt responses
//!
//! # Design Decisions
//! - Identity comes from the first matching source, never a combination:
//!   X-Forwarded-For (first entry), then X-Real-IP, then the socket address
//! - HSTS only when the edge proxy reports HTTPS via X-Forwarded-Proto
//! - Exempt prefixes are shared with the rate limiter

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;
use std::sync::Arc;

pub const X_FORWARDED_FOR: &str = "x-forwarded-for";
pub const X_REAL_IP: &str = "x-real-ip";
pub const X_FORWARDED_PROTO: &str = "x-forwarded-proto";

const CONTENT_SECURITY_POLICY: &str = "default-src 'self'; script-src 'self' 'unsafe-inline'; \
     style-src 'self' 'unsafe-inline'; img-src 'self' data:; connect-src 'self'; \
     font-src 'self'; object-src 'none'; media-src 'self'; frame-src 'none';";

/// Identity of the caller as seen through trusted proxy headers.
pub fn client_identity(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    if let Some(forwarded) = header_str(headers, X_FORWARDED_FOR) {
        if let Some(first) = forwarded.split(',').next().map(str::trim) {
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }

    if let Some(real_ip) = header_str(headers, X_REAL_IP) {
        if !real_ip.is_empty() {
            return real_ip.to_string();
        }
    }

    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// [`client_identity`] for an axum request, reading the peer address from
/// `ConnectInfo` when the server was started with it.
pub fn request_client_identity(request: &Request<Body>) -> String {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    client_identity(request.headers(), peer)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// Whether `path` starts with one of `prefixes`.
pub fn is_exempt(path: &str, prefixes: &[String]) -> bool {
    prefixes.iter().any(|prefix| path.starts_with(prefix.as_str()))
}

/// Security header policy.
#[derive(Debug, Clone)]
pub struct SecurityHeaders {
    enabled: bool,
    exempt_prefixes: Vec<String>,
}

impl SecurityHeaders {
    pub fn new(enabled: bool, exempt_prefixes: Vec<String>) -> Self {
        Self {
            enabled,
            exempt_prefixes,
        }
    }

    /// Add the headers for a response to a request on `path`.
    pub fn apply(&self, path: &str, over_https: bool, headers: &mut HeaderMap) {
        if !self.enabled || is_exempt(path, &self.exempt_prefixes) {
            return;
        }

        let mut set = |name: HeaderName, value: &'static str| {
            headers.insert(name, HeaderValue::from_static(value));
        };
        set(header::X_CONTENT_TYPE_OPTIONS, "nosniff");
        set(header::X_FRAME_OPTIONS, "DENY");
        set(header::X_XSS_PROTECTION, "1; mode=block");
        set(header::REFERRER_POLICY, "strict-origin-when-cross-origin");
        set(
            HeaderName::from_static("permissions-policy"),
            "geolocation=(), microphone=(), camera=()",
        );
        set(header::CONTENT_SECURITY_POLICY, CONTENT_SECURITY_POLICY);
        if over_https {
            set(
                header::STRICT_TRANSPORT_SECURITY,
                "max-age=31536000; includeSubDomains",
            );
        }
    }
}

/// Middleware adding security headers to every non-exempt response.
pub async fn security_headers_middleware(
    State(policy): State<Arc<SecurityHeaders>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    let over_https = header_str(request.headers(), X_FORWARDED_PROTO)
        .map(|proto| proto.eq_ignore_ascii_case("https"))
        .unwrap_or(false);

    let mut response = next.run(request).await;
    policy.apply(&path, over_https, response.headers_mut());
    response
}
