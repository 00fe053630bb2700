//! Session cookie middleware
//!
//! Every request gets a stable opaque session identity, carried in an
//! HttpOnly cookie. The identity keys all per-user server state, so the
//! middleware runs before every handler and the proxy fallback.

use std::net::SocketAddr;

use axum::body::Body;
use axum::http::header::SET_COOKIE;
use axum::http::{HeaderMap, HeaderValue, Request};
use axum::middleware::Next;
use axum::response::Response;
use axum_extra::extract::cookie::{Cookie, CookieJar};
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "pt_session";

/// Opaque per-browser session identity.
#[derive(Debug, Clone)]
pub struct SessionId(pub String);

pub async fn session_middleware(jar: CookieJar, mut req: Request<Body>, next: Next) -> Response {
    let (session_id, is_new) = match jar.get(SESSION_COOKIE) {
        Some(cookie) => (cookie.value().to_string(), false),
        None => (Uuid::new_v4().to_string(), true),
    };

    req.extensions_mut().insert(SessionId(session_id.clone()));
    let mut response = next.run(req).await;

    if is_new {
        let cookie = Cookie::build((SESSION_COOKIE, session_id))
            .path("/")
            .http_only(true)
            .build();
        if let Ok(value) = HeaderValue::from_str(&cookie.to_string()) {
            response.headers_mut().append(SET_COOKIE, value);
        }
    }
    response
}

/// Request IP: first `X-Forwarded-For` entry, else the peer address.
pub fn client_ip(headers: &HeaderMap, peer: SocketAddr) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| peer.ip().to_string())
}
