//! Reverse-proxy passthroughs
//!
//! A fixed set of path prefixes is forwarded verbatim to the upstream
//! origin so hand-off pages and their assets load through this server.
//! Unmatched `/api` paths are forwarded too, with the request's resolved
//! location attached to POST JSON bodies.

use std::net::SocketAddr;

use axum::body::Body;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::header::{CONNECTION, CONTENT_LENGTH, CONTENT_TYPE, HOST, TRANSFER_ENCODING};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::{json, Value};
use tracing::error;

use crate::session::client_ip;
use crate::state::AppState;

pub const PROXY_PREFIXES: &[&str] = &[
    "/auth", "/link", "/dpage", "/assets", "/static", "/__assets", "/__static",
];

const MAX_PROXY_BODY: usize = 10 * 1024 * 1024;

pub async fn proxy_fallback(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    req: Request,
) -> Response {
    let path = req.uri().path().to_string();
    let is_api = path == "/api" || path.starts_with("/api/");
    let is_passthrough = PROXY_PREFIXES
        .iter()
        .any(|prefix| path == *prefix || path.starts_with(&format!("{prefix}/")));

    if !is_api && !is_passthrough {
        return StatusCode::NOT_FOUND.into_response();
    }

    let method = req.method().clone();
    let headers = req.headers().clone();
    let query = req
        .uri()
        .query()
        .map(|q| format!("?{q}"))
        .unwrap_or_default();
    let target = format!("{}{}{}", state.settings.upstream_url, path, query);

    let body = match axum::body::to_bytes(req.into_body(), MAX_PROXY_BODY).await {
        Ok(bytes) => bytes,
        Err(err) => {
            error!(component = "proxy", path = %path, error = %err, "failed to read request body");
            return proxy_error();
        }
    };

    let mut forward_headers = HeaderMap::new();
    for (name, value) in &headers {
        if *name == HOST
            || *name == CONTENT_LENGTH
            || *name == CONNECTION
            || *name == TRANSFER_ENCODING
        {
            continue;
        }
        forward_headers.append(name.clone(), value.clone());
    }
    let mut builder = state
        .proxy_http
        .request(method.clone(), target.as_str())
        .headers(forward_headers);

    // Proxied API POSTs get the caller's location attached, the way the
    // upstream expects it from first-party clients.
    if is_api && method == Method::POST {
        let mut value: Value = serde_json::from_slice(&body).unwrap_or_else(|_| json!({}));
        if !value.is_object() {
            value = json!({});
        }
        let ip = client_ip(&headers, peer);
        let location = state.locations.resolve(&ip).await;
        value["location"] = serde_json::to_value(location).unwrap_or(Value::Null);
        match serde_json::to_vec(&value) {
            Ok(encoded) => {
                builder = builder
                    .header(CONTENT_TYPE, "application/json")
                    .body(encoded);
            }
            Err(err) => {
                error!(component = "proxy", path = %path, error = %err, "failed to re-encode body");
                return proxy_error();
            }
        }
    } else {
        builder = builder.body(body);
    }

    match builder.send().await {
        Ok(upstream) => {
            let status = upstream.status();
            let mut response_headers = HeaderMap::new();
            for (name, value) in upstream.headers() {
                if *name == CONTENT_LENGTH || *name == CONNECTION || *name == TRANSFER_ENCODING {
                    continue;
                }
                response_headers.append(name.clone(), value.clone());
            }
            match upstream.bytes().await {
                Ok(bytes) => (status, response_headers, bytes).into_response(),
                Err(err) => {
                    error!(component = "proxy", path = %path, error = %err, "failed to read upstream body");
                    proxy_error()
                }
            }
        }
        Err(err) => {
            error!(component = "proxy", path = %path, error = %err, "upstream request failed");
            proxy_error()
        }
    }
}

fn proxy_error() -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, "Proxy error occurred").into_response()
}
