//! Sign-in negotiator endpoints
//!
//! `get-book-list` starts a sign-in and rewrites the upstream hand-off URL
//! onto this server's own origin so the browser reaches it through the
//! reverse-proxy paths. `poll-signin` relays the upstream's status triple
//! verbatim, blocking for the interactive window.

use std::net::SocketAddr;
use std::time::Duration;

use axum::extract::{ConnectInfo, State};
use axum::http::{header::HOST, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, error};

use pageturner_connector::CallOptions;
use pageturner_protocol::{Envelope, SigninHandle};

use crate::config::Settings;
use crate::session::{client_ip, SessionId};
use crate::state::AppState;

const START_TOOL: &str = "goodreads_get_book_list";
const POLL_TOOL: &str = "check_signin";

/// The upstream poll call may block for the whole interactive sign-in.
const SIGNIN_POLL_TIMEOUT: Duration = Duration::from_millis(6_000_000);

#[derive(Debug, Deserialize)]
pub struct GetBookListRequest {
    #[serde(default)]
    pub keywords: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct PollSigninRequest {
    pub signin_id: Option<String>,
}

pub async fn get_book_list(
    State(state): State<AppState>,
    Extension(session): Extension<SessionId>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(body): Json<GetBookListRequest>,
) -> Response {
    // Keywords arrive from the form but the upstream tool takes none.
    debug!(
        component = "handlers",
        session_id = %session.0,
        keywords = body.keywords.len(),
        "starting sign-in"
    );

    let ip = client_ip(&headers, peer);
    let result = state
        .invoker
        .call(&session.0, &ip, START_TOOL, None, CallOptions::default())
        .await;

    let result = match result {
        Ok(result) => result,
        Err(err) => {
            error!(component = "handlers", session_id = %session.0, error = %err, "get-book-list failed");
            return failure(StatusCode::INTERNAL_SERVER_ERROR, err.to_string());
        }
    };

    let content = result.structured_content.unwrap_or(Value::Null);
    let url = content.get("url").and_then(Value::as_str);

    match url.filter(|u| u.starts_with(&state.settings.upstream_url)) {
        Some(url) => {
            let host = app_host(&state.settings, &headers);
            let rewritten = url.replacen(&state.settings.upstream_url, &host, 1);
            let signin_id = content
                .get("signin_id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            Json(Envelope::ok(SigninHandle {
                url: rewritten,
                signin_id,
            }))
            .into_response()
        }
        None => failure(StatusCode::OK, "No signin URL found"),
    }
}

pub async fn poll_signin(
    State(state): State<AppState>,
    Extension(session): Extension<SessionId>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(body): Json<PollSigninRequest>,
) -> Response {
    let Some(signin_id) = body.signin_id.filter(|id| !id.is_empty()) else {
        return failure(StatusCode::BAD_REQUEST, "signin_id is required");
    };

    let ip = client_ip(&headers, peer);
    let result = state
        .invoker
        .call(
            &session.0,
            &ip,
            POLL_TOOL,
            Some(json!({ "signin_id": signin_id })),
            CallOptions {
                timeout: SIGNIN_POLL_TIMEOUT,
            },
        )
        .await;

    match result {
        Ok(result) => {
            let content = result.structured_content.unwrap_or(Value::Null);
            // Relay the status triple verbatim; the payload field is named
            // by the brand config so client and server stay in agreement.
            let mut data = Map::new();
            for key in ["status", "message"] {
                if let Some(value) = content.get(key) {
                    data.insert(key.to_string(), value.clone());
                }
            }
            if let Some(payload) = content.get("result") {
                data.insert(state.brand.data_transform.data_path.clone(), payload.clone());
            }
            Json(Envelope::ok(Value::Object(data))).into_response()
        }
        Err(err) => {
            error!(component = "handlers", session_id = %session.0, error = %err, "poll-signin failed");
            failure(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

pub async fn health() -> Response {
    Json(json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339(),
    }))
    .into_response()
}

fn failure(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(Envelope::<Value>::err(message))).into_response()
}

/// Externally visible origin for hand-off URL rewriting: the configured
/// override, else the request's own scheme and host.
fn app_host(settings: &Settings, headers: &HeaderMap) -> String {
    if let Some(host) = &settings.app_host {
        return host.clone();
    }
    let proto = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("http");
    let host = headers
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost:5173");
    format!("{proto}://{host}")
}
