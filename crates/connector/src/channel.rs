//! Streamable HTTP tool channel
//!
//! JSON-RPC over HTTP POST against the upstream automation service. A
//! channel is opened with an `initialize` handshake; the upstream's
//! `mcp-session-id` response header is captured and echoed on every later
//! request, which is what binds the channel to one remote browser context.
//! Responses arrive either as plain JSON or as an SSE stream carrying
//! JSON-RPC frames in `data:` lines.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;
use url::Url;

use pageturner_protocol::LocationData;

use crate::ConnectorError;

const PROTOCOL_VERSION: &str = "2025-03-26";
const SESSION_HEADER: &str = "mcp-session-id";

/// Everything needed to open a channel for one browser session.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Upstream tool endpoint, e.g. `http://127.0.0.1:23456/mcp-books/`.
    pub endpoint: Url,
    /// Application key; the bearer credential is `<app_key>_<session_id>`.
    pub app_key: String,
    /// Value for the upstream's custom-app header.
    pub app_name: String,
    pub session_id: String,
    pub location: Option<LocationData>,
}

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Serialize)]
struct RpcNotification<'a> {
    jsonrpc: &'static str,
    method: &'a str,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    id: Option<u64>,
    result: Option<Value>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

/// Result of a `tools/call`, as returned by the upstream service.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    #[serde(default)]
    pub content: Vec<Value>,
    pub structured_content: Option<Value>,
    #[serde(default)]
    pub is_error: bool,
}

/// An open, session-bound channel to the upstream service.
#[derive(Debug)]
pub struct ToolChannel {
    http: reqwest::Client,
    endpoint: Url,
    headers: HeaderMap,
    upstream_session: Option<String>,
    next_id: AtomicU64,
}

impl ToolChannel {
    /// Open a channel: send the `initialize` handshake with the session's
    /// auth headers and capture the upstream session id.
    pub async fn open(
        http: &reqwest::Client,
        config: &ChannelConfig,
    ) -> Result<Self, ConnectorError> {
        let mut headers = HeaderMap::new();
        let bearer = format!("Bearer {}_{}", config.app_key, config.session_id);
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&bearer)
                .map_err(|_| ConnectorError::Protocol("invalid bearer credential".into()))?,
        );
        headers.insert(
            "x-custom-app",
            HeaderValue::from_str(&config.app_name)
                .map_err(|_| ConnectorError::Protocol("invalid app name".into()))?,
        );
        headers.insert("x-incognito", HeaderValue::from_static("1"));
        let location = match &config.location {
            Some(location) => serde_json::to_string(location)?,
            None => String::new(),
        };
        headers.insert(
            "x-location",
            HeaderValue::from_str(&location)
                .map_err(|_| ConnectorError::Protocol("invalid location header".into()))?,
        );

        let mut channel = Self {
            http: http.clone(),
            endpoint: config.endpoint.clone(),
            headers,
            upstream_session: None,
            next_id: AtomicU64::new(1),
        };

        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": "pageturner-server",
                "version": env!("CARGO_PKG_VERSION"),
            },
        });

        let id = channel.next_id.fetch_add(1, Ordering::Relaxed);
        let request = RpcRequest {
            jsonrpc: "2.0",
            id,
            method: "initialize",
            params,
        };

        let response = channel
            .http
            .post(channel.endpoint.clone())
            .headers(channel.headers.clone())
            .header(ACCEPT, "application/json, text/event-stream")
            .json(&request)
            .send()
            .await
            .map_err(ConnectorError::transport)?
            .error_for_status()
            .map_err(ConnectorError::transport)?;

        if let Some(session) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            channel.upstream_session = Some(session.to_string());
        }

        // Consume the handshake result so protocol errors surface here
        // instead of on the first tool call.
        Self::decode_response(response, id).await?;

        channel.notify("notifications/initialized").await?;

        debug!(
            component = "connector",
            session_id = %config.session_id,
            upstream_session = ?channel.upstream_session,
            "channel opened"
        );

        Ok(channel)
    }

    /// Invoke a named tool. The caller-supplied timeout bounds the whole
    /// HTTP exchange; sign-in polls pass a deliberately long one.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Option<Value>,
        timeout: Duration,
    ) -> Result<ToolResult, ConnectorError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = RpcRequest {
            jsonrpc: "2.0",
            id,
            method: "tools/call",
            params: json!({
                "name": name,
                "arguments": arguments.unwrap_or_else(|| json!({})),
            }),
        };

        let mut builder = self
            .http
            .post(self.endpoint.clone())
            .headers(self.headers.clone())
            .header(ACCEPT, "application/json, text/event-stream")
            .timeout(timeout)
            .json(&request);
        if let Some(session) = &self.upstream_session {
            builder = builder.header(SESSION_HEADER, session);
        }

        let response = builder
            .send()
            .await
            .map_err(ConnectorError::transport)?
            .error_for_status()
            .map_err(ConnectorError::transport)?;

        let result = Self::decode_response(response, id).await?;
        Ok(serde_json::from_value(result)?)
    }

    /// Best-effort teardown of the upstream session. Errors are ignored;
    /// the registry drops the handle regardless.
    pub async fn close(&self) {
        let Some(session) = &self.upstream_session else {
            return;
        };
        let _ = self
            .http
            .delete(self.endpoint.clone())
            .headers(self.headers.clone())
            .header(SESSION_HEADER, session)
            .send()
            .await;
    }

    async fn notify(&self, method: &str) -> Result<(), ConnectorError> {
        let notification = RpcNotification {
            jsonrpc: "2.0",
            method,
        };
        let mut builder = self
            .http
            .post(self.endpoint.clone())
            .headers(self.headers.clone())
            .header(ACCEPT, "application/json, text/event-stream")
            .json(&notification);
        if let Some(session) = &self.upstream_session {
            builder = builder.header(SESSION_HEADER, session);
        }
        builder.send().await.map_err(ConnectorError::transport)?;
        Ok(())
    }

    /// Extract the JSON-RPC result from either a plain JSON body or an SSE
    /// stream of `data:` frames.
    async fn decode_response(
        response: reqwest::Response,
        request_id: u64,
    ) -> Result<Value, ConnectorError> {
        let is_event_stream = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.starts_with("text/event-stream"))
            .unwrap_or(false);

        let body = response.text().await.map_err(ConnectorError::transport)?;

        let rpc: RpcResponse = if is_event_stream {
            Self::find_sse_response(&body, request_id)?
        } else {
            serde_json::from_str(&body)?
        };

        if let Some(error) = rpc.error {
            return Err(ConnectorError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        rpc.result
            .ok_or_else(|| ConnectorError::Protocol("response carried neither result nor error".into()))
    }

    fn find_sse_response(body: &str, request_id: u64) -> Result<RpcResponse, ConnectorError> {
        for line in body.lines() {
            let Some(data) = line.strip_prefix("data:") else {
                continue;
            };
            let Ok(rpc) = serde_json::from_str::<RpcResponse>(data.trim()) else {
                continue;
            };
            if rpc.id == Some(request_id) {
                return Ok(rpc);
            }
        }
        Err(ConnectorError::Protocol(format!(
            "no response frame for request {request_id} in event stream"
        )))
    }
}
