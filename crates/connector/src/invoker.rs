//! Tool invoker
//!
//! Executes one named remote operation against a session's channel with
//! exactly one reconnect-and-retry. Upstream channels die silently (idle
//! timeout, process restart); a single blind reconnect recovers the common
//! case without hiding persistent failures behind a retry loop.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{info, warn};

use crate::channel::ToolResult;
use crate::registry::ConnectorRegistry;
use crate::ConnectorError;

/// Per-call options. Sign-in polls override the timeout with a long one.
#[derive(Debug, Clone)]
pub struct CallOptions {
    pub timeout: Duration,
}

impl Default for CallOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
        }
    }
}

pub struct ToolInvoker {
    registry: Arc<ConnectorRegistry>,
}

impl ToolInvoker {
    pub fn new(registry: Arc<ConnectorRegistry>) -> Self {
        Self { registry }
    }

    /// Call `name` on the session's channel. On any failure the channel is
    /// reset and the call retried once; a second failure propagates.
    pub async fn call(
        &self,
        session_id: &str,
        ip: &str,
        name: &str,
        arguments: Option<Value>,
        options: CallOptions,
    ) -> Result<ToolResult, ConnectorError> {
        info!(component = "invoker", tool = name, session_id, "calling tool");

        let channel = self.registry.acquire(session_id, ip).await?;
        match channel
            .call_tool(name, arguments.clone(), options.timeout)
            .await
        {
            Ok(result) => Ok(result),
            Err(err) => {
                warn!(
                    component = "invoker",
                    tool = name,
                    session_id,
                    error = %err,
                    "tool call failed, reconnecting"
                );
                let channel = self.registry.reset(session_id, ip).await?;
                channel.call_tool(name, arguments, options.timeout).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{NoLocation, UpstreamConfig};
    use serde_json::json;
    use url::Url;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn invoker_for(server: &MockServer) -> ToolInvoker {
        ToolInvoker::new(Arc::new(ConnectorRegistry::new(
            UpstreamConfig {
                endpoint: Url::parse(&format!("{}/mcp-books/", server.uri())).expect("endpoint"),
                app_key: "app-key".to_string(),
                app_name: "page-turner".to_string(),
            },
            Arc::new(NoLocation),
        )))
    }

    async fn mount_handshake(server: &MockServer, expected_opens: u64) {
        Mock::given(method("POST"))
            .and(path("/mcp-books/"))
            .and(body_partial_json(json!({ "method": "initialize" })))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("mcp-session-id", "up-sess")
                    .set_body_json(json!({
                        "jsonrpc": "2.0",
                        "id": 1,
                        "result": { "protocolVersion": "2025-03-26", "capabilities": {} }
                    })),
            )
            .expect(expected_opens)
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(path("/mcp-books/"))
            .and(body_partial_json(json!({ "method": "notifications/initialized" })))
            .respond_with(ResponseTemplate::new(202))
            .mount(server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/mcp-books/"))
            .respond_with(ResponseTemplate::new(200))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn retries_once_after_a_failure_and_succeeds() {
        let server = MockServer::start().await;
        // One open for the first call, one for the reconnect.
        mount_handshake(&server, 2).await;

        Mock::given(method("POST"))
            .and(path("/mcp-books/"))
            .and(body_partial_json(json!({ "method": "tools/call" })))
            .respond_with(ResponseTemplate::new(502))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/mcp-books/"))
            .and(body_partial_json(json!({ "method": "tools/call" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 2,
                "result": {
                    "content": [],
                    "structuredContent": { "status": "PENDING" }
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let invoker = invoker_for(&server);
        let result = invoker
            .call("s1", "1.1.1.1", "check_signin", None, CallOptions::default())
            .await
            .expect("retry succeeds");
        assert!(result.structured_content.is_some());
    }

    #[tokio::test]
    async fn second_failure_propagates_without_a_third_attempt() {
        let server = MockServer::start().await;
        mount_handshake(&server, 2).await;

        Mock::given(method("POST"))
            .and(path("/mcp-books/"))
            .and(body_partial_json(json!({ "method": "tools/call" })))
            .respond_with(ResponseTemplate::new(502))
            .expect(2)
            .mount(&server)
            .await;

        let invoker = invoker_for(&server);
        let err = invoker
            .call("s1", "1.1.1.1", "check_signin", None, CallOptions::default())
            .await
            .expect_err("second failure propagates");
        assert!(matches!(err, ConnectorError::Http(_)));
    }
}
