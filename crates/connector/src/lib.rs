//! Upstream connector plumbing
//!
//! One authenticated tool channel per browser session, owned by the
//! [`ConnectorRegistry`]. The [`ToolInvoker`] layers a single
//! reconnect-and-retry on top, which is the only recovery the rest of the
//! system ever performs.

mod channel;
mod invoker;
mod registry;

pub use channel::{ToolChannel, ToolResult};
pub use invoker::{CallOptions, ToolInvoker};
pub use registry::{ConnectorRegistry, NoLocation, ResolveLocation, UpstreamConfig};

use thiserror::Error;

/// Errors surfaced by the connector layer.
#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("HTTP transport error: {0}")]
    Http(reqwest::Error),

    #[error("upstream call timed out")]
    Timeout,

    #[error("JSON-RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ConnectorError {
    /// Timeouts get their own variant so callers can tell a dead channel
    /// from a slow one in logs.
    pub(crate) fn transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ConnectorError::Timeout
        } else {
            ConnectorError::Http(err)
        }
    }
}
