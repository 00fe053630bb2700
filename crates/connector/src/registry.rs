//! Session-to-connector registry
//!
//! Guarantees at most one live channel per session identity and serializes
//! channel creation behind a single gate. The registry is built once at
//! server start and injected into request handlers.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info};
use url::Url;

use pageturner_protocol::LocationData;

use crate::channel::{ChannelConfig, ToolChannel};
use crate::ConnectorError;

/// Geolocation collaborator. `None` means "no enrichment", never an error.
#[async_trait]
pub trait ResolveLocation: Send + Sync {
    async fn resolve(&self, ip: &str) -> Option<LocationData>;
}

/// Upstream connection parameters shared by every channel.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub endpoint: Url,
    pub app_key: String,
    pub app_name: String,
}

pub struct ConnectorRegistry {
    config: UpstreamConfig,
    resolver: Arc<dyn ResolveLocation>,
    http: reqwest::Client,
    channels: Mutex<HashMap<String, Arc<ToolChannel>>>,
    /// Single creation gate across all sessions: request bursts that race
    /// past the map check queue here instead of opening duplicate upstream
    /// channels.
    create_gate: Mutex<()>,
}

impl ConnectorRegistry {
    pub fn new(config: UpstreamConfig, resolver: Arc<dyn ResolveLocation>) -> Self {
        Self {
            config,
            resolver,
            http: reqwest::Client::new(),
            channels: Mutex::new(HashMap::new()),
            create_gate: Mutex::new(()),
        }
    }

    /// Return the session's channel, opening one if none exists.
    ///
    /// Creation resolves the caller's location first, then performs the
    /// upstream handshake. An open failure leaves no entry behind, so the
    /// next acquire retries from scratch.
    pub async fn acquire(
        &self,
        session_id: &str,
        ip: &str,
    ) -> Result<Arc<ToolChannel>, ConnectorError> {
        if let Some(channel) = self.channels.lock().await.get(session_id) {
            return Ok(channel.clone());
        }

        let _creating = self.create_gate.lock().await;
        // Re-check under the gate: a racing caller may have finished the
        // open while this one waited.
        if let Some(channel) = self.channels.lock().await.get(session_id) {
            return Ok(channel.clone());
        }

        let location = self.resolver.resolve(ip).await;
        let channel = Arc::new(
            ToolChannel::open(
                &self.http,
                &ChannelConfig {
                    endpoint: self.config.endpoint.clone(),
                    app_key: self.config.app_key.clone(),
                    app_name: self.config.app_name.clone(),
                    session_id: session_id.to_string(),
                    location,
                },
            )
            .await?,
        );

        self.channels
            .lock()
            .await
            .insert(session_id.to_string(), channel.clone());
        info!(component = "registry", session_id, "connector channel opened");
        Ok(channel)
    }

    /// Drop the session's channel, closing it best-effort.
    pub async fn invalidate(&self, session_id: &str) {
        let removed = self.channels.lock().await.remove(session_id);
        if let Some(channel) = removed {
            channel.close().await;
            debug!(component = "registry", session_id, "connector channel invalidated");
        }
    }

    /// Invalidate then acquire; the invoker's reconnect path.
    pub async fn reset(
        &self,
        session_id: &str,
        ip: &str,
    ) -> Result<Arc<ToolChannel>, ConnectorError> {
        self.invalidate(session_id).await;
        self.acquire(session_id, ip).await
    }
}

/// Resolver that never enriches; used where geolocation is not configured.
pub struct NoLocation;

#[async_trait]
impl ResolveLocation for NoLocation {
    async fn resolve(&self, _ip: &str) -> Option<LocationData> {
        None
    }
}
