//! Application state

use std::sync::Arc;

use pageturner_connector::{ConnectorRegistry, ToolInvoker, UpstreamConfig};
use pageturner_protocol::BrandConfig;

use crate::config::{Settings, APP_NAME};
use crate::location::LocationService;

/// Shared state injected into every handler. All mutation happens inside
/// the registry; the rest is read-only after startup.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub brand: Arc<BrandConfig>,
    pub invoker: Arc<ToolInvoker>,
    pub locations: Arc<LocationService>,
    /// Plain client for the reverse-proxy passthroughs.
    pub proxy_http: reqwest::Client,
}

impl AppState {
    pub fn new(settings: Settings) -> anyhow::Result<Self> {
        let settings = Arc::new(settings);
        let locations = Arc::new(LocationService::new(
            &settings.maxmind_account_id,
            &settings.maxmind_license_key,
        ));
        let registry = Arc::new(ConnectorRegistry::new(
            UpstreamConfig {
                endpoint: settings.tool_endpoint()?,
                app_key: settings.app_key.clone(),
                app_name: APP_NAME.to_string(),
            },
            locations.clone(),
        ));

        Ok(Self {
            invoker: Arc::new(ToolInvoker::new(registry)),
            locations,
            brand: Arc::new(BrandConfig::goodreads()),
            proxy_http: reqwest::Client::new(),
            settings,
        })
    }
}
