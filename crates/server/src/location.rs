//! IP geolocation
//!
//! Resolves request IPs to coarse location context through a MaxMind-style
//! city web service, memoized per IP. Resolution is strictly best-effort:
//! loopback/private addresses, missing credentials, and lookup failures all
//! come back as `None`, which downstream code treats as "no enrichment".

use std::collections::HashMap;
use std::net::IpAddr;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Deserialize;
use tracing::{debug, warn};

use pageturner_connector::ResolveLocation;
use pageturner_protocol::LocationData;

const DEFAULT_ENDPOINT: &str = "https://geoip.maxmind.com/geoip/v2.1/city";

pub struct LocationService {
    account_id: String,
    license_key: String,
    endpoint: String,
    http: reqwest::Client,
    cache: DashMap<String, LocationData>,
}

impl LocationService {
    pub fn new(account_id: impl Into<String>, license_key: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            license_key: license_key.into(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            http: reqwest::Client::new(),
            cache: DashMap::new(),
        }
    }

    /// Point lookups at a different web service (tests).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub async fn resolve(&self, ip: &str) -> Option<LocationData> {
        if !is_routable(ip) {
            debug!(component = "location", ip, "skipping non-routable address");
            return None;
        }

        if let Some(hit) = self.cache.get(ip) {
            return Some(hit.clone());
        }

        if self.account_id.is_empty() || self.license_key.is_empty() {
            debug!(component = "location", "geolocation credentials not configured");
            return None;
        }

        match self.lookup(ip).await {
            Ok(data) => {
                self.cache.insert(ip.to_string(), data.clone());
                Some(data)
            }
            Err(err) => {
                warn!(component = "location", ip, error = %err, "geolocation lookup failed");
                None
            }
        }
    }

    async fn lookup(&self, ip: &str) -> Result<LocationData, reqwest::Error> {
        let response: CityResponse = self
            .http
            .get(format!("{}/{}", self.endpoint, ip))
            .basic_auth(&self.account_id, Some(&self.license_key))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(LocationData {
            ip: ip.to_string(),
            city: response.city.and_then(|c| c.english_name()),
            state: response
                .subdivisions
                .and_then(|s| s.into_iter().last())
                .and_then(|s| s.english_name()),
            country: response.country.and_then(|c| c.iso_code),
            postal_code: response.postal.and_then(|p| p.code),
        })
    }
}

#[async_trait]
impl ResolveLocation for LocationService {
    async fn resolve(&self, ip: &str) -> Option<LocationData> {
        LocationService::resolve(self, ip).await
    }
}

fn is_routable(ip: &str) -> bool {
    match ip.parse::<IpAddr>() {
        Ok(IpAddr::V4(v4)) => !(v4.is_loopback() || v4.is_private() || v4.is_link_local()),
        Ok(IpAddr::V6(v6)) => !v6.is_loopback(),
        // "unknown" and hostnames like "localhost" land here.
        Err(_) => false,
    }
}

#[derive(Debug, Deserialize)]
struct CityResponse {
    city: Option<Named>,
    subdivisions: Option<Vec<Named>>,
    country: Option<Country>,
    postal: Option<Postal>,
}

#[derive(Debug, Deserialize)]
struct Named {
    names: Option<HashMap<String, String>>,
}

impl Named {
    fn english_name(self) -> Option<String> {
        self.names.and_then(|mut names| names.remove("en"))
    }
}

#[derive(Debug, Deserialize)]
struct Country {
    iso_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Postal {
    code: Option<String>,
}
