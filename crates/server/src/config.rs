//! Environment-driven settings

use url::Url;

/// Value of the upstream's custom-app header.
pub const APP_NAME: &str = "page-turner";

#[derive(Debug, Clone)]
pub struct Settings {
    /// Origin of the upstream automation service.
    pub upstream_url: String,
    /// Application key; combined with the session id into the bearer
    /// credential.
    pub app_key: String,
    /// Externally visible host override. When unset, hand-off URLs are
    /// rewritten against the request's own scheme and Host header.
    pub app_host: Option<String>,
    pub maxmind_account_id: String,
    pub maxmind_license_key: String,
    pub environment: String,
}

impl Settings {
    pub fn from_env() -> Self {
        Self {
            upstream_url: var_or("PAGETURNER_UPSTREAM_URL", "http://127.0.0.1:23456"),
            app_key: var_or("PAGETURNER_APP_KEY", ""),
            app_host: std::env::var("APP_HOST").ok().filter(|v| !v.is_empty()),
            maxmind_account_id: var_or("MAXMIND_ACCOUNT_ID", ""),
            maxmind_license_key: var_or("MAXMIND_LICENSE_KEY", ""),
            environment: var_or("PAGETURNER_ENV", "development"),
        }
    }

    /// Tool endpoint on the upstream origin.
    pub fn tool_endpoint(&self) -> Result<Url, url::ParseError> {
        Url::parse(&format!(
            "{}/mcp-books/",
            self.upstream_url.trim_end_matches('/')
        ))
    }
}

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_endpoint_normalizes_trailing_slash() {
        let mut settings = Settings::from_env();
        settings.upstream_url = "http://upstream:23456/".to_string();
        let endpoint = settings.tool_endpoint().expect("endpoint");
        assert_eq!(endpoint.as_str(), "http://upstream:23456/mcp-books/");
    }
}
