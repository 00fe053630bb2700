//! Envelope-aware HTTP client

use pageturner_protocol::{Envelope, PollOutcome, SigninHandle};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {0}")]
    Status(reqwest::StatusCode),

    #[error("{0}")]
    Api(String),
}

/// Client for the server's `/api` surface.
///
/// Carries a cookie store so the session cookie issued on the first request
/// binds every later call to the same server-side connector.
#[derive(Clone)]
pub struct ApiClient {
    base_url: String,
    http: reqwest::Client,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder().cookie_store(true).build()?;
        Ok(Self {
            base_url: base_url.into(),
            http,
        })
    }

    async fn post_envelope<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &Value,
    ) -> Result<Envelope<T>, ApiError> {
        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status(status));
        }

        let envelope: Envelope<T> = response.json().await?;
        if !envelope.success {
            return Err(ApiError::Api(
                envelope
                    .error
                    .unwrap_or_else(|| "API request failed".to_string()),
            ));
        }
        Ok(envelope)
    }

    async fn post<T: DeserializeOwned>(&self, path: &str, body: &Value) -> Result<T, ApiError> {
        self.post_envelope(path, body)
            .await?
            .data
            .ok_or_else(|| ApiError::Api("response carried no data".to_string()))
    }

    /// Start a sign-in attempt; returns the hand-off URL and correlation id.
    pub async fn get_book_list(&self, keywords: &[String]) -> Result<SigninHandle, ApiError> {
        self.post("/api/get-book-list", &json!({ "keywords": keywords }))
            .await
    }

    /// Poll a sign-in attempt. The server blocks for the interactive
    /// window, so this call can legitimately take minutes.
    pub async fn poll_signin(&self, signin_id: &str) -> Result<PollOutcome, ApiError> {
        self.post("/api/poll-signin", &json!({ "signin_id": signin_id }))
            .await
    }

    /// Tell the upstream the attempt is done; proxied through the server.
    pub async fn finalize_signin(&self, signin_id: &str) -> Result<(), ApiError> {
        let _: Envelope<Value> = self
            .post_envelope("/api/finalize-signin", &json!({ "signin_id": signin_id }))
            .await?;
        Ok(())
    }
}
