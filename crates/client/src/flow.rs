//! Sign-in flow state machine
//!
//! `Idle → Connecting → Polling → Success | Error`. Transient poll errors
//! are logged and swallowed so a minutes-long interactive sign-in survives
//! blips; only start-time failures, cancellation, or a run of consecutive
//! poll failures abort the attempt.

use pageturner_protocol::{transform, BookRecord, TransformSchema};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::watch;
use tracing::warn;

use crate::api::{ApiClient, ApiError};

const DEFAULT_MAX_CONSECUTIVE_ERRORS: u32 = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    Idle,
    Connecting,
    Polling,
    Success,
    Error,
}

/// Progress events for the presentation layer.
#[derive(Debug, Clone)]
pub enum FlowEvent {
    Connecting,
    /// The hand-off URL is ready for the user's browser.
    HandoffReady { url: String },
    /// One poll round-trip completed (successfully) without finishing.
    Polled { attempt: u32 },
    Completed { records: usize },
}

#[derive(Debug, Error)]
pub enum FlowError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("no signin id received")]
    MissingSigninId,

    #[error("{attempts} consecutive poll failures")]
    PollFailures { attempts: u32 },

    #[error("sign-in attempt cancelled")]
    Cancelled,
}

pub struct SigninFlow {
    api: ApiClient,
    schema: TransformSchema,
    max_consecutive_errors: u32,
    state: FlowState,
}

impl SigninFlow {
    pub fn new(api: ApiClient, schema: TransformSchema) -> Self {
        Self {
            api,
            schema,
            max_consecutive_errors: DEFAULT_MAX_CONSECUTIVE_ERRORS,
            state: FlowState::Idle,
        }
    }

    pub fn with_max_consecutive_errors(mut self, max: u32) -> Self {
        self.max_consecutive_errors = max;
        self
    }

    pub fn state(&self) -> FlowState {
        self.state
    }

    /// User-triggered return to `Idle` after `Success` or `Error`.
    pub fn reset(&mut self) {
        self.state = FlowState::Idle;
    }

    /// Drive one sign-in attempt to completion.
    ///
    /// `cancel` flipping to `true` (or its sender dropping, i.e. the owner
    /// tore the flow down) abandons the attempt. Polls are issued
    /// sequentially with no client-side delay; the server's long poll
    /// provides the pacing.
    pub async fn run(
        &mut self,
        keywords: &[String],
        mut cancel: watch::Receiver<bool>,
        mut progress: impl FnMut(FlowEvent),
    ) -> Result<Vec<BookRecord>, FlowError> {
        self.state = FlowState::Connecting;
        progress(FlowEvent::Connecting);

        let handle = match self.api.get_book_list(keywords).await {
            Ok(handle) => handle,
            Err(err) => {
                self.state = FlowState::Error;
                return Err(err.into());
            }
        };
        if handle.signin_id.is_empty() {
            self.state = FlowState::Error;
            return Err(FlowError::MissingSigninId);
        }
        progress(FlowEvent::HandoffReady {
            url: handle.url.clone(),
        });

        self.state = FlowState::Polling;
        let mut attempt: u32 = 0;
        let mut consecutive_errors: u32 = 0;

        loop {
            if *cancel.borrow() {
                self.state = FlowState::Error;
                return Err(FlowError::Cancelled);
            }

            attempt += 1;
            let outcome = tokio::select! {
                _ = async {
                    // Resolves when cancelled or the sender is gone.
                    let _ = cancel.wait_for(|cancelled| *cancelled).await;
                } => {
                    self.state = FlowState::Error;
                    return Err(FlowError::Cancelled);
                }
                outcome = self.api.poll_signin(&handle.signin_id) => outcome,
            };

            match outcome {
                Ok(poll) => {
                    consecutive_errors = 0;
                    if poll.is_success() {
                        let payload = Value::Object(poll.extra.clone());
                        let records = transform(&payload, &self.schema);
                        self.state = FlowState::Success;
                        progress(FlowEvent::Completed {
                            records: records.len(),
                        });
                        self.finalize(&handle.signin_id);
                        return Ok(records);
                    }
                    progress(FlowEvent::Polled { attempt });
                }
                Err(err) => {
                    consecutive_errors += 1;
                    warn!(
                        component = "signin_flow",
                        attempt,
                        consecutive_errors,
                        error = %err,
                        "poll failed, continuing"
                    );
                    if consecutive_errors >= self.max_consecutive_errors {
                        self.state = FlowState::Error;
                        return Err(FlowError::PollFailures {
                            attempts: consecutive_errors,
                        });
                    }
                }
            }
        }
    }

    /// Fire-and-forget: the attempt already succeeded, a finalize failure
    /// only costs the upstream a dangling record.
    fn finalize(&self, signin_id: &str) {
        let api = self.api.clone();
        let signin_id = signin_id.to_string();
        tokio::spawn(async move {
            if let Err(err) = api.finalize_signin(&signin_id).await {
                warn!(component = "signin_flow", error = %err, "finalize failed");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pageturner_protocol::BrandConfig;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

    /// Replays a fixed response sequence, repeating the last entry.
    struct Script {
        hits: AtomicUsize,
        steps: Vec<ResponseTemplate>,
    }

    impl Script {
        fn new(steps: Vec<ResponseTemplate>) -> Self {
            Self {
                hits: AtomicUsize::new(0),
                steps,
            }
        }
    }

    impl Respond for Script {
        fn respond(&self, _request: &Request) -> ResponseTemplate {
            let hit = self.hits.fetch_add(1, Ordering::SeqCst);
            self.steps[hit.min(self.steps.len() - 1)].clone()
        }
    }

    fn pending() -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": { "status": "PENDING", "message": "waiting" }
        }))
    }

    fn success_with_books() -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": {
                "status": "SUCCESS",
                "message": "done",
                "books": [{
                    "title": "The Left Hand of Darkness",
                    "added_date": "2025-03-01",
                    "cover": "https://example.com/c.jpg",
                    "url": "https://example.com/b/1",
                    "rating": "5"
                }]
            }
        }))
    }

    async fn mount_start(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/api/get-book-list"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": { "url": "http://app.local/dpage/x", "signin_id": "sid-1" }
            })))
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/finalize-signin"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": {}
            })))
            .mount(server)
            .await;
    }

    fn flow_for(server: &MockServer) -> SigninFlow {
        SigninFlow::new(
            ApiClient::new(server.uri()).expect("client"),
            BrandConfig::goodreads().data_transform,
        )
    }

    #[tokio::test]
    async fn scripted_sequence_ends_in_success_with_transformed_payload() {
        let server = MockServer::start().await;
        mount_start(&server).await;
        // PENDING, PENDING, transient error, SUCCESS: four polls total,
        // one suppressed failure.
        Mock::given(method("POST"))
            .and(path("/api/poll-signin"))
            .respond_with(Script::new(vec![
                pending(),
                pending(),
                ResponseTemplate::new(500),
                success_with_books(),
            ]))
            .expect(4)
            .mount(&server)
            .await;

        let mut flow = flow_for(&server);
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        let mut events = Vec::new();
        let records = flow
            .run(&[], cancel_rx, |event| events.push(event))
            .await
            .expect("flow succeeds");

        assert_eq!(flow.state(), FlowState::Success);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title, "The Left Hand of Darkness");
        assert_eq!(records[0].date.as_deref(), Some("2025-03-01"));

        let polled = events
            .iter()
            .filter(|e| matches!(e, FlowEvent::Polled { .. }))
            .count();
        assert_eq!(polled, 2);
        assert!(matches!(events.last(), Some(FlowEvent::Completed { records: 1 })));
    }

    #[tokio::test]
    async fn start_failure_moves_to_error_state() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/get-book-list"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": false,
                "error": "No signin URL found"
            })))
            .mount(&server)
            .await;

        let mut flow = flow_for(&server);
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        let err = flow
            .run(&[], cancel_rx, |_| {})
            .await
            .expect_err("start fails");
        assert!(matches!(err, FlowError::Api(_)));
        assert_eq!(flow.state(), FlowState::Error);
    }

    #[tokio::test]
    async fn empty_signin_id_is_unrecoverable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/get-book-list"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": { "url": "http://app.local/dpage/x", "signin_id": "" }
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/poll-signin"))
            .respond_with(pending())
            .expect(0)
            .mount(&server)
            .await;

        let mut flow = flow_for(&server);
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        let err = flow
            .run(&[], cancel_rx, |_| {})
            .await
            .expect_err("missing id");
        assert!(matches!(err, FlowError::MissingSigninId));
        assert_eq!(flow.state(), FlowState::Error);
    }

    #[tokio::test]
    async fn cancellation_abandons_the_loop() {
        let server = MockServer::start().await;
        mount_start(&server).await;
        Mock::given(method("POST"))
            .and(path("/api/poll-signin"))
            .respond_with(pending().set_delay(Duration::from_millis(200)))
            .mount(&server)
            .await;

        let mut flow = flow_for(&server);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let _ = cancel_tx.send(true);
        });

        let err = flow
            .run(&[], cancel_rx, |_| {})
            .await
            .expect_err("cancelled");
        assert!(matches!(err, FlowError::Cancelled));
        assert_eq!(flow.state(), FlowState::Error);
    }

    #[tokio::test]
    async fn persistent_poll_failure_is_bounded() {
        let server = MockServer::start().await;
        mount_start(&server).await;
        Mock::given(method("POST"))
            .and(path("/api/poll-signin"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&server)
            .await;

        let mut flow = flow_for(&server).with_max_consecutive_errors(3);
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        let err = flow
            .run(&[], cancel_rx, |_| {})
            .await
            .expect_err("bounded");
        assert!(matches!(err, FlowError::PollFailures { attempts: 3 }));
        assert_eq!(flow.state(), FlowState::Error);
    }

    #[tokio::test]
    async fn reset_returns_to_idle() {
        let server = MockServer::start().await;
        let mut flow = flow_for(&server);
        assert_eq!(flow.state(), FlowState::Idle);
        flow.state = FlowState::Error;
        flow.reset();
        assert_eq!(flow.state(), FlowState::Idle);
    }
}
