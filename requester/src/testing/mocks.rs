//! Mock transport and authenticator for testing.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::time::Duration;

use crate::auth::{AuthenticationError, Authenticator, TokenId};
use crate::errors::TransportError;
use crate::transport::{ResponseMetadata, Transport, TransportRequest, TransportResponse};

type Responder =
    Box<dyn Fn(&TransportRequest) -> Result<TransportResponse, TransportError> + Send + Sync>;
type DelayFn = Box<dyn Fn(&TransportRequest) -> Duration + Send + Sync>;

/// A transport answering from a closure and recording every call.
pub struct MockTransport {
    responder: Responder,
    delay: DelayFn,
    call_count: Mutex<usize>,
    requests: Mutex<Vec<TransportRequest>>,
}

impl MockTransport {
    /// Creates a transport answering with `responder`.
    #[must_use]
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&TransportRequest) -> Result<TransportResponse, TransportError> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            delay: Box::new(|_| Duration::ZERO),
            call_count: Mutex::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Always answers 200 with `body` as JSON.
    #[must_use]
    pub fn ok_json(body: serde_json::Value) -> Self {
        Self::new(move |_| Ok(TransportResponse::json(200, &body)))
    }

    /// Always answers with `status_code` and an empty body.
    #[must_use]
    pub fn with_status(status_code: u16) -> Self {
        Self::new(move |_| Ok(TransportResponse::new(status_code, Bytes::new())))
    }

    /// Always fails with `error`.
    #[must_use]
    pub fn failing(error: TransportError) -> Self {
        Self::new(move |_| Err(error.clone()))
    }

    /// Answers 401 to requests signed with `token`, and 200 otherwise.
    ///
    /// Successful responses echo the authorization header as
    /// `{"authorization": ...}`.
    #[must_use]
    pub fn rejecting_token(token: impl Into<String>) -> Self {
        let rejected = format!("Bearer {}", token.into());
        Self::new(move |request| {
            let authorization = request.header("authorization");
            if authorization == Some(rejected.as_str()) {
                Ok(TransportResponse::new(401, Bytes::new()))
            } else {
                Ok(TransportResponse::json(
                    200,
                    &serde_json::json!({ "authorization": authorization }),
                ))
            }
        })
    }

    /// Delays every response by `delay`.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Box::new(move |_| delay);
        self
    }

    /// Delays each response by what `delay` returns for the request.
    #[must_use]
    pub fn with_delay_fn<F>(mut self, delay: F) -> Self
    where
        F: Fn(&TransportRequest) -> Duration + Send + Sync + 'static,
    {
        self.delay = Box::new(delay);
        self
    }

    /// Returns the number of requests sent.
    #[must_use]
    pub fn call_count(&self) -> usize {
        *self.call_count.lock()
    }

    /// Returns every request sent, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<TransportRequest> {
        self.requests.lock().clone()
    }

    /// Returns the last request sent.
    #[must_use]
    pub fn last_request(&self) -> Option<TransportRequest> {
        self.requests.lock().last().cloned()
    }

    /// Resets call tracking.
    pub fn reset(&self) {
        *self.call_count.lock() = 0;
        self.requests.lock().clear();
    }
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("call_count", &self.call_count())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        *self.call_count.lock() += 1;
        self.requests.lock().push(request.clone());

        let delay = (self.delay)(&request);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        (self.responder)(&request)
    }
}

/// An authenticator issuing `token-1`, `token-2`, ... on each fetch.
#[derive(Debug)]
pub struct MockAuthenticator {
    generation: Mutex<Option<u64>>,
    fetch_count: Mutex<usize>,
    authenticate_count: Mutex<usize>,
    fetch_delay: Duration,
    fail_fetch: bool,
    report_token_id: bool,
    refresh_on_unauthorized: bool,
}

impl MockAuthenticator {
    /// Creates an authenticator holding `token-1`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            generation: Mutex::new(Some(1)),
            fetch_count: Mutex::new(0),
            authenticate_count: Mutex::new(0),
            fetch_delay: Duration::ZERO,
            fail_fetch: false,
            report_token_id: true,
            refresh_on_unauthorized: true,
        }
    }

    /// Creates an authenticator with no token until the first fetch.
    #[must_use]
    pub fn without_token() -> Self {
        Self {
            generation: Mutex::new(None),
            ..Self::new()
        }
    }

    /// Makes each fetch take `delay`.
    #[must_use]
    pub fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = delay;
        self
    }

    /// Makes fetches fail.
    #[must_use]
    pub fn with_failing_fetch(mut self, fail: bool) -> Self {
        self.fail_fetch = fail;
        self
    }

    /// Signs requests without reporting a token id.
    #[must_use]
    pub fn anonymous(mut self) -> Self {
        self.report_token_id = false;
        self
    }

    /// Never asks for a refresh, even on 401.
    #[must_use]
    pub fn declining_refresh(mut self) -> Self {
        self.refresh_on_unauthorized = false;
        self
    }

    /// Returns the current token.
    #[must_use]
    pub fn current_token(&self) -> Option<TokenId> {
        self.generation.lock().map(|n| format!("token-{n}"))
    }

    /// Returns the number of fetches.
    #[must_use]
    pub fn fetch_count(&self) -> usize {
        *self.fetch_count.lock()
    }

    /// Returns the number of signed requests.
    #[must_use]
    pub fn authenticate_count(&self) -> usize {
        *self.authenticate_count.lock()
    }
}

impl Default for MockAuthenticator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Authenticator for MockAuthenticator {
    async fn authenticate(
        &self,
        request: &mut TransportRequest,
    ) -> Result<Option<TokenId>, AuthenticationError> {
        *self.authenticate_count.lock() += 1;
        let token = self.current_token().ok_or(AuthenticationError::MissingToken)?;
        request.set_header("authorization", format!("Bearer {token}"));
        Ok(self.report_token_id.then_some(token))
    }

    async fn fetch_token(&self) -> anyhow::Result<()> {
        *self.fetch_count.lock() += 1;
        if !self.fetch_delay.is_zero() {
            tokio::time::sleep(self.fetch_delay).await;
        }
        if self.fail_fetch {
            anyhow::bail!("token endpoint unavailable");
        }
        let mut generation = self.generation.lock();
        *generation = Some(generation.map_or(1, |n| n + 1));
        Ok(())
    }

    fn should_refresh_token(&self, metadata: &ResponseMetadata, _body: &Bytes) -> bool {
        self.refresh_on_unauthorized && metadata.status_code == 401
    }
}
