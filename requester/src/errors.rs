//! Error types for request execution.
//!
//! Every failure a caller of `perform` can observe is a [`RequestError`]:
//! a classification ([`ErrorKind`]) plus the stage that failed, the status
//! code when a response was received, and the underlying error if any.
//! `RequestError` is `Clone` so a single coalesced outcome can be handed to
//! every waiter.

use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::auth::TokenId;
use crate::core::PipelineStage;
use crate::dispatch::DispatchId;

/// A shareable, type-erased underlying error.
pub type SharedError = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Classification of a request failure.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error)]
pub enum ErrorKind {
    /// The authenticator had no token to sign the request with.
    #[error("missing authentication token")]
    MissingToken,

    /// The token used for the request is known to be invalid.
    #[error("token '{0}' was invalidated")]
    TokenInvalidated(TokenId),

    /// The server answered 401 and no recovery is possible.
    #[error("unauthorized")]
    Unauthorized,

    /// The status code did not pass validation.
    #[error("invalid status code")]
    InvalidStatusCode,

    /// The response body could not be decoded.
    #[error("decoding failed")]
    DecodingFailed,

    /// The transport failed to deliver the request.
    #[error("transport error")]
    Transport,

    /// The authenticator failed to fetch a new token.
    #[error("token refresh failed")]
    RefreshFailed,

    /// The declarative request could not be turned into a transport request.
    #[error("request mapping failed")]
    RequestMapping,

    /// A request processor rejected the request.
    #[error("request processing failed")]
    RequestProcessing,

    /// A response processor rejected the response.
    #[error("response processing failed")]
    ResponseProcessing,

    /// The caller's result mapper failed.
    #[error("result mapping failed")]
    ResultMapping,
}

impl ErrorKind {
    /// Returns a stable snake-case name for the kind.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::MissingToken => "missing_token",
            Self::TokenInvalidated(_) => "token_invalidated",
            Self::Unauthorized => "unauthorized",
            Self::InvalidStatusCode => "invalid_status_code",
            Self::DecodingFailed => "decoding_failed",
            Self::Transport => "transport",
            Self::RefreshFailed => "refresh_failed",
            Self::RequestMapping => "request_mapping",
            Self::RequestProcessing => "request_processing",
            Self::ResponseProcessing => "response_processing",
            Self::ResultMapping => "result_mapping",
        }
    }
}

/// Errors produced by a [`crate::transport::Transport`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The request did not complete in time.
    #[error("request timed out")]
    Timeout,

    /// No connection could be established.
    #[error("connection failed: {0}")]
    Connect(String),

    /// The request could not be built.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Reading or writing the connection failed.
    #[error("i/o error: {0}")]
    Io(String),

    /// Any other transport failure.
    #[error("transport failure: {0}")]
    Other(String),
}

/// The error returned by every fallible request operation.
#[derive(Debug, Clone, Error)]
#[error("{}", describe(kind, *stage, *status_code, message.as_deref(), source.as_deref()))]
pub struct RequestError {
    /// What went wrong.
    pub kind: ErrorKind,
    /// The stage that raised the error, if known.
    pub stage: Option<PipelineStage>,
    /// The HTTP status code, when a response was received.
    pub status_code: Option<u16>,
    /// Additional human-readable context.
    pub message: Option<String>,
    /// The dispatch the error belongs to, if the request was dispatched.
    pub dispatch_id: Option<DispatchId>,
    #[source]
    source: Option<SharedError>,
}

impl RequestError {
    /// Creates a new error of the given kind.
    #[must_use]
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            stage: None,
            status_code: None,
            message: None,
            dispatch_id: None,
            source: None,
        }
    }

    /// Creates a missing token error.
    #[must_use]
    pub fn missing_token() -> Self {
        Self::new(ErrorKind::MissingToken)
    }

    /// Creates a token invalidated error.
    #[must_use]
    pub fn token_invalidated(token_id: impl Into<TokenId>) -> Self {
        Self::new(ErrorKind::TokenInvalidated(token_id.into()))
    }

    /// Creates an unauthorized error.
    #[must_use]
    pub fn unauthorized() -> Self {
        Self::new(ErrorKind::Unauthorized)
    }

    /// Creates an invalid status code error.
    #[must_use]
    pub fn invalid_status_code(status_code: u16) -> Self {
        Self::new(ErrorKind::InvalidStatusCode).with_status_code(status_code)
    }

    /// Wraps a transport failure.
    #[must_use]
    pub fn transport(error: TransportError) -> Self {
        Self::new(ErrorKind::Transport).with_source(error)
    }

    /// Wraps a user-supplied hook failure under the given kind.
    #[must_use]
    pub fn from_hook(kind: ErrorKind, error: anyhow::Error) -> Self {
        let boxed: Box<dyn std::error::Error + Send + Sync + 'static> = error.into();
        Self {
            source: Some(Arc::from(boxed)),
            ..Self::new(kind)
        }
    }

    /// Sets the stage that raised the error.
    #[must_use]
    pub fn at_stage(mut self, stage: PipelineStage) -> Self {
        self.stage = Some(stage);
        self
    }

    /// Sets the status code.
    #[must_use]
    pub fn with_status_code(mut self, status_code: u16) -> Self {
        self.status_code = Some(status_code);
        self
    }

    /// Sets the message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Sets the dispatch the error belongs to.
    #[must_use]
    pub fn with_dispatch_id(mut self, dispatch_id: DispatchId) -> Self {
        self.dispatch_id = Some(dispatch_id);
        self
    }

    /// Sets the underlying error.
    #[must_use]
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Arc::new(source));
        self
    }

    /// Returns the underlying error, if any.
    #[must_use]
    pub fn underlying(&self) -> Option<&SharedError> {
        self.source.as_ref()
    }

    /// Returns true for the failures that drive invalidate, refresh and retry.
    #[must_use]
    pub fn is_auth_recoverable(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::MissingToken | ErrorKind::TokenInvalidated(_)
        )
    }

    /// Returns the invalidated token, if this is a token invalidation.
    #[must_use]
    pub fn invalidated_token(&self) -> Option<&TokenId> {
        match &self.kind {
            ErrorKind::TokenInvalidated(token_id) => Some(token_id),
            _ => None,
        }
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("type".to_string(), json!(self.kind.name()));
        map.insert("message".to_string(), json!(self.to_string()));

        if let ErrorKind::TokenInvalidated(ref token_id) = self.kind {
            map.insert("token_id".to_string(), json!(token_id));
        }
        if let Some(stage) = self.stage {
            map.insert("stage".to_string(), json!(stage));
        }
        if let Some(code) = self.status_code {
            map.insert("status_code".to_string(), json!(code));
        }
        if let Some(id) = self.dispatch_id {
            map.insert("dispatch_id".to_string(), json!(id.to_string()));
        }
        if let Some(ref source) = self.source {
            map.insert("source".to_string(), json!(source.to_string()));
        }

        map
    }
}

fn describe(
    kind: &ErrorKind,
    stage: Option<PipelineStage>,
    status_code: Option<u16>,
    message: Option<&str>,
    source: Option<&(dyn std::error::Error + Send + Sync)>,
) -> String {
    let mut description = kind.to_string();
    if let Some(stage) = stage {
        description.push_str(&format!(" during {stage}"));
    }
    if let Some(code) = status_code {
        description.push_str(&format!(" (status {code})"));
    }
    if let Some(message) = message {
        description.push_str(&format!(": {message}"));
    } else if let Some(source) = source {
        description.push_str(&format!(": {source}"));
    }
    description
}

impl From<TransportError> for RequestError {
    fn from(error: TransportError) -> Self {
        Self::transport(error)
    }
}
