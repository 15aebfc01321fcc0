//! Pipeline stages.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One ordered step of a `perform` call.
///
/// Stages only attribute failures; they never drive control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    /// Turning the declarative request into a transport request.
    Mapping,
    /// Running the backend's request processors.
    RequestProcessing,
    /// Asking the authenticator to sign the request.
    Authenticating,
    /// Handing the request to the dispatcher.
    Dispatching,
    /// Running the backend's response processors.
    ResponseProcessing,
    /// Checking whether the response reports a stale or missing token.
    AuthorizationValidation,
    /// Checking the status code against the request's validation.
    StatusValidation,
    /// Decoding the response body.
    Decoding,
    /// Applying the caller's result mapper.
    ResultMapping,
}

impl PipelineStage {
    /// All stages in execution order.
    pub const ORDERED: [Self; 9] = [
        Self::Mapping,
        Self::RequestProcessing,
        Self::Authenticating,
        Self::Dispatching,
        Self::ResponseProcessing,
        Self::AuthorizationValidation,
        Self::StatusValidation,
        Self::Decoding,
        Self::ResultMapping,
    ];

    /// Returns the stage that follows this one, if any.
    #[must_use]
    pub fn next(self) -> Option<Self> {
        let index = Self::ORDERED.iter().position(|stage| *stage == self)?;
        Self::ORDERED.get(index + 1).copied()
    }

    /// Returns true for stages that run again when an attempt is retried.
    #[must_use]
    pub fn reruns_on_retry(self) -> bool {
        self >= Self::Authenticating
    }
}

impl Default for PipelineStage {
    fn default() -> Self {
        Self::Mapping
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mapping => write!(f, "mapping"),
            Self::RequestProcessing => write!(f, "request_processing"),
            Self::Authenticating => write!(f, "authenticating"),
            Self::Dispatching => write!(f, "dispatching"),
            Self::ResponseProcessing => write!(f, "response_processing"),
            Self::AuthorizationValidation => write!(f, "authorization_validation"),
            Self::StatusValidation => write!(f, "status_validation"),
            Self::Decoding => write!(f, "decoding"),
            Self::ResultMapping => write!(f, "result_mapping"),
        }
    }
}
