//! Per-call execution context.

use serde::{Deserialize, Serialize};

use crate::auth::TokenId;
use crate::core::PipelineStage;
use crate::dispatch::DispatchId;

/// State of one pass through the pipeline.
///
/// Tracks the current stage for failure attribution, the token the request
/// was signed with, and the dispatch it used. A retry carries the previous
/// dispatch id so the two passes can be correlated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineAttempt {
    /// Attempt number, starting at 1.
    pub number: u32,
    /// Stage currently executing.
    pub stage: PipelineStage,
    /// Token the request was signed with.
    pub token_id: Option<TokenId>,
    /// Dispatch used by this attempt.
    pub dispatch_id: Option<DispatchId>,
    /// Dispatch used by the attempt this one retries.
    pub previous_dispatch_id: Option<DispatchId>,
}

impl PipelineAttempt {
    /// The first attempt, starting at `Mapping`.
    #[must_use]
    pub fn first() -> Self {
        Self {
            number: 1,
            stage: PipelineStage::Mapping,
            token_id: None,
            dispatch_id: None,
            previous_dispatch_id: None,
        }
    }

    /// The follow-up attempt, restarting at `Authenticating`.
    #[must_use]
    pub fn retry(&self) -> Self {
        Self {
            number: self.number + 1,
            stage: PipelineStage::Authenticating,
            token_id: None,
            dispatch_id: None,
            previous_dispatch_id: self.dispatch_id,
        }
    }

    /// Returns true if this attempt is a retry.
    #[must_use]
    pub fn is_retry(&self) -> bool {
        self.number > 1
    }

    /// Moves to `stage`.
    pub fn enter(&mut self, stage: PipelineStage) {
        self.stage = stage;
    }
}

impl Default for PipelineAttempt {
    fn default() -> Self {
        Self::first()
    }
}
