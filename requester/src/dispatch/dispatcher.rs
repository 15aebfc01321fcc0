//! The dispatcher: one transport call per live dispatch key.

use std::sync::Arc;
use tracing::debug;

use super::key::DispatchKey;
use crate::auth::TokenId;
use crate::coalescing::{Coalescer, OperationId, ProducerPanic};
use crate::core::PipelineStage;
use crate::errors::{ErrorKind, RequestError};
use crate::events::{DispatchReport, ObserverRegistry};
use crate::observability::DispatchTimer;
use crate::transport::{Transport, TransportRequest, TransportResponse};

/// Identifier of one dispatch, shared by every caller coalesced onto it.
pub type DispatchId = OperationId;

type DispatchResult = Result<TransportResponse, RequestError>;

/// Result of [`Dispatcher::dispatch`].
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    /// The dispatch the caller was attached to.
    pub dispatch_id: DispatchId,
    /// True if this caller started the transport call.
    pub leader: bool,
    /// The shared transport result.
    pub result: DispatchResult,
}

/// Performs transport calls, coalescing identical concurrent ones.
///
/// The dispatcher never retries. Failures carry the dispatch id and the
/// `Dispatching` stage.
#[derive(Debug)]
pub struct Dispatcher {
    in_flight: Coalescer<DispatchKey, DispatchResult>,
    observers: ObserverRegistry,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::with_observers(ObserverRegistry::default())
    }
}

impl Dispatcher {
    /// Creates a dispatcher with its own observer registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a dispatcher notifying `observers`.
    #[must_use]
    pub fn with_observers(observers: ObserverRegistry) -> Self {
        let in_flight = Coalescer::new().with_panic_handler(|panic: ProducerPanic| {
            let dispatch_id = panic.operation_id;
            Err(RequestError::new(ErrorKind::Transport)
                .at_stage(PipelineStage::Dispatching)
                .with_dispatch_id(dispatch_id)
                .with_source(panic))
        });
        Self {
            in_flight,
            observers,
        }
    }

    /// Returns the observer registry.
    #[must_use]
    pub fn observers(&self) -> &ObserverRegistry {
        &self.observers
    }

    /// Sends `request`, or joins the live dispatch of an identical request
    /// signed with the same token.
    pub async fn dispatch(
        &self,
        request: TransportRequest,
        token_id: Option<TokenId>,
        transport: Arc<dyn Transport>,
    ) -> DispatchOutcome {
        let key = DispatchKey::new(&request, token_id);
        let observers = self.observers.clone();

        let attachment = self.in_flight.join(key, move |key, dispatch_id| {
            debug!(key = %key, dispatch_id = %dispatch_id, "Dispatching request");
            observers.dispatch_started(dispatch_id, &request);
            async move {
                let timer = DispatchTimer::start(dispatch_id);
                let result = transport.send(request).await.map_err(|error| {
                    RequestError::transport(error)
                        .at_stage(PipelineStage::Dispatching)
                        .with_dispatch_id(dispatch_id)
                });
                let status_code = result.as_ref().ok().map(TransportResponse::status_code);
                observers.dispatch_finished(&DispatchReport {
                    dispatch_id,
                    status_code,
                    error: result.as_ref().err().cloned(),
                    duration_ms: timer.finish(status_code),
                });
                result
            }
        });

        let dispatch_id = attachment.id();
        let leader = attachment.is_leader();
        let result = attachment.wait().await;

        DispatchOutcome {
            dispatch_id,
            leader,
            result,
        }
    }

    /// Fails every live dispatch signed with `token_id`.
    ///
    /// Waiters receive [`crate::errors::ErrorKind::TokenInvalidated`] right
    /// away. Returns the number of dispatches failed.
    pub fn throw_requests(&self, token_id: &TokenId) -> usize {
        let error =
            RequestError::token_invalidated(token_id.clone()).at_stage(PipelineStage::Dispatching);
        self.in_flight.invalidate(|key| key.uses_token(token_id), error)
    }

    /// Fails every live dispatch with `error`.
    pub fn throw_all_requests(&self, error: RequestError) -> usize {
        self.in_flight.invalidate_all(error)
    }

    /// Returns the number of live dispatches.
    #[must_use]
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }
}
