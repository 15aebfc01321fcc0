//! Observer trait and basic implementations.

use parking_lot::RwLock;
use tracing::{debug, info, Level};

use crate::core::PipelineStage;
use crate::dispatch::DispatchId;
use crate::errors::RequestError;
use crate::transport::TransportRequest;

/// Outcome of one dispatch, reported once per dispatch.
#[derive(Debug, Clone)]
pub struct DispatchReport {
    /// The dispatch.
    pub dispatch_id: DispatchId,
    /// Status code, when a response arrived.
    pub status_code: Option<u16>,
    /// The failure, if the dispatch failed.
    pub error: Option<RequestError>,
    /// Time spent in the transport.
    pub duration_ms: f64,
}

impl DispatchReport {
    /// Returns true if a response arrived.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Outcome of one pipeline attempt, reported once per caller and attempt.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    /// The dispatch the attempt used, if it got that far.
    pub dispatch_id: Option<DispatchId>,
    /// The dispatch of the attempt this one retried.
    pub previous_dispatch_id: Option<DispatchId>,
    /// Attempt number, starting at 1.
    pub attempt: u32,
    /// The stage that failed.
    pub failed_stage: Option<PipelineStage>,
    /// The failure.
    pub error: Option<RequestError>,
}

impl PipelineReport {
    /// Returns true if the attempt produced a result.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Receives activity notifications.
///
/// All methods default to no-ops. They are called synchronously from the
/// request path and must return quickly.
pub trait ActivityObserver: Send + Sync {
    /// A new dispatch was created for `request`.
    fn dispatch_started(&self, _dispatch_id: DispatchId, _request: &TransportRequest) {}

    /// A dispatch finished, successfully or not.
    fn dispatch_finished(&self, _report: &DispatchReport) {}

    /// A pipeline attempt finished.
    fn pipeline_finished(&self, _report: &PipelineReport) {}
}

/// Logs activity through `tracing`.
#[derive(Debug, Clone)]
pub struct LoggingActivityObserver {
    level: Level,
}

impl Default for LoggingActivityObserver {
    fn default() -> Self {
        Self { level: Level::DEBUG }
    }
}

impl LoggingActivityObserver {
    /// Creates an observer logging at `level`.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates an info-level observer.
    #[must_use]
    pub fn info() -> Self {
        Self::new(Level::INFO)
    }

    fn log(&self, event: &str, dispatch_id: Option<DispatchId>, detail: &str) {
        let dispatch_id = dispatch_id.map(|id| id.to_string()).unwrap_or_default();
        if self.level == Level::INFO {
            info!(event, dispatch_id = %dispatch_id, detail, "Activity: {}", event);
        } else {
            debug!(event, dispatch_id = %dispatch_id, detail, "Activity: {}", event);
        }
    }
}

impl ActivityObserver for LoggingActivityObserver {
    fn dispatch_started(&self, dispatch_id: DispatchId, request: &TransportRequest) {
        self.log(
            "dispatch.started",
            Some(dispatch_id),
            &format!("{} {}", request.method, request.url),
        );
    }

    fn dispatch_finished(&self, report: &DispatchReport) {
        let detail = match (&report.error, report.status_code) {
            (Some(error), _) => error.to_string(),
            (None, Some(code)) => format!("status {code} in {:.1}ms", report.duration_ms),
            (None, None) => format!("{:.1}ms", report.duration_ms),
        };
        self.log("dispatch.finished", Some(report.dispatch_id), &detail);
    }

    fn pipeline_finished(&self, report: &PipelineReport) {
        let detail = match &report.error {
            Some(error) => format!("attempt {} failed: {error}", report.attempt),
            None => format!("attempt {} succeeded", report.attempt),
        };
        self.log("pipeline.finished", report.dispatch_id, &detail);
    }
}

/// A notification captured by [`CollectingActivityObserver`].
#[derive(Debug, Clone)]
pub enum ObservedEvent {
    /// See [`ActivityObserver::dispatch_started`].
    DispatchStarted(DispatchId, TransportRequest),
    /// See [`ActivityObserver::dispatch_finished`].
    DispatchFinished(DispatchReport),
    /// See [`ActivityObserver::pipeline_finished`].
    PipelineFinished(PipelineReport),
}

/// Records every notification, for tests.
#[derive(Debug, Default)]
pub struct CollectingActivityObserver {
    events: RwLock<Vec<ObservedEvent>>,
}

impl CollectingActivityObserver {
    /// Creates an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    #[must_use]
    pub fn events(&self) -> Vec<ObservedEvent> {
        self.events.read().clone()
    }

    /// Returns the number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if nothing has been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Returns the number of dispatches started.
    #[must_use]
    pub fn dispatches_started(&self) -> usize {
        self.events
            .read()
            .iter()
            .filter(|event| matches!(event, ObservedEvent::DispatchStarted(..)))
            .count()
    }

    /// Returns the collected pipeline reports.
    #[must_use]
    pub fn pipeline_reports(&self) -> Vec<PipelineReport> {
        self.events
            .read()
            .iter()
            .filter_map(|event| match event {
                ObservedEvent::PipelineFinished(report) => Some(report.clone()),
                _ => None,
            })
            .collect()
    }

    /// Clears collected events.
    pub fn clear(&self) {
        self.events.write().clear();
    }
}

impl ActivityObserver for CollectingActivityObserver {
    fn dispatch_started(&self, dispatch_id: DispatchId, request: &TransportRequest) {
        self.events
            .write()
            .push(ObservedEvent::DispatchStarted(dispatch_id, request.clone()));
    }

    fn dispatch_finished(&self, report: &DispatchReport) {
        self.events
            .write()
            .push(ObservedEvent::DispatchFinished(report.clone()));
    }

    fn pipeline_finished(&self, report: &PipelineReport) {
        self.events
            .write()
            .push(ObservedEvent::PipelineFinished(report.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Method;

    #[test]
    fn test_logging_observer_does_not_panic() {
        let observer = LoggingActivityObserver::info();
        let id = DispatchId::new();
        observer.dispatch_started(id, &TransportRequest::new(Method::Get, "https://example.com"));
        observer.dispatch_finished(&DispatchReport {
            dispatch_id: id,
            status_code: Some(200),
            error: None,
            duration_ms: 1.5,
        });
        observer.pipeline_finished(&PipelineReport {
            dispatch_id: Some(id),
            previous_dispatch_id: None,
            attempt: 1,
            failed_stage: Some(PipelineStage::Decoding),
            error: Some(RequestError::new(crate::errors::ErrorKind::DecodingFailed)),
        });
    }

    #[test]
    fn test_collecting_observer() {
        let observer = CollectingActivityObserver::new();
        assert!(observer.is_empty());

        let id = DispatchId::new();
        observer.dispatch_started(id, &TransportRequest::new(Method::Post, "https://example.com"));
        observer.pipeline_finished(&PipelineReport {
            dispatch_id: Some(id),
            previous_dispatch_id: None,
            attempt: 1,
            failed_stage: None,
            error: None,
        });

        assert_eq!(observer.len(), 2);
        assert_eq!(observer.dispatches_started(), 1);
        assert!(observer.pipeline_reports()[0].is_success());

        observer.clear();
        assert!(observer.is_empty());
    }
}
