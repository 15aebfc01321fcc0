//! Dispatch latency measurement.

use std::time::{Duration, Instant};
use tracing::debug;

use crate::dispatch::DispatchId;

/// Measures the time a dispatch spends in its transport call.
#[derive(Debug, Clone, Copy)]
pub struct DispatchTimer {
    dispatch_id: DispatchId,
    started: Instant,
}

impl DispatchTimer {
    /// Starts timing `dispatch_id`.
    #[must_use]
    pub fn start(dispatch_id: DispatchId) -> Self {
        Self {
            dispatch_id,
            started: Instant::now(),
        }
    }

    /// Returns the timed dispatch.
    #[must_use]
    pub fn dispatch_id(&self) -> DispatchId {
        self.dispatch_id
    }

    /// Returns the time since the timer started.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Stops the timer and returns the latency in milliseconds.
    ///
    /// `status_code` is `None` when the transport call failed.
    pub fn finish(self, status_code: Option<u16>) -> f64 {
        let duration_ms = self.elapsed().as_secs_f64() * 1000.0;
        debug!(
            dispatch_id = %self.dispatch_id,
            status_code = ?status_code,
            duration_ms,
            "Transport call finished"
        );
        duration_ms
    }
}
