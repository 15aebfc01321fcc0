//! Bounded in-memory log of dispatched requests.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use super::observer::{ActivityObserver, DispatchReport, PipelineReport};
use crate::core::{Method, PipelineStage};
use crate::dispatch::DispatchId;
use crate::transport::TransportRequest;

/// State of a recorded dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ActivityState {
    /// Waiting for the transport.
    InProgress,
    /// A response arrived.
    Succeeded {
        /// Response status.
        status_code: u16,
    },
    /// The dispatch failed or was invalidated.
    Failed {
        /// Failure description.
        message: String,
    },
}

/// How one pipeline attempt that used a dispatch ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineResult {
    /// Attempt number.
    pub attempt: u32,
    /// The stage that failed, if any.
    pub failed_stage: Option<PipelineStage>,
    /// Failure description, if any.
    pub error: Option<String>,
    /// The dispatch the attempt retried.
    pub previous_dispatch_id: Option<DispatchId>,
}

/// One dispatched request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityItem {
    /// The dispatch.
    pub dispatch_id: DispatchId,
    /// Request method.
    pub method: Method,
    /// Request URL.
    pub url: String,
    /// When the dispatch was created.
    pub started_at: DateTime<Utc>,
    /// When it finished.
    pub completed_at: Option<DateTime<Utc>>,
    /// Current state.
    pub state: ActivityState,
    /// Transport time, once finished.
    pub duration_ms: Option<f64>,
    /// Pipelines that used this dispatch.
    pub results: Vec<PipelineResult>,
}

/// Keeps the most recent dispatches for inspection.
///
/// Subscribe it to a requester to feed it. When full, the oldest item is
/// dropped.
#[derive(Debug)]
pub struct ActivityStore {
    items: RwLock<VecDeque<ActivityItem>>,
    max_items: usize,
}

impl ActivityStore {
    /// Default capacity.
    pub const DEFAULT_MAX_ITEMS: usize = 500;

    /// Creates a store holding at most `max_items` items.
    #[must_use]
    pub fn new(max_items: usize) -> Self {
        Self {
            items: RwLock::new(VecDeque::new()),
            max_items: max_items.max(1),
        }
    }

    /// Returns the recorded items, oldest first.
    #[must_use]
    pub fn items(&self) -> Vec<ActivityItem> {
        self.items.read().iter().cloned().collect()
    }

    /// Returns the item for a dispatch.
    #[must_use]
    pub fn get(&self, dispatch_id: DispatchId) -> Option<ActivityItem> {
        self.items
            .read()
            .iter()
            .find(|item| item.dispatch_id == dispatch_id)
            .cloned()
    }

    /// Returns the number of recorded items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    /// Returns true if nothing is recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }

    /// Removes every item.
    pub fn clear(&self) {
        self.items.write().clear();
    }

    fn update<F>(&self, dispatch_id: DispatchId, f: F)
    where
        F: FnOnce(&mut ActivityItem),
    {
        let mut items = self.items.write();
        if let Some(item) = items.iter_mut().rev().find(|item| item.dispatch_id == dispatch_id) {
            f(item);
        }
    }
}

impl Default for ActivityStore {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_ITEMS)
    }
}

impl ActivityObserver for ActivityStore {
    fn dispatch_started(&self, dispatch_id: DispatchId, request: &TransportRequest) {
        let mut items = self.items.write();
        while items.len() >= self.max_items {
            items.pop_front();
        }
        items.push_back(ActivityItem {
            dispatch_id,
            method: request.method,
            url: request.url.clone(),
            started_at: Utc::now(),
            completed_at: None,
            state: ActivityState::InProgress,
            duration_ms: None,
            results: Vec::new(),
        });
    }

    fn dispatch_finished(&self, report: &DispatchReport) {
        self.update(report.dispatch_id, |item| {
            item.completed_at = Some(Utc::now());
            item.duration_ms = Some(report.duration_ms);
            item.state = match (&report.error, report.status_code) {
                (Some(error), _) => ActivityState::Failed {
                    message: error.to_string(),
                },
                (None, status_code) => ActivityState::Succeeded {
                    status_code: status_code.unwrap_or_default(),
                },
            };
        });
    }

    fn pipeline_finished(&self, report: &PipelineReport) {
        let Some(dispatch_id) = report.dispatch_id else {
            return;
        };
        self.update(dispatch_id, |item| {
            item.results.push(PipelineResult {
                attempt: report.attempt,
                failed_stage: report.failed_stage,
                error: report.error.as_ref().map(ToString::to_string),
                previous_dispatch_id: report.previous_dispatch_id,
            });
        });
    }
}
