//! Activity observation.
//!
//! Observers are told when a dispatch starts, when it finishes, and how each
//! pipeline that used it ended. They are purely observational: a panicking
//! observer is logged and skipped, never allowed to affect a request.

mod activity;
mod observer;
mod registry;

pub use activity::{ActivityItem, ActivityState, ActivityStore, PipelineResult};
pub use observer::{
    ActivityObserver, CollectingActivityObserver, DispatchReport, LoggingActivityObserver,
    ObservedEvent, PipelineReport,
};
pub use registry::{ObserverRegistry, Subscription};
