//! Observer subscriptions.

use parking_lot::RwLock;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

use super::observer::{ActivityObserver, DispatchReport, PipelineReport};
use crate::dispatch::DispatchId;
use crate::transport::TransportRequest;

/// Handle returned by [`ObserverRegistry::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription(u64);

type Observers = Vec<(u64, Arc<dyn ActivityObserver>)>;

/// The set of subscribed observers.
///
/// Clones share the same subscriptions. Notifications iterate over a
/// snapshot, so observers may subscribe or unsubscribe concurrently with a
/// notification in progress.
#[derive(Clone, Default)]
pub struct ObserverRegistry {
    observers: Arc<RwLock<Observers>>,
    next_id: Arc<AtomicU64>,
}

impl ObserverRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an observer.
    pub fn subscribe(&self, observer: Arc<dyn ActivityObserver>) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.observers.write().push((id, observer));
        Subscription(id)
    }

    /// Removes an observer. Returns false if it was not subscribed.
    pub fn unsubscribe(&self, subscription: Subscription) -> bool {
        let mut observers = self.observers.write();
        let before = observers.len();
        observers.retain(|(id, _)| *id != subscription.0);
        observers.len() != before
    }

    /// Returns the number of subscribed observers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.observers.read().len()
    }

    /// Returns true if nobody is subscribed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.observers.read().is_empty()
    }

    /// Notifies every observer that a dispatch started.
    pub fn dispatch_started(&self, dispatch_id: DispatchId, request: &TransportRequest) {
        self.notify("dispatch_started", |observer| {
            observer.dispatch_started(dispatch_id, request);
        });
    }

    /// Notifies every observer that a dispatch finished.
    pub fn dispatch_finished(&self, report: &DispatchReport) {
        self.notify("dispatch_finished", |observer| observer.dispatch_finished(report));
    }

    /// Notifies every observer that a pipeline attempt finished.
    pub fn pipeline_finished(&self, report: &PipelineReport) {
        self.notify("pipeline_finished", |observer| observer.pipeline_finished(report));
    }

    fn notify<F>(&self, event: &str, f: F)
    where
        F: Fn(&dyn ActivityObserver),
    {
        let snapshot: Vec<Arc<dyn ActivityObserver>> = self
            .observers
            .read()
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();

        for observer in snapshot {
            if let Err(e) = catch_unwind(AssertUnwindSafe(|| f(observer.as_ref()))) {
                warn!(event, "Activity observer panicked: {:?}", e);
            }
        }
    }
}

impl fmt::Debug for ObserverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverRegistry")
            .field("observers", &self.observers.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Method;
    use crate::events::CollectingActivityObserver;

    struct PanickingObserver;

    impl ActivityObserver for PanickingObserver {
        fn dispatch_started(&self, _dispatch_id: DispatchId, _request: &TransportRequest) {
            panic!("observer failure");
        }
    }

    #[test]
    fn test_subscribe_and_unsubscribe() {
        let registry = ObserverRegistry::new();
        let collector = Arc::new(CollectingActivityObserver::new());

        let subscription = registry.subscribe(collector.clone());
        registry.dispatch_started(DispatchId::new(), &TransportRequest::new(Method::Get, "a"));
        assert_eq!(collector.len(), 1);

        assert!(registry.unsubscribe(subscription));
        assert!(!registry.unsubscribe(subscription));
        registry.dispatch_started(DispatchId::new(), &TransportRequest::new(Method::Get, "a"));
        assert_eq!(collector.len(), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_panicking_observer_does_not_stop_others() {
        let registry = ObserverRegistry::new();
        let collector = Arc::new(CollectingActivityObserver::new());
        registry.subscribe(Arc::new(PanickingObserver));
        registry.subscribe(collector.clone());

        registry.dispatch_started(DispatchId::new(), &TransportRequest::new(Method::Get, "a"));

        assert_eq!(collector.dispatches_started(), 1);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_clones_share_subscriptions() {
        let registry = ObserverRegistry::new();
        let clone = registry.clone();
        clone.subscribe(Arc::new(CollectingActivityObserver::new()));
        assert_eq!(registry.len(), 1);
    }
}
