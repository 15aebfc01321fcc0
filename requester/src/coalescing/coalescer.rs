//! Keyed registry of in-flight operations.

use futures::FutureExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, warn};

use super::operation::{Operation, OperationId, ProducerPanic};

type Registry<K, R> = Arc<Mutex<HashMap<K, Arc<Operation<R>>>>>;
type PanicHandler<R> = Arc<dyn Fn(ProducerPanic) -> R + Send + Sync>;

/// A caller's handle on an operation returned by [`Coalescer::join`].
#[derive(Debug)]
pub struct Attachment<R> {
    operation: Arc<Operation<R>>,
    created: bool,
}

impl<R: Clone> Attachment<R> {
    /// Returns the identifier of the joined operation.
    #[must_use]
    pub fn id(&self) -> OperationId {
        self.operation.id()
    }

    /// Returns true if this call created the operation and invoked the producer.
    #[must_use]
    pub fn is_leader(&self) -> bool {
        self.created
    }

    /// Waits for the operation's result.
    pub async fn wait(self) -> R {
        self.operation.attach().await
    }
}

/// Collapses concurrent work for the same key into one [`Operation`].
///
/// The registry is only touched inside short critical sections that never
/// span an `.await`; producers run on their own spawned task. Completed
/// operations are evicted right away, so a later call for the same key
/// always starts a fresh operation.
///
/// Producers are driven with [`tokio::spawn`], so `join` and `dispatch`
/// must be called from within a Tokio runtime.
///
/// A producer that panics never leaves its key wedged: the operation is
/// evicted and settled. With a panic handler installed, waiters receive the
/// handler's value; without one, the operation is abandoned and every
/// waiter panics with the producer's message.
pub struct Coalescer<K, R> {
    in_flight: Registry<K, R>,
    on_panic: Option<PanicHandler<R>>,
}

impl<K, R> Coalescer<K, R>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
{
    /// Creates an empty coalescer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            on_panic: None,
        }
    }

    /// Settles operations whose producer panics with `handler`'s value.
    #[must_use]
    pub fn with_panic_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(ProducerPanic) -> R + Send + Sync + 'static,
    {
        self.on_panic = Some(Arc::new(handler));
        self
    }

    /// Joins the live operation for `key`, creating it if there is none.
    ///
    /// The producer is invoked at most once per operation, outside the
    /// registry lock, with the key and the new operation's identifier.
    pub fn join<F, Fut>(&self, key: K, producer: F) -> Attachment<R>
    where
        F: FnOnce(&K, OperationId) -> Fut,
        Fut: Future<Output = R> + Send + 'static,
    {
        let (operation, created) = {
            let mut in_flight = self.in_flight.lock();
            match in_flight.get(&key) {
                Some(existing) if !existing.is_completed() => (Arc::clone(existing), false),
                _ => {
                    let operation = Arc::new(Operation::new());
                    in_flight.insert(key.clone(), Arc::clone(&operation));
                    (operation, true)
                }
            }
        };

        if created {
            debug!(key = ?key, operation_id = %operation.id(), "Operation created");
            let work = producer(&key, operation.id());
            self.drive(key, Arc::clone(&operation), work);
        } else {
            debug!(key = ?key, operation_id = %operation.id(), "Attached to in-flight operation");
        }

        Attachment { operation, created }
    }

    /// Returns the result of the live operation for `key`, starting one with
    /// `producer` if there is none.
    pub async fn dispatch<F, Fut>(&self, key: K, producer: F) -> R
    where
        F: FnOnce(&K, OperationId) -> Fut,
        Fut: Future<Output = R> + Send + 'static,
    {
        self.join(key, producer).wait().await
    }

    /// Completes every live operation whose key matches `predicate` with
    /// `outcome` and removes it from the registry.
    ///
    /// Returns the number of operations that were completed by this call.
    pub fn complete_matching<P>(&self, predicate: P, outcome: &R) -> usize
    where
        P: Fn(&K) -> bool,
    {
        let removed: Vec<Arc<Operation<R>>> = {
            let mut in_flight = self.in_flight.lock();
            let keys: Vec<K> = in_flight.keys().filter(|key| predicate(key)).cloned().collect();
            keys.iter().filter_map(|key| in_flight.remove(key)).collect()
        };

        removed
            .iter()
            .filter(|operation| operation.complete(outcome.clone()))
            .count()
    }

    /// Returns the number of registered operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.in_flight.lock().len()
    }

    /// Returns true if no operation is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.in_flight.lock().is_empty()
    }

    /// Returns true if a live operation is registered for `key`.
    #[must_use]
    pub fn is_in_flight(&self, key: &K) -> bool {
        self.in_flight
            .lock()
            .get(key)
            .is_some_and(|operation| !operation.is_completed())
    }

    fn drive<Fut>(&self, key: K, operation: Arc<Operation<R>>, work: Fut)
    where
        Fut: Future<Output = R> + Send + 'static,
    {
        let registry = Arc::clone(&self.in_flight);
        let on_panic = self.on_panic.clone();
        tokio::spawn(async move {
            let settled = match AssertUnwindSafe(work).catch_unwind().await {
                Ok(result) => operation.complete(result),
                Err(payload) => {
                    let panic = ProducerPanic::from_payload(operation.id(), payload.as_ref());
                    warn!(key = ?key, operation_id = %operation.id(), error = %panic, "Producer panicked");
                    match on_panic {
                        Some(handler) => operation.complete(handler(panic)),
                        None => operation.abandon(panic),
                    }
                }
            };
            if !settled {
                debug!(
                    key = ?key,
                    operation_id = %operation.id(),
                    "Producer finished after operation was already completed; result discarded"
                );
            }

            let mut in_flight = registry.lock();
            if in_flight
                .get(&key)
                .is_some_and(|current| Arc::ptr_eq(current, &operation))
            {
                in_flight.remove(&key);
                debug!(key = ?key, operation_id = %operation.id(), "Operation evicted");
            }
        });
    }
}

impl<K, T, E> Coalescer<K, Result<T, E>>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
    E: Clone + fmt::Display + Send + Sync + 'static,
{
    /// Force-fails every live operation whose key matches `predicate`.
    ///
    /// Waiters receive `error` immediately; the producers keep running and
    /// their eventual results are discarded. Safe to call repeatedly.
    pub fn invalidate<P>(&self, predicate: P, error: E) -> usize
    where
        P: Fn(&K) -> bool,
    {
        let failed = self.complete_matching(predicate, &Err(error.clone()));
        if failed > 0 {
            warn!(count = failed, error = %error, "Invalidated in-flight operations");
        }
        failed
    }

    /// Force-fails every live operation.
    pub fn invalidate_all(&self, error: E) -> usize {
        self.invalidate(|_| true, error)
    }
}

impl<K, R> Default for Coalescer<K, R>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, R> fmt::Debug for Coalescer<K, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coalescer")
            .field("in_flight", &self.in_flight.lock().len())
            .field("panic_handler", &self.on_panic.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::join_all;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn counting_producer(
        calls: &Arc<AtomicUsize>,
        value: &'static str,
        delay: Duration,
    ) -> impl FnOnce(&&'static str, OperationId) -> futures::future::BoxFuture<'static, &'static str>
    {
        let calls = Arc::clone(calls);
        move |_key, _id| {
            calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                tokio::time::sleep(delay).await;
                value
            })
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_one_million_concurrent_dispatches_share_one_producer() {
        let coalescer: Arc<Coalescer<&'static str, &'static str>> = Arc::new(Coalescer::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let release = Arc::new(tokio::sync::Semaphore::new(0));
        let callers = 8;
        let per_caller = 125_000;

        // Hold the producer until every caller has joined so the whole
        // million lands in one generation.
        let joiners: Vec<_> = (0..callers)
            .map(|_| {
                let coalescer = Arc::clone(&coalescer);
                let calls = Arc::clone(&calls);
                let release = Arc::clone(&release);
                tokio::spawn(async move {
                    (0..per_caller)
                        .map(|_| {
                            let calls = Arc::clone(&calls);
                            let release = Arc::clone(&release);
                            coalescer.join("piggyback", move |_, _| {
                                calls.fetch_add(1, Ordering::SeqCst);
                                async move {
                                    let _permit = release.acquire().await;
                                    "first"
                                }
                            })
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut attachments = Vec::with_capacity(callers * per_caller);
        for joiner in joiners {
            attachments.extend(joiner.await.unwrap());
        }
        release.add_permits(1);

        let results = join_all(attachments.into_iter().map(Attachment::wait)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(results.len(), 1_000_000);
        assert!(results.iter().all(|result| *result == "first"));
    }

    #[tokio::test]
    async fn test_different_keys_run_independently() {
        let coalescer: Coalescer<&'static str, &'static str> = Coalescer::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let (a, b) = tokio::join!(
            coalescer.dispatch("a", counting_producer(&calls, "result-a", Duration::from_millis(20))),
            coalescer.dispatch("b", counting_producer(&calls, "result-b", Duration::from_millis(20))),
        );

        assert_eq!(a, "result-a");
        assert_eq!(b, "result-b");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_same_key_returns_first_producer_result() {
        let coalescer: Coalescer<&'static str, &'static str> = Coalescer::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let (a, b) = tokio::join!(
            coalescer.dispatch("same", counting_producer(&calls, "result-a", Duration::from_millis(20))),
            coalescer.dispatch("same", counting_producer(&calls, "result-b", Duration::from_millis(20))),
        );

        assert_eq!(a, "result-a");
        assert_eq!(b, "result-a");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dispatch_after_completion_starts_new_operation() {
        let coalescer: Coalescer<&'static str, &'static str> = Coalescer::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let first = coalescer
            .dispatch("key", counting_producer(&calls, "first", Duration::ZERO))
            .await;
        let second = coalescer
            .dispatch("key", counting_producer(&calls, "second", Duration::ZERO))
            .await;

        assert_eq!(first, "first");
        assert_eq!(second, "second");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_completed_operation_is_evicted() {
        let coalescer: Coalescer<u32, u32> = Coalescer::new();

        let value = coalescer.dispatch(1, |_, _| async { 10 }).await;
        assert_eq!(value, 10);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(coalescer.is_empty());
        assert!(!coalescer.is_in_flight(&1));
    }

    #[tokio::test]
    async fn test_join_reports_leader() {
        let coalescer: Coalescer<u32, u32> = Coalescer::new();

        let leader = coalescer.join(1, |_, _| async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            5
        });
        let follower = coalescer.join(1, |_, _| async { 6 });

        assert!(leader.is_leader());
        assert!(!follower.is_leader());
        assert_eq!(leader.id(), follower.id());
        assert_eq!(leader.wait().await, 5);
        assert_eq!(follower.wait().await, 5);
    }

    #[tokio::test]
    async fn test_invalidate_fails_waiters_without_waiting_for_producer() {
        let coalescer: Coalescer<(&'static str, u32), Result<u32, String>> = Coalescer::new();

        let slow = coalescer.join(("token-1", 1), |_, _| async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(1)
        });
        let other = coalescer.join(("token-2", 2), |_, _| async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(2)
        });

        let failed = coalescer.invalidate(|key| key.0 == "token-1", "stale".to_string());
        assert_eq!(failed, 1);

        let result = tokio::time::timeout(Duration::from_secs(1), slow.wait())
            .await
            .unwrap();
        assert_eq!(result, Err("stale".to_string()));
        assert_eq!(other.wait().await, Ok(2));
    }

    #[tokio::test]
    async fn test_invalidate_is_idempotent() {
        let coalescer: Coalescer<u32, Result<u32, String>> = Coalescer::new();

        let pending = coalescer.join(1, |_, _| futures::future::pending());

        assert_eq!(coalescer.invalidate(|_| true, "first".to_string()), 1);
        assert_eq!(coalescer.invalidate(|_| true, "second".to_string()), 0);
        assert_eq!(pending.wait().await, Err("first".to_string()));
        assert!(coalescer.is_empty());
    }

    #[tokio::test]
    async fn test_invalidate_all() {
        let coalescer: Coalescer<u32, Result<u32, String>> = Coalescer::new();

        let a = coalescer.join(1, |_, _| futures::future::pending());
        let b = coalescer.join(2, |_, _| futures::future::pending());

        assert_eq!(coalescer.invalidate_all("reset".to_string()), 2);
        assert_eq!(a.wait().await, Err("reset".to_string()));
        assert_eq!(b.wait().await, Err("reset".to_string()));
    }

    #[tokio::test]
    async fn test_invalidated_key_can_be_dispatched_again() {
        let coalescer: Coalescer<u32, Result<u32, String>> = Coalescer::new();

        let stale = coalescer.join(1, |_, _| futures::future::pending());
        coalescer.invalidate_all("stale".to_string());

        let fresh = coalescer.dispatch(1, |_, _| async { Ok(42) }).await;
        assert_eq!(fresh, Ok(42));
        assert_eq!(stale.wait().await, Err("stale".to_string()));
    }

    #[tokio::test]
    async fn test_panicking_producer_does_not_wedge_key() {
        let coalescer: Coalescer<u32, u32> = Coalescer::new();

        let doomed = coalescer.join(1, |_, _| async { panic!("producer bug") });
        let waiter = tokio::spawn(doomed.wait());
        let joined = tokio::time::timeout(Duration::from_millis(300), waiter)
            .await
            .unwrap();
        assert!(joined.unwrap_err().is_panic());

        let fresh = tokio::time::timeout(
            Duration::from_millis(300),
            coalescer.dispatch(1, |_, _| async { 7 }),
        )
        .await
        .unwrap();
        assert_eq!(fresh, 7);
        assert!(!coalescer.is_in_flight(&1));
    }

    #[tokio::test]
    async fn test_panic_handler_settles_waiters_with_failure() {
        let coalescer: Coalescer<u32, Result<u32, String>> =
            Coalescer::new().with_panic_handler(|panic| Err(panic.message));

        let first = coalescer.join(1, |_, _| async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            panic!("producer bug")
        });
        let second = coalescer.join(1, |_, _| async { Ok(0) });

        let (first, second) = tokio::time::timeout(
            Duration::from_millis(300),
            futures::future::join(first.wait(), second.wait()),
        )
        .await
        .unwrap();
        assert_eq!(first, Err("producer bug".to_string()));
        assert_eq!(second, Err("producer bug".to_string()));

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(coalescer.is_empty());
        assert_eq!(coalescer.dispatch(1, |_, _| async { Ok(7) }).await, Ok(7));
    }
}
