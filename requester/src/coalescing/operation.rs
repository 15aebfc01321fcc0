//! A single in-flight unit of work.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;
use tokio::sync::Notify;
use uuid::Uuid;

/// Identifier assigned to an operation when it is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationId(Uuid);

impl OperationId {
    /// Creates a new random identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A producer that panicked before returning a result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("producer of operation {operation_id} panicked: {message}")]
pub struct ProducerPanic {
    /// The operation whose producer panicked.
    pub operation_id: OperationId,
    /// The panic payload, when it was a string.
    pub message: String,
}

impl ProducerPanic {
    /// Builds a panic report from an unwind payload.
    #[must_use]
    pub fn from_payload(operation_id: OperationId, payload: &(dyn Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|message| (*message).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        Self {
            operation_id,
            message,
        }
    }
}

enum State<R> {
    Pending,
    Completed(R),
    Abandoned(ProducerPanic),
}

/// One invocation of an asynchronous producer, observed by any number of callers.
///
/// The result is set exactly once. Every caller attached before completion
/// resumes with that result, and callers attaching afterwards read the
/// stored copy. There is no built-in timeout: an operation whose producer
/// never finishes stays pending until someone calls [`Operation::complete`]
/// or [`Operation::force_fail`].
///
/// An operation can also be abandoned when its producer panics and no
/// failure value can be built for it. Abandonment is terminal as well.
pub struct Operation<R> {
    id: OperationId,
    state: Mutex<State<R>>,
    notify: Notify,
    attach_count: AtomicUsize,
}

impl<R: Clone> Operation<R> {
    /// Creates a new pending operation.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: OperationId::new(),
            state: Mutex::new(State::Pending),
            notify: Notify::new(),
            attach_count: AtomicUsize::new(0),
        }
    }

    /// Returns the operation identifier.
    #[must_use]
    pub fn id(&self) -> OperationId {
        self.id
    }

    /// Returns true once the operation reached a terminal state.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        !matches!(*self.state.lock(), State::Pending)
    }

    /// Returns the producer panic, if the operation was abandoned.
    #[must_use]
    pub fn abandoned(&self) -> Option<ProducerPanic> {
        match &*self.state.lock() {
            State::Abandoned(panic) => Some(panic.clone()),
            _ => None,
        }
    }

    /// Returns how many times [`Operation::attach`] has been called.
    #[must_use]
    pub fn attach_count(&self) -> usize {
        self.attach_count.load(Ordering::Relaxed)
    }

    /// Returns the stored result without waiting.
    #[must_use]
    pub fn peek(&self) -> Option<R> {
        match &*self.state.lock() {
            State::Completed(result) => Some(result.clone()),
            _ => None,
        }
    }

    /// Waits for the operation's single result.
    ///
    /// # Panics
    ///
    /// Panics if the operation was abandoned, carrying the producer's panic
    /// message to every waiter.
    pub async fn attach(&self) -> R {
        self.attach_count.fetch_add(1, Ordering::Relaxed);

        loop {
            // Register interest before checking so a completion between the
            // check and the await cannot be missed.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(result) = self.settled() {
                return result;
            }

            notified.await;
        }
    }

    /// Stores the result and wakes every waiter.
    ///
    /// Returns false if the operation had already completed, in which case
    /// `result` is discarded.
    pub fn complete(&self, result: R) -> bool {
        self.settle(State::Completed(result))
    }

    /// Marks the operation as abandoned after its producer panicked.
    ///
    /// Returns false if the operation had already completed.
    pub fn abandon(&self, panic: ProducerPanic) -> bool {
        self.settle(State::Abandoned(panic))
    }

    fn settled(&self) -> Option<R> {
        match &*self.state.lock() {
            State::Completed(result) => Some(result.clone()),
            State::Abandoned(panic) => panic!("{panic}"),
            State::Pending => None,
        }
    }

    fn settle(&self, terminal: State<R>) -> bool {
        {
            let mut state = self.state.lock();
            if !matches!(*state, State::Pending) {
                return false;
            }
            *state = terminal;
        }

        self.notify.notify_waiters();
        true
    }
}

impl<T: Clone, E: Clone> Operation<Result<T, E>> {
    /// Completes the operation with `error`, unless it already completed.
    pub fn force_fail(&self, error: E) -> bool {
        self.complete(Err(error))
    }
}

impl<R: Clone> Default for Operation<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> fmt::Debug for Operation<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match *self.state.lock() {
            State::Pending => "pending",
            State::Completed(_) => "completed",
            State::Abandoned(_) => "abandoned",
        };
        f.debug_struct("Operation")
            .field("id", &self.id)
            .field("state", &state)
            .field("attach_count", &self.attach_count.load(Ordering::Relaxed))
            .finish()
    }
}
