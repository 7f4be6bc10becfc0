//! [`Deferred`], the thread-safe single-assignment cell this crate exists
//! to provide, and the [`Handler`] trait completion callbacks implement.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::time::{Duration, Instant};

use crate::failure::{DoubleCompletion, Failure};
use crate::sink;

/// A single completion event: either a success value or a failure cause.
///
/// Values are carried behind `Arc` so that dispatching to many handlers (and
/// aggregating many cells) never requires `T` to be `Clone`.
pub enum Outcome<T> {
    Succeeded(Arc<T>),
    Failed(Failure),
}

impl<T> Clone for Outcome<T> {
    fn clone(&self) -> Self {
        match self {
            Outcome::Succeeded(v) => Outcome::Succeeded(Arc::clone(v)),
            Outcome::Failed(f) => Outcome::Failed(f.clone()),
        }
    }
}

/// A completion handler: a pair of callbacks, one per branch of an
/// [`Outcome`]. Exactly one of the two ever fires, and it fires exactly once.
///
/// Both methods default to a no-op so a handler that only cares about one
/// branch doesn't need to spell out the other.
pub trait Handler<T>: Send {
    fn on_success(self: Box<Self>, _value: Arc<T>) {}
    fn on_failure(self: Box<Self>, _failure: Failure) {}

    fn dispatch(self: Box<Self>, outcome: Outcome<T>) {
        match outcome {
            Outcome::Succeeded(v) => self.on_success(v),
            Outcome::Failed(f) => self.on_failure(f),
        }
    }
}

/// A [`Handler`] built from plain closures, used by [`Deferred::on_success`],
/// [`Deferred::on_failure`] and [`Deferred::on_complete`]'s closure-based
/// callers.
pub(crate) struct FnHandler<T> {
    pub(crate) success: Option<Box<dyn FnOnce(Arc<T>) + Send>>,
    pub(crate) failure: Option<Box<dyn FnOnce(Failure) + Send>>,
}

impl<T: Send + 'static> Handler<T> for FnHandler<T> {
    fn on_success(self: Box<Self>, value: Arc<T>) {
        if let Some(f) = self.success {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(move || f(value))) {
                sink::active().report(&Failure::from_panic(payload));
            }
        }
    }

    fn on_failure(self: Box<Self>, failure: Failure) {
        if let Some(f) = self.failure {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(move || f(failure))) {
                sink::active().report(&Failure::from_panic(payload));
            }
        }
    }
}

enum State<T> {
    Pending(Vec<Box<dyn Handler<T>>>),
    Completed(Outcome<T>),
}

struct Inner<T> {
    state: Mutex<State<T>>,
    condvar: Condvar,
    log_errors: AtomicBool,
}

/// The asynchronous completion primitive: a thread-safe, single-assignment
/// cell for a value computed elsewhere.
///
/// A `Deferred<T>` starts `Pending`. Exactly one of [`succeed`](Deferred::succeed)
/// or [`fail`](Deferred::fail) may be called on it; that call atomically
/// transitions the cell to a terminal state and dispatches every handler
/// registered so far, in registration order. Handlers registered after
/// completion fire synchronously, inline with the registering call.
///
/// Cloning a `Deferred` is cheap (it shares one underlying cell via `Arc`);
/// every clone observes the same outcome.
pub struct Deferred<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// A non-owning handle to a [`Deferred`]'s shared state.
///
/// Composition operators that create a *derived* cell (`transform`,
/// `flat_transform`, `fail_chain`) hold the derived cell by `Weak` inside
/// the internal handler they register on the upstream cell, not by `Arc`:
/// the upstream must not keep a derived cell alive just because it hasn't
/// completed yet. Once the derived cell is dropped, [`upgrade`](Self::upgrade)
/// returns `None` and the handler becomes a no-op.
pub struct WeakDeferred<T> {
    inner: Weak<Inner<T>>,
}

impl<T> Clone for WeakDeferred<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

impl<T> WeakDeferred<T> {
    /// Attempts to recover the [`Deferred`], returning `None` if every
    /// strong handle to it has already been dropped.
    pub fn upgrade(&self) -> Option<Deferred<T>> {
        self.inner.upgrade().map(|inner| Deferred { inner })
    }
}

impl<T: Send + 'static> Default for Deferred<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static> Deferred<T> {
    /// Creates a fresh, `Pending` cell.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::Pending(Vec::new())),
                condvar: Condvar::new(),
                log_errors: AtomicBool::new(true),
            }),
        }
    }

    /// Creates a cell that is already `Succeeded(value)`.
    pub fn succeeded(value: T) -> Self {
        let cell = Self::new();
        cell.succeed(value);
        cell
    }

    /// Creates a cell that is already `Failed(cause)`.
    pub fn failed(cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        let cell = Self::new();
        cell.fail(cause);
        cell
    }

    /// Returns a non-owning [`WeakDeferred`] handle to this cell's shared
    /// state, for handlers that must not keep the cell alive on their own.
    pub fn downgrade(&self) -> WeakDeferred<T> {
        WeakDeferred {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Completes the cell successfully.
    ///
    /// Calling this on an already-terminal cell is a contract violation, not
    /// a panic: it is reported to the [failure sink](crate::sink) and the
    /// existing outcome is left untouched.
    pub fn succeed(&self, value: T) {
        self.succeed_arc(Arc::new(value));
    }

    pub(crate) fn succeed_arc(&self, value: Arc<T>) {
        self.complete(Outcome::Succeeded(value));
    }

    /// Completes the cell with a failure.
    ///
    /// If the cell's log-errors flag is still set (no handler has observed
    /// it yet), the failure is reported to the active [`FailureSink`
    /// ](crate::sink::FailureSink) before handlers run.
    pub fn fail(&self, cause: impl std::error::Error + Send + Sync + 'static) {
        self.fail_with(Failure::new(cause));
    }

    pub(crate) fn fail_with(&self, failure: Failure) {
        if self.log_errors_enabled() {
            if failure.mark_handled() {
                sink::active().report(&failure);
            }
        } else if !failure.is_handled() && sink::active().is_fine_enabled() {
            sink::active().fine(&format!("deferred value failed silently: {}", failure.cause()));
        }
        self.complete(Outcome::Failed(failure));
    }

    fn log_errors_enabled(&self) -> bool {
        self.inner.log_errors.load(Ordering::Acquire)
    }

    fn complete(&self, outcome: Outcome<T>) {
        let handlers = {
            let mut state = self.lock();
            if matches!(&*state, State::Completed(_)) {
                drop(state);
                sink::active().report(&Failure::new(DoubleCompletion));
                return;
            }
            match std::mem::replace(&mut *state, State::Completed(outcome.clone())) {
                State::Pending(handlers) => handlers,
                State::Completed(_) => unreachable!("checked above"),
            }
        };
        self.inner.condvar.notify_all();
        for handler in handlers {
            handler.dispatch(outcome.clone());
        }
    }

    /// Non-blocking inspection. Returns the value iff `Succeeded`, never blocks.
    pub fn peek(&self) -> Option<Arc<T>> {
        match &*self.lock() {
            State::Completed(Outcome::Succeeded(v)) => Some(Arc::clone(v)),
            _ => None,
        }
    }

    /// Returns the failure cause iff `Failed`.
    pub fn failure(&self) -> Option<Failure> {
        match &*self.lock() {
            State::Completed(Outcome::Failed(f)) => Some(f.clone()),
            _ => None,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(&*self.lock(), State::Completed(_))
    }

    pub fn is_successful(&self) -> bool {
        matches!(&*self.lock(), State::Completed(Outcome::Succeeded(_)))
    }

    pub fn is_failed(&self) -> bool {
        matches!(&*self.lock(), State::Completed(Outcome::Failed(_)))
    }

    /// Registers a handler. If the cell is already terminal, `handler` fires
    /// synchronously before this call returns; otherwise it is appended and
    /// fires later, on whichever thread completes the cell.
    ///
    /// Any registration — success-only, failure-only, or dual — clears the
    /// log-errors flag: once someone is watching, `fail` assumes they'll
    /// notice the failure and stops auto-logging it.
    pub fn on_complete(&self, handler: impl Handler<T> + 'static) -> &Self {
        self.register(Box::new(handler));
        self
    }

    pub(crate) fn register(&self, handler: Box<dyn Handler<T>>) {
        let mut state = self.lock();
        match &mut *state {
            State::Pending(handlers) => {
                handlers.push(handler);
                self.inner.log_errors.store(false, Ordering::Release);
            }
            State::Completed(outcome) => {
                let outcome = outcome.clone();
                drop(state);
                handler.dispatch(outcome);
            }
        }
    }

    /// Registers a success-only handler. A panic inside `f` is a handler
    /// fault: it is routed to the failure sink, not to this cell (which is
    /// already terminal by the time `f` runs).
    pub fn on_success(&self, f: impl FnOnce(Arc<T>) + Send + 'static) -> &Self {
        self.on_complete(FnHandler {
            success: Some(Box::new(f)),
            failure: None,
        })
    }

    /// Registers a failure-only handler.
    pub fn on_failure(&self, f: impl FnOnce(Failure) + Send + 'static) -> &Self {
        self.on_complete(FnHandler {
            success: None,
            failure: Some(Box::new(f)),
        })
    }

    /// Convenience over [`on_failure`](Self::on_failure) that routes the
    /// cause to a named logging target instead of a user closure.
    pub fn handle_errors(&self, log_target: impl Into<String>) -> &Self {
        let target = log_target.into();
        self.on_failure(move |failure| {
            tracing::error!(target: "kernel_core::handled_errors", sink = %target, "{}", failure.cause());
        })
    }

    /// Clears the log-errors flag. Idempotent.
    pub fn do_not_log_errors(&self) -> &Self {
        self.inner.log_errors.store(false, Ordering::Release);
        self
    }

    /// Blocks the calling thread until completion or `timeout` elapses.
    /// Returns whether the cell was completed when this call returned.
    /// Never returns the cause; inspect [`failure`](Self::failure) afterwards.
    pub fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        loop {
            if matches!(&*state, State::Completed(_)) {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, result) = self
                .inner
                .condvar
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            state = guard;
            if result.timed_out() && !matches!(&*state, State::Completed(_)) {
                return false;
            }
            // Spurious wakeup with time remaining: loop and re-check.
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State<T>> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use std::thread;

    #[test]
    fn happy_path_dispatches_handlers_in_order() {
        let cell = Deferred::<i32>::new();
        let order = Arc::new(StdMutex::new(Vec::new()));

        let o1 = Arc::clone(&order);
        cell.on_success(move |v| o1.lock().unwrap().push(("h1", *v)));
        let o2 = Arc::clone(&order);
        cell.on_success(move |v| o2.lock().unwrap().push(("h2", *v)));

        cell.succeed(7);

        assert_eq!(*order.lock().unwrap(), vec![("h1", 7), ("h2", 7)]);
        assert_eq!(*cell.peek().unwrap(), 7);
        assert!(cell.is_successful());
    }

    #[test]
    fn late_registration_invokes_synchronously() {
        let cell = Deferred::<&'static str>::new();
        cell.succeed("x");

        let observed = Arc::new(StdMutex::new(None));
        let observed2 = Arc::clone(&observed);
        cell.on_success(move |v| *observed2.lock().unwrap() = Some(*v));

        assert_eq!(*observed.lock().unwrap(), Some("x"));
    }

    #[test]
    fn double_completion_does_not_change_outcome() {
        let cell = Deferred::<i32>::new();
        cell.succeed(1);
        cell.succeed(2);
        assert_eq!(*cell.peek().unwrap(), 1);
    }

    #[test]
    fn handler_panic_does_not_block_later_handlers() {
        let cell = Deferred::<i32>::new();
        let ran = Arc::new(AtomicBool::new(false));

        cell.on_success(|_| panic!("boom"));
        let ran2 = Arc::clone(&ran);
        cell.on_success(move |_| ran2.store(true, Ordering::SeqCst));

        cell.succeed(1);
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn wait_times_out_on_pending_cell() {
        let cell = Deferred::<i32>::new();
        let start = Instant::now();
        assert!(!cell.wait(Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(20));
        assert!(!cell.is_completed());
    }

    #[test]
    fn wait_returns_immediately_when_already_complete() {
        let cell = Deferred::succeeded(1);
        let start = Instant::now();
        assert!(cell.wait(Duration::from_secs(5)));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn wait_wakes_on_completion_from_another_thread() {
        let cell = Deferred::<i32>::new();
        let producer = cell.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            producer.succeed(42);
        });

        let start = Instant::now();
        assert!(cell.wait(Duration::from_secs(5)));
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(*cell.peek().unwrap(), 42);

        handle.join().unwrap();
    }

    #[test]
    fn wait_zero_on_pending_cell_returns_promptly() {
        let cell = Deferred::<i32>::new();
        assert!(!cell.wait(Duration::ZERO));
        assert!(!cell.is_completed());
    }

    #[test]
    fn weak_upgrade_fails_once_every_strong_handle_is_dropped() {
        let cell = Deferred::<i32>::new();
        let weak = cell.downgrade();
        assert!(weak.upgrade().is_some());

        drop(cell);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn do_not_log_errors_is_idempotent() {
        #[derive(Debug, thiserror::Error)]
        #[error("boom")]
        struct BoomError;

        let cell = Deferred::<i32>::new();
        cell.do_not_log_errors();
        cell.do_not_log_errors();
        cell.fail(BoomError);
        assert!(cell.is_failed());
    }
}
