//! Composition operators: `transform`, `flat_transform`, `chain`,
//! `map_chain`, `fail_chain`.
//!
//! Each operator attaches an internal [`Handler`] to the receiver (the
//! *upstream* cell) that drives either a freshly created *derived* cell or a
//! caller-supplied `target`. None of them create threads or propagate
//! cancellation; they only wire completion forward.

use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::deferred::{Deferred, Handler, WeakDeferred};
use crate::failure::Failure;

impl<T: Send + 'static> Deferred<T> {
    /// Maps the success value through `f`, producing a freshly created
    /// derived cell. Failure propagates verbatim; a panic in `f` fails the
    /// derived cell with that cause.
    pub fn transform<U, F>(&self, f: F) -> Deferred<U>
    where
        U: Send + 'static,
        F: FnOnce(Arc<T>) -> U + Send + 'static,
    {
        let target = Deferred::<U>::new();
        self.register(Box::new(TransformHandler {
            target: target.downgrade(),
            map: f,
            _marker: PhantomData,
        }));
        target
    }

    /// Like [`transform`](Self::transform), but `f` itself returns a new
    /// `Deferred<U>` which is chained into the derived cell rather than used
    /// directly. A panic before `f` returns fails the derived cell the same
    /// way `transform`'s mapper fault does.
    pub fn flat_transform<U, F>(&self, f: F) -> Deferred<U>
    where
        U: Send + 'static,
        F: FnOnce(Arc<T>) -> Deferred<U> + Send + 'static,
    {
        let target = Deferred::<U>::new();
        self.register(Box::new(FlatTransformHandler {
            target: target.downgrade(),
            map: f,
            _marker: PhantomData,
        }));
        target
    }

    /// Wires both branches of the receiver into `target`. No new cell is
    /// created; the same success value (by reference count, not by copy) and
    /// the same failure cause are forwarded.
    pub fn chain(&self, target: Deferred<T>) -> &Self {
        self.register(Box::new(ChainHandler { target }));
        self
    }

    /// Like [`chain`](Self::chain), but transforms the success value with
    /// `f` first; a panic in `f` fails `target`.
    pub fn map_chain<U, F>(&self, target: Deferred<U>, f: F) -> &Self
    where
        U: Send + 'static,
        F: FnOnce(Arc<T>) -> U + Send + 'static,
    {
        self.register(Box::new(TransformHandler {
            target: target.downgrade(),
            map: f,
            _marker: PhantomData,
        }));
        self
    }

    /// On success, calls `success_fn(v)` purely for its side effects; a panic
    /// from it fails `target`. On failure, the cause propagates to `target`
    /// unchanged. Returns the receiver, not `target`, so calls can continue
    /// to be chained off the upstream cell.
    pub fn fail_chain<U, F>(&self, target: Deferred<U>, success_fn: F) -> &Self
    where
        U: Send + 'static,
        F: FnOnce(Arc<T>) + Send + 'static,
    {
        self.register(Box::new(FailChainHandler {
            target: target.downgrade(),
            side_effect: success_fn,
            _marker: PhantomData,
        }));
        self
    }
}

/// Holds `target` weakly: `transform`'s derived cell must not be kept alive
/// by the upstream just because the upstream hasn't completed yet. If the
/// derived cell is dropped first, `upgrade` fails and dispatch is a no-op.
struct TransformHandler<T, U, F> {
    target: WeakDeferred<U>,
    map: F,
    _marker: PhantomData<fn(Arc<T>)>,
}

impl<T, U, F> Handler<T> for TransformHandler<T, U, F>
where
    T: Send + 'static,
    U: Send + 'static,
    F: FnOnce(Arc<T>) -> U + Send + 'static,
{
    fn on_success(self: Box<Self>, value: Arc<T>) {
        let Self { target, map, .. } = *self;
        let Some(target) = target.upgrade() else {
            return;
        };
        match panic::catch_unwind(AssertUnwindSafe(move || map(value))) {
            Ok(mapped) => target.succeed(mapped),
            Err(payload) => target.fail_with(Failure::from_panic(payload)),
        }
    }

    fn on_failure(self: Box<Self>, failure: Failure) {
        if let Some(target) = self.target.upgrade() {
            target.fail_with(failure);
        }
    }
}

/// Holds `target` weakly for the same reason as [`TransformHandler`].
struct FlatTransformHandler<T, U, F> {
    target: WeakDeferred<U>,
    map: F,
    _marker: PhantomData<fn(Arc<T>)>,
}

impl<T, U, F> Handler<T> for FlatTransformHandler<T, U, F>
where
    T: Send + 'static,
    U: Send + 'static,
    F: FnOnce(Arc<T>) -> Deferred<U> + Send + 'static,
{
    fn on_success(self: Box<Self>, value: Arc<T>) {
        let Self { target, map, .. } = *self;
        let Some(target) = target.upgrade() else {
            return;
        };
        match panic::catch_unwind(AssertUnwindSafe(move || map(value))) {
            Ok(inner) => {
                inner.chain(target);
            }
            Err(payload) => target.fail_with(Failure::from_panic(payload)),
        }
    }

    fn on_failure(self: Box<Self>, failure: Failure) {
        if let Some(target) = self.target.upgrade() {
            target.fail_with(failure);
        }
    }
}

struct ChainHandler<T> {
    target: Deferred<T>,
}

impl<T: Send + 'static> Handler<T> for ChainHandler<T> {
    fn on_success(self: Box<Self>, value: Arc<T>) {
        self.target.succeed_arc(value);
    }

    fn on_failure(self: Box<Self>, failure: Failure) {
        self.target.fail_with(failure);
    }
}

/// Holds `target` weakly for the same reason as [`TransformHandler`]; `target`
/// here is usually a cell the caller also holds onto directly, but the
/// registered handler itself must not be the thing keeping it alive.
struct FailChainHandler<T, U, F> {
    target: WeakDeferred<U>,
    side_effect: F,
    _marker: PhantomData<fn(Arc<T>)>,
}

impl<T, U, F> Handler<T> for FailChainHandler<T, U, F>
where
    T: Send + 'static,
    U: Send + 'static,
    F: FnOnce(Arc<T>) + Send + 'static,
{
    fn on_success(self: Box<Self>, value: Arc<T>) {
        let Self { target, side_effect, .. } = *self;
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(move || side_effect(value))) {
            if let Some(target) = target.upgrade() {
                target.fail_with(Failure::from_panic(payload));
            }
        }
    }

    fn on_failure(self: Box<Self>, failure: Failure) {
        if let Some(target) = self.target.upgrade() {
            target.fail_with(failure);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn transform_identity_preserves_outcome() {
        let upstream = Deferred::succeeded(5);
        let derived = upstream.transform(|v| *v);
        assert_eq!(derived.peek().map(|v| *v), Some(5));
    }

    #[test]
    fn flat_transform_of_already_succeeded_matches_transform_identity() {
        let upstream = Deferred::succeeded(5);
        let derived = upstream.flat_transform(|v| Deferred::succeeded(*v));
        assert_eq!(derived.peek().map(|v| *v), Some(5));
    }

    #[test]
    fn transform_propagates_failure_verbatim() {
        #[derive(Debug, thiserror::Error)]
        #[error("upstream broke")]
        struct UpstreamError;

        let upstream = Deferred::<i32>::new();
        let derived = upstream.transform(|v| *v * 2);

        upstream.fail(UpstreamError);

        assert!(derived.is_failed());
        assert!(derived.peek().is_none());
        assert_eq!(derived.failure().unwrap().cause().to_string(), "upstream broke");
    }

    #[test]
    fn transform_mapper_panic_fails_derived_but_not_upstream() {
        let upstream = Deferred::<i32>::new();
        let derived = upstream.transform(|_: Arc<i32>| -> i32 { panic!("boom") });

        upstream.succeed(5);

        assert!(derived.is_failed());
        assert!(upstream.is_successful());
        assert_eq!(*upstream.peek().unwrap(), 5);
    }

    #[test]
    fn chain_then_await_matches_direct_await() {
        let upstream = Deferred::<i32>::new();
        let target = Deferred::<i32>::new();
        upstream.chain(target.clone());

        upstream.succeed(9);

        assert!(target.wait(Duration::from_secs(1)));
        assert_eq!(*target.peek().unwrap(), 9);
    }

    #[test]
    fn map_chain_transforms_and_propagates_failures() {
        #[derive(Debug, thiserror::Error)]
        #[error("nope")]
        struct NopeError;

        let upstream = Deferred::<i32>::new();
        let target = Deferred::<String>::new();
        upstream.map_chain(target.clone(), |v| format!("value={v}"));
        upstream.succeed(3);
        assert_eq!(target.peek().map(|v| (*v).clone()), Some("value=3".to_string()));

        let upstream2 = Deferred::<i32>::new();
        let target2 = Deferred::<String>::new();
        upstream2.map_chain(target2.clone(), |v| format!("value={v}"));
        upstream2.fail(NopeError);
        assert!(target2.is_failed());
    }

    #[test]
    fn transform_handler_is_a_no_op_once_derived_cell_is_dropped() {
        let upstream = Deferred::<i32>::new();
        let derived = upstream.transform(|v| *v * 2);
        let weak = derived.downgrade();
        drop(derived);
        assert!(weak.upgrade().is_none());

        // The upstream-observing handler no longer has anything to complete;
        // it must not panic or otherwise disrupt the upstream's own completion.
        upstream.succeed(5);
        assert!(upstream.is_successful());
    }

    #[test]
    fn fail_chain_runs_side_effect_and_returns_receiver() {
        let upstream = Deferred::<i32>::new();
        let target = Deferred::<()>::new();
        let seen = Arc::new(std::sync::Mutex::new(0));
        let seen2 = Arc::clone(&seen);

        upstream.fail_chain(target.clone(), move |v| *seen2.lock().unwrap() = *v);
        upstream.succeed(11);

        assert_eq!(*seen.lock().unwrap(), 11);
        assert!(!target.is_completed());
        assert!(upstream.is_successful());
    }
}
