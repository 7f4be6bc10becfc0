//! Aggregation over many [`Deferred`] cells: [`sequence`] and [`barrier`].
//!
//! Both are pure folds over completion — no new scheduling, just a shared
//! counter decremented from each upstream's completion handler and a single
//! CAS into the aggregate cell.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::deferred::{Deferred, Handler};
use crate::failure::Failure;

/// Succeeds with every upstream value, in the same order as `cells`, once
/// all succeed. Fails with the first observed failure; later completions
/// (success or failure) among the remaining upstreams are ignored by the
/// sequence itself, though each upstream's own failure-logging policy still
/// applies independently.
///
/// `sequence(&[])` succeeds immediately with an empty vector.
pub fn sequence<T: Send + 'static>(cells: &[Deferred<T>]) -> Deferred<Vec<Arc<T>>> {
    let result = Deferred::<Vec<Arc<T>>>::new();
    if cells.is_empty() {
        result.succeed(Vec::new());
        return result;
    }

    let shared = Arc::new(SequenceShared {
        values: Mutex::new(vec![None; cells.len()]),
        remaining: AtomicUsize::new(cells.len()),
        decided: AtomicBool::new(false),
    });

    for (index, cell) in cells.iter().enumerate() {
        cell.on_complete(SequenceSlot {
            index,
            result: result.clone(),
            shared: Arc::clone(&shared),
        });
    }

    result
}

struct SequenceShared<T> {
    values: Mutex<Vec<Option<Arc<T>>>>,
    remaining: AtomicUsize,
    decided: AtomicBool,
}

struct SequenceSlot<T> {
    index: usize,
    result: Deferred<Vec<Arc<T>>>,
    shared: Arc<SequenceShared<T>>,
}

impl<T: Send + 'static> Handler<T> for SequenceSlot<T> {
    fn on_success(self: Box<Self>, value: Arc<T>) {
        {
            let mut values = self
                .shared
                .values
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            values[self.index] = Some(value);
        }

        let was_last = self.shared.remaining.fetch_sub(1, Ordering::AcqRel) == 1;
        if was_last
            && self
                .shared
                .decided
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
        {
            let values = self
                .shared
                .values
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let collected = values
                .iter()
                .cloned()
                .map(|slot| slot.expect("every slot is filled once remaining reaches zero"))
                .collect();
            self.result.succeed(collected);
        }
    }

    fn on_failure(self: Box<Self>, failure: Failure) {
        if self
            .shared
            .decided
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.result.fail_with(failure);
        }
        self.shared.remaining.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Completes (successfully, with no payload) once every cell in `cells` has
/// reached a terminal state, regardless of whether it succeeded or failed.
///
/// `barrier(&[])` succeeds immediately.
pub fn barrier<T: Send + 'static>(cells: &[Deferred<T>]) -> Deferred<()> {
    let result = Deferred::<()>::new();
    if cells.is_empty() {
        result.succeed(());
        return result;
    }

    let remaining = Arc::new(AtomicUsize::new(cells.len()));
    for cell in cells {
        cell.on_complete(BarrierSlot {
            result: result.clone(),
            remaining: Arc::clone(&remaining),
            _marker: PhantomData,
        });
    }
    result
}

struct BarrierSlot<T> {
    result: Deferred<()>,
    remaining: Arc<AtomicUsize>,
    _marker: PhantomData<T>,
}

impl<T> BarrierSlot<T> {
    fn finish(&self) {
        if self.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.result.succeed(());
        }
    }
}

impl<T: Send + 'static> Handler<T> for BarrierSlot<T> {
    fn on_success(self: Box<Self>, _value: Arc<T>) {
        self.finish();
    }

    fn on_failure(self: Box<Self>, _failure: Failure) {
        self.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[derive(Debug, thiserror::Error)]
    #[error("slot failed: {0}")]
    struct SlotError(&'static str);

    #[test]
    fn barrier_completes_after_every_upstream_is_terminal() {
        let a = Deferred::<i32>::new();
        let b = Deferred::<i32>::new();
        let c = Deferred::<i32>::new();
        let bar = barrier(&[a.clone(), b.clone(), c.clone()]);

        a.succeed(1);
        assert!(!bar.is_completed());
        b.fail(SlotError("b"));
        assert!(!bar.is_completed());
        c.succeed(3);

        assert!(bar.wait(Duration::from_secs(1)));
        assert!(bar.is_successful());
    }

    #[test]
    fn sequence_reports_first_failure_and_ignores_later_completions() {
        let a = Deferred::<i32>::new();
        let b = Deferred::<i32>::new();
        let c = Deferred::<i32>::new();
        let seq = sequence(&[a.clone(), b.clone(), c.clone()]);

        b.fail(SlotError("b"));
        assert!(seq.wait(Duration::from_secs(1)));
        assert!(seq.is_failed());

        a.succeed(1);
        c.succeed(3);
        assert!(seq.is_failed());
        assert_eq!(seq.failure().unwrap().cause().to_string(), "slot failed: b");
    }

    #[test]
    fn sequence_succeeds_with_values_in_order() {
        let a = Deferred::<i32>::new();
        let b = Deferred::<i32>::new();
        let seq = sequence(&[a.clone(), b.clone()]);

        b.succeed(2);
        a.succeed(1);

        assert!(seq.wait(Duration::from_secs(1)));
        let values: Vec<i32> = seq.peek().unwrap().iter().map(|v| **v).collect();
        assert_eq!(values, vec![1, 2]);
    }

    #[test]
    fn empty_aggregations_complete_immediately() {
        let empty: Vec<Deferred<i32>> = Vec::new();
        assert!(sequence(&empty).is_successful());
        assert!(barrier(&empty).is_successful());
    }
}
