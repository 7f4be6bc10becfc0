//! The failure cause carried by a failed [`crate::Deferred`], and the small
//! error types the core itself raises (handler panics, double completion).

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// The cause of a failed [`crate::Deferred`] value.
///
/// Wraps an arbitrary error behind a trait object and carries a shared
/// "handled" flag. The flag is set the first time the failure is reported to
/// the [`crate::FailureSink`](crate::sink::FailureSink); since the same
/// `Failure` (not a copy) flows unchanged through `chain`/`transform`/etc.,
/// a failure is never logged twice as it propagates through derived cells.
#[derive(Clone)]
pub struct Failure {
    cause: Arc<dyn std::error::Error + Send + Sync>,
    handled: Arc<AtomicBool>,
}

impl Failure {
    /// Wraps an error as a fresh, unhandled failure.
    pub fn new(cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self {
            cause: Arc::new(cause),
            handled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        Self::new(HandlerPanic::new(payload))
    }

    /// The underlying error.
    pub fn cause(&self) -> &(dyn std::error::Error + Send + Sync) {
        &*self.cause
    }

    /// Whether this failure has already been reported to the failure sink.
    pub fn is_handled(&self) -> bool {
        self.handled.load(Ordering::Acquire)
    }

    /// Marks the failure handled, returning `true` iff this call was the one
    /// that made it so (i.e. the caller is the first to observe it).
    pub(crate) fn mark_handled(&self) -> bool {
        !self.handled.swap(true, Ordering::AcqRel)
    }
}

impl fmt::Debug for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Failure")
            .field("cause", &self.cause.to_string())
            .field("handled", &self.is_handled())
            .finish()
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.cause)
    }
}

/// A completion handler panicked, or a `transform`/`flat_transform` mapper
/// panicked before producing its output.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct HandlerPanic {
    message: String,
}

impl HandlerPanic {
    fn new(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "handler panicked with a non-string payload".to_string()
        };
        Self { message }
    }
}

/// `succeed`/`fail` was called on a cell already in a terminal state.
///
/// This is a programming error on the producer's part. The implementation
/// reports it to the failure sink and leaves the existing outcome untouched.
#[derive(Debug, thiserror::Error)]
#[error("deferred value completed more than once")]
pub struct DoubleCompletion;
