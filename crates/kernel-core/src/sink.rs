//! The external logging hook the core reports unhandled failures to.
//!
//! `kernel-core` never owns the process-wide logging setup; it only
//! publishes this trait as a seam and falls back to a `tracing`-backed
//! default so library-only or test use never panics for want of a sink.

use std::sync::{Arc, OnceLock};

use crate::failure::Failure;

/// Receives failures the core could not hand to an observing caller.
///
/// Implementations are expected to be cheap to call and `Send + Sync`,
/// since the core may invoke them from whichever thread completes a cell.
pub trait FailureSink: Send + Sync {
    /// Logs a failure with diagnostic context. Called at most once per
    /// failure (the core de-duplicates via [`Failure::is_handled`]).
    fn report(&self, failure: &Failure);

    /// Whether fine-grained (verbose) diagnostics should be constructed.
    ///
    /// Lets callers avoid building a `fine` payload when nothing would
    /// consume it.
    fn is_fine_enabled(&self) -> bool;

    /// Emits a fine-grained diagnostic record, e.g. a failure that was
    /// silently dropped because some handler is presumed to observe it.
    fn fine(&self, message: &str);

    /// Swallows a benign event without logging it as a failure.
    fn ignore(&self, message: &str) {
        let _ = message;
    }
}

static ACTIVE_SINK: OnceLock<Arc<dyn FailureSink>> = OnceLock::new();

/// Installs the process-scope failure sink.
///
/// Returns `false` if a sink was already installed (by an earlier call or by
/// the first call to [`active`]); the kernel's bootstrap entry point should
/// be the only caller that relies on the return value.
pub fn install(sink: Arc<dyn FailureSink>) -> bool {
    ACTIVE_SINK.set(sink).is_ok()
}

/// Returns the active process-scope failure sink, installing
/// [`TracingFailureSink`] as the default on first use.
pub fn active() -> Arc<dyn FailureSink> {
    ACTIVE_SINK.get_or_init(|| Arc::new(TracingFailureSink)).clone()
}

/// Default [`FailureSink`] that forwards to the `tracing` ecosystem.
///
/// This is what `kernel-core` uses when no host application has called
/// [`install`] — e.g. in unit tests or when the crate is used as a bare
/// library without the kernel bootstrap.
#[derive(Debug, Default)]
pub struct TracingFailureSink;

impl FailureSink for TracingFailureSink {
    fn report(&self, failure: &Failure) {
        tracing::error!(error = %failure.cause(), "unhandled deferred value failure");
    }

    fn is_fine_enabled(&self) -> bool {
        tracing::enabled!(tracing::Level::DEBUG)
    }

    fn fine(&self, message: &str) {
        tracing::debug!("{message}");
    }

    fn ignore(&self, message: &str) {
        tracing::trace!("{message}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_sink_reports_without_panicking() {
        let failure = Failure::new(DummyError);
        active().report(&failure);
    }

    #[derive(Debug, thiserror::Error)]
    #[error("dummy")]
    struct DummyError;
}
