//! Framework bootstrap: the kernel's single published hook into the
//! ambient stack described in `SPEC_FULL.md` §10.3.
//!
//! `init` wires up logging and the process-scope [`FailureSink`], and prints
//! a thread-count hint for whatever executor the host embeds. It does not
//! start an executor and does not own threads — this crate is a rendezvous
//! object, not a runtime.

use std::sync::Arc;

use kernel_core::sink::{self, FailureSink, TracingFailureSink};
use kernel_core::Failure;

use crate::config::KernelConfig;

/// Errors that can occur during bootstrap.
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("failed to install the global tracing subscriber: {0}")]
    TracingInit(#[from] tracing_subscriber::util::TryInitError),
}

/// Installs the global `tracing` subscriber and the process-scope
/// [`FailureSink`], then logs the thread-count hint embedding executors are
/// expected to honor.
///
/// Idempotent in the sense that calling it more than once is harmless: the
/// second call's subscriber install fails and is ignored, and
/// [`sink::install`] is a no-op once a sink is already active.
pub fn init(config: KernelConfig) -> Result<(), BootstrapError> {
    let filter = tracing_subscriber::EnvFilter::try_new(&config.log_level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let subscriber_installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();

    match subscriber_installed {
        Ok(()) => {}
        Err(_) => {
            // A subscriber is already installed (e.g. the host app or an
            // earlier call to `init`); proceed with it rather than erroring.
        }
    }

    sink::install(Arc::new(BootstrapFailureSink {
        inner: TracingFailureSink,
        fatal_double_completion: config.fatal_double_completion,
    }));

    let threads = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    tracing::info!(
        available_parallelism = threads,
        "kernel bootstrap complete; embedding executors should size worker pools around this hint"
    );

    Ok(())
}

/// Wraps [`TracingFailureSink`] to additionally abort the process on a
/// double-completion when `fatal_double_completion` is set and
/// `debug_assertions` are enabled (see the Open Questions in `SPEC_FULL.md` §9).
struct BootstrapFailureSink {
    inner: TracingFailureSink,
    fatal_double_completion: bool,
}

impl FailureSink for BootstrapFailureSink {
    fn report(&self, failure: &Failure) {
        self.inner.report(failure);
        if self.fatal_double_completion
            && cfg!(debug_assertions)
            && failure.cause().is::<kernel_core::DoubleCompletion>()
        {
            panic!("fatal double-completion: {}", failure.cause());
        }
    }

    fn is_fine_enabled(&self) -> bool {
        self.inner.is_fine_enabled()
    }

    fn fine(&self, message: &str) {
        self.inner.fine(message);
    }

    fn ignore(&self, message: &str) {
        self.inner.ignore(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_does_not_panic_on_repeated_calls() {
        init(KernelConfig::default()).unwrap();
        init(KernelConfig::default()).unwrap();
    }
}
