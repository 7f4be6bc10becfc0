//! Kernel: a general-purpose application kernel built around one hard
//! systems primitive.
//!
//! Kernel provides framework bootstrap, configuration loading, logging
//! wiring, and a handful of utility abstractions. The one part of this
//! workspace that embodies real systems engineering is the **Deferred
//! Value** (re-exported here from `kernel-core`): a thread-safe,
//! single-assignment cell for a value computed elsewhere, with completion
//! callbacks, composition, blocking wait, and aggregation.
//!
//! ```
//! use kernel::prelude::*;
//! use std::time::Duration;
//!
//! let cell = Deferred::<i32>::new();
//! cell.on_success(|v| println!("got {v}"));
//! cell.succeed(7);
//! assert!(cell.wait(Duration::from_secs(0)));
//! ```
//!
//! Everything else in this crate — bootstrap, configuration, logging setup —
//! is thin glue around that primitive and is not itself a hard dependency:
//! hosts that only want the Deferred Value can depend on `kernel-core`
//! directly.

pub mod bootstrap;
pub mod config;

pub use kernel_core::{
    barrier, sequence, DoubleCompletion, Deferred, Failure, FailureSink, Handler, HandlerPanic,
    Outcome, WeakDeferred,
};
pub use kernel_core::sink;

pub use bootstrap::{init, BootstrapError};
pub use config::{ConfigError, KernelConfig};

pub mod prelude {
    //! Common imports for applications built on the kernel.
    //!
    //! ```
    //! use kernel::prelude::*;
    //! ```

    pub use crate::{barrier, sequence, Deferred, Failure, FailureSink, Handler, Outcome};
}

#[cfg(test)]
mod tests {
    use super::prelude::*;
    use std::time::Duration;

    #[test]
    fn facade_reexports_the_core_primitive() {
        let cell = Deferred::<i32>::new();
        cell.succeed(1);
        assert!(cell.wait(Duration::ZERO));
        assert_eq!(cell.peek().map(|v| *v), Some(1));
    }
}
