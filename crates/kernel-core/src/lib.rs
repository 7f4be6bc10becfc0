//! Core of the kernel workspace: the asynchronous completion primitive.
//!
//! # ⚠️ API Stability Warning
//!
//! **This crate contains internal APIs that are UNSTABLE and may change without notice.**
//!
//! For application code, use the `kernel` crate instead:
//! ```rust,ignore
//! use kernel::prelude::*;  // STABLE user-facing API
//! ```
//!
//! The `kernel-core` APIs are intended for:
//! - Building custom executors and embedding hosts
//! - Advanced integrations with the kernel's internals
//! - Contributing to the kernel itself
//!
//! **Stability guarantees:**
//! - ❌ **No SemVer guarantees** - breaking changes may occur in minor versions (0.x.y)
//! - ❌ **No deprecation warnings** - APIs may be removed without warning
//! - ❌ **Internal implementation details** - subject to refactoring
//!
//! ---
//!
//! This crate provides:
//! - [`Deferred`], a thread-safe single-assignment cell for a value computed
//!   elsewhere, with completion callbacks and blocking wait
//! - Composition operators (`transform`, `flat_transform`, `chain`,
//!   `map_chain`, `fail_chain`) that build derived `Deferred` values
//! - [`sequence`] and [`barrier`], aggregation over many `Deferred` values
//! - [`sink`], the external failure-logging hook the above report to
//!
//! The core owns no threads: it is a rendezvous object used by whatever
//! executor the host embeds. There is no work-stealing, no cancellation
//! propagation across a combinator graph, and no persistence of pending
//! state across restarts — see the workspace's `SPEC_FULL.md` for the full
//! list of non-goals.

mod aggregate;
mod combinators;
mod deferred;
pub mod failure;
pub mod sink;

pub use aggregate::{barrier, sequence};
pub use deferred::{Deferred, Handler, Outcome, WeakDeferred};
pub use failure::{DoubleCompletion, Failure, HandlerPanic};
pub use sink::FailureSink;
