//! The `demo` subcommand: exercises the Deferred Value API end-to-end.
//!
//! Spawns a handful of worker threads that each complete a [`Deferred`]
//! after simulated work, composes them with `transform` and `sequence`, and
//! prints the aggregate result. Purely illustrative — this is not a
//! protocol surface, just a tour of the primitive the kernel exists for.

use std::thread;
use std::time::Duration;

use chrono::Local;
use kernel::prelude::*;

/// Runs `jobs` simulated workers and prints their aggregate outcome.
///
/// If `inject_failure` is set, the last job fails instead of succeeding, to
/// demonstrate `sequence`'s first-failure semantics.
pub fn execute(jobs: usize, inject_failure: bool) -> anyhow::Result<()> {
    if jobs == 0 {
        anyhow::bail!("--jobs must be at least 1");
    }

    let cells: Vec<Deferred<u64>> = (0..jobs).map(|_| Deferred::new()).collect();
    let mut handles = Vec::with_capacity(jobs);

    for (index, cell) in cells.iter().cloned().enumerate() {
        let should_fail = inject_failure && index == jobs - 1;
        handles.push(thread::spawn(move || {
            thread::sleep(Duration::from_millis(10 * (index as u64 + 1)));
            if should_fail {
                cell.fail(JobError { index });
            } else {
                cell.succeed((index as u64 + 1) * (index as u64 + 1));
            }
        }));
    }

    // Compose each worker's raw result into a derived cell before
    // aggregating, so the printed pipeline exercises `transform` as well as
    // `sequence`.
    let doubled: Vec<Deferred<u64>> = cells.iter().map(|c| c.transform(|v| *v * 2)).collect();
    let aggregate = sequence(&doubled);

    for handle in handles {
        let _ = handle.join();
    }

    aggregate.wait(Duration::from_secs(5));
    let now = Local::now().format("%H:%M:%S%.3f");

    if let Some(values) = aggregate.peek() {
        println!("[{now}] all {jobs} jobs succeeded: {:?}", values.iter().map(|v| **v).collect::<Vec<_>>());
    } else if let Some(failure) = aggregate.failure() {
        println!("[{now}] aggregate failed: {}", failure.cause());
    } else {
        println!("[{now}] aggregate did not complete within the timeout");
    }

    Ok(())
}

#[derive(Debug, thiserror::Error)]
#[error("job {index} failed")]
struct JobError {
    index: usize,
}
