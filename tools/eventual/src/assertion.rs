//! The retry loop behind [`Waiter::assert`](crate::waiter::Waiter::assert).

use crate::isolation::{attempt, AttemptOutcome};
use crate::logging::append_run_log;
use crate::reporter::Reporter;
use crate::waiter::Waiter;
use serde_json::json;

impl Waiter {
    /// Run `block` until it stops failing or the timeout elapses, then
    /// replay the last attempt onto `reporter`.
    ///
    /// Each attempt gets a fresh recorder on its own thread. A failed attempt
    /// has its cleanups run before the next one starts and its failure
    /// dropped. Only the final attempt's events reach `reporter`, so the test
    /// sees exactly one outcome carrying the latest diagnostics. A skipped
    /// attempt that did not fail ends the loop like a success would.
    ///
    /// `block` may run many times and should be safe to repeat.
    pub fn assert<F>(&self, reporter: &dyn Reporter, block: F)
    where
        F: Fn(&dyn Reporter) + Sync,
    {
        let mut last: Option<AttemptOutcome<'_>> = None;
        let mut spawn_error = None;
        let mut attempts = 0u32;

        self.wait_while(|| {
            attempts += 1;
            let outcome = match attempt(reporter, &block) {
                Ok(outcome) => outcome,
                Err(err) => {
                    spawn_error = Some(err);
                    return false;
                }
            };
            append_run_log(
                "debug",
                "eventual.attempt",
                json!({
                    "test": reporter.name(),
                    "attempt": attempts,
                    "failed": outcome.failed,
                    "skipped": outcome.skipped,
                    "events": outcome.recorder.events(),
                }),
            );
            if outcome.failed {
                outcome.recorder.replay_cleanup(reporter);
            }
            let retry = outcome.failed;
            last = Some(outcome);
            retry
        });

        if let Some(err) = spawn_error {
            append_run_log(
                "error",
                "eventual.spawn_failed",
                json!({ "test": reporter.name(), "attempt": attempts, "error": err.to_string() }),
            );
            if let Some(outcome) = last.take() {
                outcome.recorder.replay_cleanup(reporter);
            }
            reporter.fatal(&format!("eventual: attempt {attempts} could not start: {err}"));
        }

        if let Some(outcome) = last {
            append_run_log(
                "info",
                "eventual.replay",
                json!({
                    "test": reporter.name(),
                    "attempts": attempts,
                    "failed": outcome.failed,
                    "skipped": outcome.skipped,
                }),
            );
            outcome.recorder.replay(reporter);
        }
    }
}
