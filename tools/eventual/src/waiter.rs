//! Polling primitives: a cooperative pause and a deadline-bounded loop.

use crate::runtime::{Clock, ProductionClock, ThreadCensus, UnitCensus};
use std::sync::Arc;
use std::time::Duration;

/// Retry policy plus the clock and census it paces itself with.
///
/// `step` is the base pause between attempts and `timeout` the total budget
/// of one wait. A zero timeout evaluates the condition exactly once.
#[derive(Clone)]
pub struct Waiter {
    pub step: Duration,
    pub timeout: Duration,
    clock: Arc<dyn Clock>,
    census: Arc<dyn UnitCensus>,
}

impl Waiter {
    pub fn new(step: Duration, timeout: Duration) -> Self {
        Self::with_runtime(
            step,
            timeout,
            Arc::new(ProductionClock),
            Arc::new(ThreadCensus),
        )
    }

    pub fn with_runtime(
        step: Duration,
        timeout: Duration,
        clock: Arc<dyn Clock>,
        census: Arc<dyn UnitCensus>,
    ) -> Self {
        Self {
            step,
            timeout,
            clock,
            census,
        }
    }

    /// Pause for roughly one `step`, split into one slice per live unit with
    /// a yield before each slice so other runnable threads get scheduled.
    pub fn wait(&self) {
        let units = self.census.live_units().max(1);
        let slice = self.step / u32::try_from(units).unwrap_or(u32::MAX);
        for _ in 0..units {
            self.clock.yield_now();
            self.clock.sleep(slice);
        }
    }

    /// Keep waiting while `condition` holds and the deadline, fixed on entry,
    /// has not passed. `condition` may be called many times.
    pub fn wait_while(&self, mut condition: impl FnMut() -> bool) {
        let deadline = self.clock.now() + self.timeout;
        while condition() && self.clock.now() < deadline {
            self.wait();
        }
    }
}

impl Default for Waiter {
    fn default() -> Self {
        Self::new(Duration::from_millis(10), Duration::ZERO)
    }
}

impl std::fmt::Debug for Waiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Waiter")
            .field("step", &self.step)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
