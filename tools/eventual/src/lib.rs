//! Eventually-consistent assertions for test suites.
//!
//! A [`Waiter`] re-runs an assertion block until it stops failing or its
//! timeout elapses. Every attempt runs on its own thread against a
//! [`RecordingReporter`], so an aborting assertion ends only that attempt.
//! Intermediate failures are discarded after their cleanups run; the last
//! attempt is replayed onto the real [`Reporter`] exactly once.
//!
//! Report failures through [`Reporter::error`] and [`Reporter::fatal`]
//! rather than `assert!`/`panic!`. Both work, but a panicking attempt goes
//! through the panic hook and writes to stderr on every retry, while the
//! reporter calls stay silent until the final replay.
//!
//! ```no_run
//! use eventual::{run_test, Reporter, Waiter};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::time::Duration;
//!
//! let counter = AtomicUsize::new(0);
//! let waiter = Waiter::new(Duration::from_millis(5), Duration::from_secs(1));
//! run_test("counter_converges", |t| {
//!     waiter.assert(t, |t| {
//!         if counter.fetch_add(1, Ordering::SeqCst) < 3 {
//!             t.error("not there yet");
//!         }
//!     });
//! })
//! .ok();
//! ```

pub mod assertion;
pub mod config;
pub mod errors;
pub mod host;
pub mod isolation;
pub mod logging;
pub mod recorder;
pub mod reporter;
pub mod runtime;
pub mod stub;
pub mod waiter;

pub use errors::EventualError;
pub use host::{run_test, StdReporter, TestOutcome};
pub use recorder::{Event, RecordingReporter};
pub use reporter::{CleanupFn, Reporter};
pub use waiter::Waiter;
