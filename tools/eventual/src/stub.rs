//! Configurable [`Reporter`] for exercising the waiter without a real host.

use crate::isolation::in_isolated_unit;
use crate::reporter::{abort_unit, CleanupFn, Reporter};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

pub type CleanupSink = Box<dyn Fn(CleanupFn) + Send + Sync>;

#[derive(Default)]
struct StubState {
    failed: bool,
    skipped: bool,
    failure_calls: usize,
    logs: Vec<String>,
    cleanups: Vec<CleanupFn>,
}

#[derive(Default)]
pub struct StubReporter {
    pub stub_name: String,
    pub stub_temp_dir: PathBuf,
    /// Receives every registered cleanup instead of the internal list.
    pub stub_cleanup: Option<CleanupSink>,
    state: Mutex<StubState>,
}

impl StubReporter {
    pub fn named(name: &str) -> Self {
        Self {
            stub_name: name.to_string(),
            stub_temp_dir: std::env::temp_dir().join(name),
            ..Self::default()
        }
    }

    pub fn with_cleanup_sink(mut self, sink: impl Fn(CleanupFn) + Send + Sync + 'static) -> Self {
        self.stub_cleanup = Some(Box::new(sink));
        self
    }

    fn state(&self) -> MutexGuard<'_, StubState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn logs(&self) -> Vec<String> {
        self.state().logs.clone()
    }

    /// How many times `fail` or `fail_now` reached this reporter.
    pub fn failure_calls(&self) -> usize {
        self.state().failure_calls
    }

    /// Run the cleanups registered so far, last-registered-first.
    pub fn finish(&self) {
        let cleanups = std::mem::take(&mut self.state().cleanups);
        for cleanup in cleanups.into_iter().rev() {
            cleanup();
        }
    }
}

impl Reporter for StubReporter {
    fn fail(&self) {
        let mut state = self.state();
        state.failed = true;
        state.failure_calls += 1;
    }

    fn fail_now(&self) -> ! {
        self.fail();
        abort_unit()
    }

    fn failed(&self) -> bool {
        self.state().failed
    }

    fn skip(&self) {
        self.state().skipped = true;
    }

    fn skip_now(&self) -> ! {
        self.skip();
        abort_unit()
    }

    fn skipped(&self) -> bool {
        self.state().skipped
    }

    fn log(&self, message: &str) {
        self.state().logs.push(message.to_string());
    }

    fn name(&self) -> String {
        self.stub_name.clone()
    }

    fn temp_dir(&self) -> PathBuf {
        self.stub_temp_dir.clone()
    }

    fn cleanup(&self, f: CleanupFn) {
        let isolated: CleanupFn = Box::new(move || {
            let _ = in_isolated_unit("stub-cleanup", f);
        });
        match &self.stub_cleanup {
            Some(sink) => sink(isolated),
            None => self.state().cleanups.push(isolated),
        }
    }
}
