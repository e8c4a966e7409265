//! Hosting a [`Reporter`] inside a plain `#[test]` function.

use crate::errors::EventualError;
use crate::isolation::{in_isolated_unit, UnitExit};
use crate::reporter::{abort_unit, CleanupFn, Reporter};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tempfile::TempDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestOutcome {
    Passed,
    Skipped,
}

#[derive(Default)]
struct HostState {
    failed: bool,
    skipped: bool,
    logs: Vec<String>,
    cleanups: Vec<CleanupFn>,
}

/// Reporter backed by a scratch directory that lives as long as the test.
pub struct StdReporter {
    name: String,
    temp_dir: TempDir,
    state: Mutex<HostState>,
}

impl StdReporter {
    pub fn new(name: &str) -> Result<Self, EventualError> {
        let temp_dir = tempfile::Builder::new()
            .prefix(&format!("{}-", sanitize(name)))
            .tempdir()
            .map_err(|e| EventualError::Io(e.to_string()))?;
        Ok(Self {
            name: name.to_string(),
            temp_dir,
            state: Mutex::new(HostState::default()),
        })
    }

    fn state(&self) -> MutexGuard<'_, HostState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn logs(&self) -> Vec<String> {
        self.state().logs.clone()
    }

    fn run_cleanups(&self) {
        loop {
            // Cleanups may register further cleanups; pop one at a time.
            let Some(cleanup) = self.state().cleanups.pop() else {
                break;
            };
            match in_isolated_unit("eventual-host-cleanup", cleanup) {
                Ok(UnitExit::Completed | UnitExit::Aborted) => {}
                Ok(UnitExit::Panicked(message)) => self.error(&format!("cleanup panicked: {message}")),
                Err(err) => self.error(&format!("cleanup was not run: {err}")),
            }
        }
    }

    fn outcome(self) -> Result<TestOutcome, EventualError> {
        let state = self.state.into_inner().unwrap_or_else(PoisonError::into_inner);
        if state.failed {
            return Err(EventualError::TestFailed {
                name: self.name,
                log: state.logs.join("\n"),
            });
        }
        if state.skipped {
            return Ok(TestOutcome::Skipped);
        }
        Ok(TestOutcome::Passed)
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '-' })
        .collect()
}

impl Reporter for StdReporter {
    fn fail(&self) {
        self.state().failed = true;
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
        self.name.clone()
    }

    fn temp_dir(&self) -> PathBuf {
        self.temp_dir.path().to_path_buf()
    }

    fn cleanup(&self, f: CleanupFn) {
        self.state().cleanups.push(f);
    }
}

/// Run `body` against a fresh [`StdReporter`], then its cleanups, and turn
/// the reporter's final state into a result a `#[test]` can return.
pub fn run_test<F>(name: &str, body: F) -> Result<TestOutcome, EventualError>
where
    F: FnOnce(&dyn Reporter) + Send,
{
    let reporter = StdReporter::new(name)?;
    let host: &dyn Reporter = &reporter;
    let exit = in_isolated_unit(name, || body(host))?;
    if let UnitExit::Panicked(message) = exit {
        reporter.error(&message);
    }
    reporter.run_cleanups();
    reporter.outcome()
}
