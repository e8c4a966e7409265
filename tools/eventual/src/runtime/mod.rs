//! Clock, thread census and filesystem seams, with fakes for tests.

use crate::errors::EventualError;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Used when the platform cannot report how many threads are alive.
pub const FALLBACK_LIVE_UNITS: usize = 4;

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
    fn yield_now(&self);
}

/// Senses how many units of execution are currently alive in the process.
pub trait UnitCensus: Send + Sync {
    fn live_units(&self) -> usize;
}

pub trait FileSystem: Send + Sync {
    fn read_to_string(&self, path: &Path) -> Result<String, EventualError>;
}

pub struct ProductionClock;

impl Clock for ProductionClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }

    fn yield_now(&self) {
        std::thread::yield_now();
    }
}

/// Counts the threads of the current process.
///
/// Linux exposes the count in `/proc/self/status`; everywhere else, or when
/// the file cannot be read, [`FALLBACK_LIVE_UNITS`] is reported.
pub struct ThreadCensus;

impl UnitCensus for ThreadCensus {
    fn live_units(&self) -> usize {
        std::fs::read_to_string("/proc/self/status")
            .ok()
            .and_then(|status| parse_thread_count(&status))
            .unwrap_or(FALLBACK_LIVE_UNITS)
    }
}

fn parse_thread_count(status: &str) -> Option<usize> {
    status
        .lines()
        .find_map(|line| line.strip_prefix("Threads:"))
        .and_then(|value| value.trim().parse::<usize>().ok())
        .filter(|count| *count > 0)
}

pub struct ProductionFileSystem;

impl FileSystem for ProductionFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String, EventualError> {
        std::fs::read_to_string(path).map_err(|e| EventualError::Io(e.to_string()))
    }
}

/// A clock that only moves when something sleeps on it.
#[derive(Clone)]
pub struct FakeClock {
    origin: Instant,
    elapsed: Arc<Mutex<Duration>>,
    sleeps: Arc<Mutex<Vec<Duration>>>,
    yields: Arc<AtomicUsize>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            elapsed: Arc::new(Mutex::new(Duration::ZERO)),
            sleeps: Arc::new(Mutex::new(Vec::new())),
            yields: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn advance(&self, duration: Duration) {
        *self.elapsed.lock().expect("clock lock") += duration;
    }

    pub fn elapsed(&self) -> Duration {
        *self.elapsed.lock().expect("clock lock")
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().expect("sleep lock").clone()
    }

    pub fn yields(&self) -> usize {
        self.yields.load(Ordering::SeqCst)
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        self.sleeps.lock().expect("sleep lock").push(duration);
        self.advance(duration);
    }

    fn yield_now(&self) {
        self.yields.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct FixedCensus(pub usize);

impl UnitCensus for FixedCensus {
    fn live_units(&self) -> usize {
        self.0
    }
}

#[derive(Default, Clone)]
pub struct FakeFileSystem {
    files: Arc<Mutex<HashMap<PathBuf, String>>>,
}

impl FakeFileSystem {
    pub fn with_file(path: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        let fs = Self::default();
        fs.files
            .lock()
            .expect("files lock")
            .insert(path.into(), contents.into());
        fs
    }
}

impl FileSystem for FakeFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String, EventualError> {
        self.files
            .lock()
            .expect("files lock")
            .get(path)
            .cloned()
            .ok_or_else(|| EventualError::Io(format!("missing file {}", path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_thread_count, Clock, FakeClock, ThreadCensus, UnitCensus};
    use std::time::Duration;

    #[test]
    fn parses_thread_line_from_proc_status() {
        let status = "Name:\ttest\nState:\tR (running)\nThreads:\t12\nSigQ:\t0/1\n";
        assert_eq!(parse_thread_count(status), Some(12));
        assert_eq!(parse_thread_count("Name:\ttest\n"), None);
        assert_eq!(parse_thread_count("Threads:\t0\n"), None);
    }

    #[test]
    fn thread_census_reports_at_least_one_unit() {
        assert!(ThreadCensus.live_units() >= 1);
    }

    #[test]
    fn fake_clock_advances_only_on_sleep() {
        let clock = FakeClock::new();
        let start = clock.now();
        clock.yield_now();
        assert_eq!(clock.now(), start);
        clock.sleep(Duration::from_millis(7));
        assert_eq!(clock.now() - start, Duration::from_millis(7));
        assert_eq!(clock.sleeps(), vec![Duration::from_millis(7)]);
        assert_eq!(clock.yields(), 1);
    }
}
