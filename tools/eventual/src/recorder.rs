//! A [`Reporter`] that buffers every call so one attempt's outcome can be
//! replayed later, or dropped when the attempt is retried.

use crate::isolation::{in_isolated_unit, UnitExit};
use crate::logging::append_run_log;
use crate::reporter::{abort_unit, CleanupFn, Reporter};
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

const CLEANUP_UNIT_NAME: &str = "eventual-cleanup";

/// One buffered reporter call, in the order the assertion block made it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    Fail,
    FailNow,
    Skip,
    SkipNow,
    Log { message: String },
    /// The block panicked with something other than the abort signal.
    ///
    /// Such panics still go through the process panic hook, so each retried
    /// attempt prints its message (and a backtrace when enabled) to stderr.
    Panic { message: String },
}

impl Event {
    /// Whether forwarding this event unwinds the caller.
    pub fn is_abort(&self) -> bool {
        matches!(self, Self::FailNow | Self::SkipNow | Self::Panic { .. })
    }

    fn apply(&self, target: &dyn Reporter) {
        match self {
            Self::Fail => target.fail(),
            Self::FailNow => target.fail_now(),
            Self::Skip => target.skip(),
            Self::SkipNow => target.skip_now(),
            Self::Log { message } => target.log(message),
            Self::Panic { message } => target.fatal(message),
        }
    }
}

#[derive(Default)]
struct RecorderState {
    failed: bool,
    skipped: bool,
    events: Vec<Event>,
    cleanups: Vec<CleanupFn>,
}

pub struct RecordingReporter<'a> {
    inner: Option<&'a dyn Reporter>,
    passthrough: bool,
    state: Mutex<RecorderState>,
}

impl<'a> RecordingReporter<'a> {
    /// Buffer everything, including cleanups, on top of `inner`.
    pub fn new(inner: &'a dyn Reporter) -> Self {
        Self {
            inner: Some(inner),
            passthrough: false,
            state: Mutex::new(RecorderState::default()),
        }
    }

    /// A recorder that is never replayed onto a live reporter.
    pub fn detached() -> Self {
        Self {
            inner: None,
            passthrough: false,
            state: Mutex::new(RecorderState::default()),
        }
    }

    /// Buffer outcome events but hand cleanups to `inner` right away, each
    /// wrapped to run in its own unit.
    pub fn passthrough(inner: &'a dyn Reporter) -> Self {
        Self {
            inner: Some(inner),
            passthrough: true,
            state: Mutex::new(RecorderState::default()),
        }
    }

    // The lock is never held across user code or an unwind, so a poisoned
    // guard still holds consistent state.
    fn state(&self) -> MutexGuard<'_, RecorderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, event: Event) {
        let mut state = self.state();
        match event {
            Event::Fail | Event::FailNow | Event::Panic { .. } => state.failed = true,
            Event::Skip | Event::SkipNow => state.skipped = true,
            Event::Log { .. } => {}
        }
        state.events.push(event);
    }

    pub fn record_panic(&self, message: String) {
        self.record(Event::Panic { message });
    }

    pub fn events(&self) -> Vec<Event> {
        self.state().events.clone()
    }

    pub fn pending_cleanups(&self) -> usize {
        self.state().cleanups.len()
    }

    fn take(&self) -> (Vec<Event>, Vec<CleanupFn>) {
        let mut state = self.state();
        (
            std::mem::take(&mut state.events),
            std::mem::take(&mut state.cleanups),
        )
    }

    /// Forward the recorded events to `target` in call order, then run the
    /// buffered cleanups. An abort event is forwarded last, after cleanups,
    /// because it unwinds the calling thread.
    pub fn replay(self, target: &dyn Reporter) {
        let (events, cleanups) = self.take();
        let mut terminal = None;
        for event in events {
            if event.is_abort() {
                terminal = Some(event);
                break;
            }
            event.apply(target);
        }
        run_cleanups(cleanups, |problem| target.error(&problem));
        if let Some(event) = terminal {
            event.apply(target);
        }
    }

    /// Run and drain the buffered cleanups only. Outcome events stay
    /// buffered and are discarded with the recorder.
    ///
    /// `target` only names the test in the run log: a cleanup that panics
    /// here never changes its outcome.
    pub fn replay_cleanup(&self, target: &dyn Reporter) {
        let cleanups = std::mem::take(&mut self.state().cleanups);
        run_cleanups(cleanups, |problem| {
            append_run_log(
                "warn",
                "eventual.cleanup",
                json!({ "test": target.name(), "problem": problem }),
            );
        });
    }
}

fn run_cleanups(cleanups: Vec<CleanupFn>, report: impl Fn(String)) {
    for cleanup in cleanups.into_iter().rev() {
        match in_isolated_unit(CLEANUP_UNIT_NAME, cleanup) {
            Ok(UnitExit::Completed | UnitExit::Aborted) => {}
            Ok(UnitExit::Panicked(message)) => report(format!("cleanup panicked: {message}")),
            Err(err) => report(format!("cleanup was not run: {err}")),
        }
    }
}

impl Reporter for RecordingReporter<'_> {
    fn fail(&self) {
        self.record(Event::Fail);
    }

    fn fail_now(&self) -> ! {
        self.record(Event::FailNow);
        abort_unit()
    }

    fn failed(&self) -> bool {
        self.state().failed
    }

    fn skip(&self) {
        self.record(Event::Skip);
    }

    fn skip_now(&self) -> ! {
        self.record(Event::SkipNow);
        abort_unit()
    }

    fn skipped(&self) -> bool {
        self.state().skipped
    }

    fn log(&self, message: &str) {
        self.record(Event::Log {
            message: message.to_string(),
        });
    }

    fn name(&self) -> String {
        self.inner.map(|inner| inner.name()).unwrap_or_default()
    }

    fn temp_dir(&self) -> PathBuf {
        self.inner.map(|inner| inner.temp_dir()).unwrap_or_default()
    }

    fn cleanup(&self, f: CleanupFn) {
        match self.inner {
            Some(inner) if self.passthrough => inner.cleanup(Box::new(move || {
                if let Ok(UnitExit::Panicked(message)) = in_isolated_unit(CLEANUP_UNIT_NAME, f) {
                    append_run_log("warn", "eventual.cleanup", json!({ "panic": message }));
                }
            })),
            _ => self.state().cleanups.push(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Event, RecordingReporter};
    use crate::isolation::{in_isolated_unit, UnitExit};
    use crate::reporter::{CleanupFn, Reporter};
    use crate::stub::StubReporter;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};

    fn push_on_run(order: &Arc<Mutex<Vec<&'static str>>>, label: &'static str) -> CleanupFn {
        let order = Arc::clone(order);
        Box::new(move || order.lock().expect("order lock").push(label))
    }

    #[test]
    fn flags_follow_recorded_events() {
        let recorder = RecordingReporter::detached();
        assert!(!recorder.failed());
        recorder.log("hello");
        assert!(!recorder.failed());
        recorder.skip();
        assert!(recorder.skipped());
        assert!(!recorder.failed());
        recorder.fail();
        assert!(recorder.failed());
    }

    #[test]
    fn replay_forwards_events_in_call_order_then_runs_cleanups() {
        let stub = StubReporter::default();
        let order = Arc::new(Mutex::new(Vec::new()));
        let recorder = RecordingReporter::new(&stub);

        recorder.log("first");
        recorder.cleanup(push_on_run(&order, "a"));
        recorder.fail();
        recorder.cleanup(push_on_run(&order, "b"));
        recorder.log("second");

        assert!(!stub.failed());
        assert!(stub.logs().is_empty());

        recorder.replay(&stub);

        assert!(stub.failed());
        assert_eq!(stub.logs(), vec!["first".to_string(), "second".to_string()]);
        assert_eq!(*order.lock().expect("order lock"), vec!["b", "a"]);
    }

    #[test]
    fn replay_cleanup_drains_so_final_replay_does_not_rerun() {
        let stub = StubReporter::default();
        let order = Arc::new(Mutex::new(Vec::new()));
        let recorder = RecordingReporter::new(&stub);
        recorder.cleanup(push_on_run(&order, "a"));
        recorder.cleanup(push_on_run(&order, "b"));
        recorder.error("boom");

        recorder.replay_cleanup(&stub);
        assert_eq!(*order.lock().expect("order lock"), vec!["b", "a"]);
        assert_eq!(recorder.pending_cleanups(), 0);
        assert!(!stub.failed());
        assert!(stub.logs().is_empty());

        recorder.replay(&stub);
        assert_eq!(order.lock().expect("order lock").len(), 2);
        assert!(stub.failed());
    }

    #[test]
    fn cleanup_panics_fail_the_target_only_on_final_replay() {
        let stub = StubReporter::default();
        let recorder = RecordingReporter::new(&stub);
        recorder.cleanup(Box::new(|| panic!("flaky teardown")));
        recorder.replay_cleanup(&stub);
        assert!(!stub.failed());
        assert!(stub.logs().is_empty());

        let recorder = RecordingReporter::new(&stub);
        recorder.cleanup(Box::new(|| panic!("flaky teardown")));
        recorder.replay(&stub);
        assert!(stub.failed());
        assert_eq!(stub.logs(), vec!["cleanup panicked: flaky teardown".to_string()]);
    }

    #[test]
    fn abort_event_is_forwarded_after_cleanups() {
        let stub = StubReporter::default();
        let order = Arc::new(Mutex::new(Vec::new()));
        let recorder = RecordingReporter::new(&stub);
        recorder.log("diagnostic");
        recorder.cleanup(push_on_run(&order, "cleanup"));
        let _ = in_isolated_unit("abort", || recorder.fail_now());

        let exit = in_isolated_unit("replay", || recorder.replay(&stub)).expect("spawn");

        assert_eq!(exit, UnitExit::Aborted);
        assert!(stub.failed());
        assert_eq!(stub.logs(), vec!["diagnostic".to_string()]);
        assert_eq!(*order.lock().expect("order lock"), vec!["cleanup"]);
    }

    #[test]
    fn panic_events_replay_as_fatal_with_message() {
        let stub = StubReporter::default();
        let recorder = RecordingReporter::new(&stub);
        recorder.record_panic("assertion `left == right` failed".to_string());
        assert_eq!(
            recorder.events(),
            vec![Event::Panic {
                message: "assertion `left == right` failed".to_string()
            }]
        );

        let exit = in_isolated_unit("replay", || recorder.replay(&stub)).expect("spawn");
        assert_eq!(exit, UnitExit::Aborted);
        assert!(stub.failed());
        assert_eq!(stub.logs(), vec!["assertion `left == right` failed".to_string()]);
    }

    #[test]
    fn passthrough_forwards_cleanups_immediately() {
        let forwarded: Arc<Mutex<Vec<CleanupFn>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&forwarded);
        let stub = StubReporter::default().with_cleanup_sink(move |f| {
            sink.lock().expect("sink lock").push(f);
        });
        let order = Arc::new(Mutex::new(Vec::new()));
        let recorder = RecordingReporter::passthrough(&stub);

        recorder.cleanup(push_on_run(&order, "now"));
        assert_eq!(recorder.pending_cleanups(), 0);

        let mut forwarded = forwarded.lock().expect("forwarded lock");
        assert_eq!(forwarded.len(), 1);
        for f in forwarded.drain(..) {
            f();
        }
        assert_eq!(*order.lock().expect("order lock"), vec!["now"]);
    }

    #[test]
    fn passthrough_cleanup_abort_stays_inside_its_unit() {
        let forwarded: Arc<Mutex<Vec<CleanupFn>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&forwarded);
        let stub = StubReporter::default().with_cleanup_sink(move |f| {
            sink.lock().expect("sink lock").push(f);
        });
        let recorder = RecordingReporter::passthrough(&stub);
        recorder.cleanup(Box::new(|| crate::reporter::abort_unit()));

        let cleanups = std::mem::take(&mut *forwarded.lock().expect("forwarded lock"));
        for f in cleanups {
            f();
        }
    }

    #[test]
    fn name_and_temp_dir_come_from_the_wrapped_reporter() {
        let stub = StubReporter::named("orders_settle");
        let recorder = RecordingReporter::new(&stub);
        assert_eq!(recorder.name(), "orders_settle");
        assert_eq!(recorder.temp_dir(), stub.temp_dir());

        let detached = RecordingReporter::detached();
        assert_eq!(detached.name(), "");
        assert_eq!(detached.temp_dir(), PathBuf::new());
    }
}
