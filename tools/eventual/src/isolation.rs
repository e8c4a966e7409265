//! Running assertion blocks and cleanups on their own thread.

use crate::errors::EventualError;
use crate::recorder::RecordingReporter;
use crate::reporter::{is_abort_signal, panic_message, Reporter};
use std::thread;

const ATTEMPT_UNIT_NAME: &str = "eventual-attempt";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitExit {
    Completed,
    Aborted,
    Panicked(String),
}

/// Run `f` on a scoped thread and block until it returns or unwinds.
///
/// An abort raised inside `f` is reported as [`UnitExit::Aborted`]; any other
/// panic is captured with its message. Neither unwinds the caller.
pub fn in_isolated_unit<F>(name: &str, f: F) -> Result<UnitExit, EventualError>
where
    F: FnOnce() + Send,
{
    thread::scope(|scope| {
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn_scoped(scope, f)
            .map_err(|e| EventualError::Spawn(e.to_string()))?;
        Ok(match handle.join() {
            Ok(()) => UnitExit::Completed,
            Err(payload) if is_abort_signal(payload.as_ref()) => UnitExit::Aborted,
            Err(payload) => UnitExit::Panicked(panic_message(payload.as_ref())),
        })
    })
}

/// Run `block` against `recorder` in isolation and report whether the
/// recorder ended up failed.
pub fn run_isolated<F>(recorder: &RecordingReporter<'_>, block: &F) -> Result<bool, EventualError>
where
    F: Fn(&dyn Reporter) + Sync,
{
    let reporter: &dyn Reporter = recorder;
    match in_isolated_unit(ATTEMPT_UNIT_NAME, || block(reporter))? {
        UnitExit::Completed | UnitExit::Aborted => {}
        UnitExit::Panicked(message) => recorder.record_panic(message),
    }
    Ok(recorder.failed())
}

/// One finished attempt. Holding the recorder keeps the outcome and its
/// buffered events tied together.
pub struct AttemptOutcome<'a> {
    pub recorder: RecordingReporter<'a>,
    pub failed: bool,
    pub skipped: bool,
}

pub fn attempt<'a, F>(reporter: &'a dyn Reporter, block: &F) -> Result<AttemptOutcome<'a>, EventualError>
where
    F: Fn(&dyn Reporter) + Sync,
{
    let recorder = RecordingReporter::new(reporter);
    let failed = run_isolated(&recorder, block)?;
    let skipped = recorder.skipped();
    Ok(AttemptOutcome {
        recorder,
        failed,
        skipped,
    })
}
