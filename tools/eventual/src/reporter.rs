//! The reporting contract shared by real test hosts, the recorder and stubs.

use std::any::Any;
use std::path::PathBuf;

/// A deferred side effect registered through [`Reporter::cleanup`].
pub type CleanupFn = Box<dyn FnOnce() + Send + 'static>;

/// Unwind payload used by the abort-style operations.
///
/// It is raised with [`std::panic::resume_unwind`], so the panic hook never
/// runs for it, and it is caught at the boundary of the unit that raised it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitAborted;

/// Terminate the current unit of execution without touching its siblings.
pub fn abort_unit() -> ! {
    std::panic::resume_unwind(Box::new(UnitAborted))
}

pub fn is_abort_signal(payload: &(dyn Any + Send)) -> bool {
    payload.is::<UnitAborted>()
}

/// Render a foreign panic payload the way the default hook would.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic with a non-string payload".to_string()
    }
}

/// Capability every test-reporting object provides.
///
/// `fail_now` and `skip_now` end only the calling thread; everything else
/// returns to the caller.
pub trait Reporter: Send + Sync {
    fn fail(&self);
    fn fail_now(&self) -> !;
    fn failed(&self) -> bool;
    fn skip(&self);
    fn skip_now(&self) -> !;
    fn skipped(&self) -> bool;
    fn log(&self, message: &str);
    fn name(&self) -> String;
    fn temp_dir(&self) -> PathBuf;
    /// Register `f` to run once the unit's work is finished. Cleanups run
    /// last-registered-first.
    fn cleanup(&self, f: CleanupFn);

    fn error(&self, message: &str) {
        self.log(message);
        self.fail();
    }

    fn fatal(&self, message: &str) -> ! {
        self.log(message);
        self.fail_now()
    }

    fn skip_with(&self, message: &str) -> ! {
        self.log(message);
        self.skip_now()
    }
}
