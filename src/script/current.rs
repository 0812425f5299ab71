// src/script/current.rs

//! Thread-local "which script am I" slot.
//!
//! Each script thread installs its own handle before running the work, so
//! script bodies can call [`Script::current`] instead of threading the
//! handle through every helper.
//!
//! The same slot lets the panic hook tell script panics apart from any
//! other panic in the process: only the former get a trace recorded.

use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::panic;
use std::sync::Once;

use super::Script;

thread_local! {
    static CURRENT: RefCell<Option<Script>> = const { RefCell::new(None) };
    static PANIC_TRACE: RefCell<Option<String>> = const { RefCell::new(None) };
}

static HOOK: Once = Once::new();

/// Restores the previous slot value on drop.
pub(crate) struct CurrentGuard {
    previous: Option<Script>,
}

pub(crate) fn enter(script: Script) -> CurrentGuard {
    let previous = CURRENT.with(|slot| slot.replace(Some(script)));
    CurrentGuard { previous }
}

pub(crate) fn get() -> Option<Script> {
    CURRENT.with(|slot| slot.borrow().clone())
}

impl Drop for CurrentGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT.with(|slot| {
            slot.replace(previous);
        });
    }
}

/// Chain a panic hook that records where a script's work panicked, with a
/// backtrace taken before unwinding. The previous hook still runs.
pub(crate) fn install_panic_hook() {
    HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if in_script() {
                let location = info
                    .location()
                    .map(|l| l.to_string())
                    .unwrap_or_else(|| "<unknown>".to_string());
                let trace = format!("panicked at {location}\n{}", Backtrace::force_capture());
                let _ = PANIC_TRACE.try_with(|slot| {
                    if let Ok(mut slot) = slot.try_borrow_mut() {
                        *slot = Some(trace);
                    }
                });
            }
            previous(info);
        }));
    });
}

/// Trace recorded by the hook for the last panic on this thread, if any.
pub(crate) fn take_panic_trace() -> Option<String> {
    PANIC_TRACE
        .try_with(|slot| slot.borrow_mut().take())
        .ok()
        .flatten()
}

fn in_script() -> bool {
    CURRENT
        .try_with(|slot| slot.try_borrow().map(|s| s.is_some()).unwrap_or(false))
        .unwrap_or(false)
}
