// src/script/handle.rs

//! The [`Script`] handle and its lifecycle.
//!
//! A script moves through `created -> running -> succeeded | failed ->
//! deregistered`, all on its own OS thread:
//!
//! 1. unless silent, write `running` labelled `up`
//! 2. run the work, catching both `Err` returns and panics
//! 3. set `code` (0 on success, 1 on failure) and write failure lines
//! 4. unless silent, write `status:<code> time:<uptime>s` labelled `end`
//! 5. remove itself from the registry (only if the entry is still this
//!    instance)
//! 6. signal completion to anyone blocked in [`Script::wait`]
//!
//! Cancellation is cooperative: [`Script::cancel`] raises a flag that the
//! work observes through [`Script::checkpoint`], [`Script::sleep`] or
//! [`Script::is_cancelled`].

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tokio::sync::{oneshot, watch};
use tracing::{debug, info, warn};

use crate::errors::{Result, ScriptError};
use crate::registry::{Registry, WeakRegistry};
use crate::types::{Mode, ReplacePolicy};

use super::current;
use super::label::{Label, format_line};
use super::output::Output;

/// Opaque value a script hands back (`result`) or carries (`package`).
pub type Payload = Arc<dyn Any + Send + Sync>;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Handle to a running (or finished) script. Clones share the same script.
#[derive(Clone)]
pub struct Script {
    inner: Arc<Inner>,
}

struct Inner {
    id: u64,
    name: String,
    mode: Mode,
    started: Instant,
    registry: WeakRegistry,
    output: Output,
    state: Mutex<State>,
    changed: Condvar,
    cancel_signal: watch::Sender<bool>,
}

#[derive(Default)]
struct State {
    code: Option<i32>,
    succeeded: bool,
    finished: bool,
    cancel_requested: bool,
    result: Option<Payload>,
    package: Option<Payload>,
}

/// Message and trace of a failed work function.
struct Failure {
    message: String,
    trace: String,
    cancelled: bool,
}

impl Failure {
    fn from_error(err: anyhow::Error) -> Self {
        Self {
            cancelled: ScriptError::is_cancellation(&err),
            message: err.to_string(),
            trace: format!("{err:?}"),
        }
    }

    fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "script work panicked".to_string()
        };
        let trace = current::take_panic_trace()
            .unwrap_or_else(|| format!("panicked with no trace recorded: {message}"));
        Self {
            message,
            trace,
            cancelled: false,
        }
    }
}

impl Script {
    /// Start `work` on a new thread under `name` and register it.
    ///
    /// An existing entry with the same name is replaced; the old script keeps
    /// running.
    pub fn spawn<F>(
        registry: &Registry,
        output: &Output,
        name: impl Into<String>,
        mode: Mode,
        work: F,
    ) -> Result<Script>
    where
        F: FnOnce(&Script) -> anyhow::Result<()> + Send + 'static,
    {
        Self::spawn_with_policy(registry, output, name, mode, ReplacePolicy::Keep, work)
    }

    pub(crate) fn spawn_with_policy<F>(
        registry: &Registry,
        output: &Output,
        name: impl Into<String>,
        mode: Mode,
        on_replace: ReplacePolicy,
        work: F,
    ) -> Result<Script>
    where
        F: FnOnce(&Script) -> anyhow::Result<()> + Send + 'static,
    {
        current::install_panic_hook();

        let name = name.into();
        let script = Script {
            inner: Arc::new(Inner {
                id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
                name: name.clone(),
                mode,
                started: Instant::now(),
                registry: registry.downgrade(),
                output: output.clone(),
                state: Mutex::new(State::default()),
                changed: Condvar::new(),
                cancel_signal: watch::channel(false).0,
            }),
        };

        // The thread waits for this gate so it cannot deregister itself
        // before it has been registered.
        let (go_tx, go_rx) = oneshot::channel::<()>();
        let runner = script.clone();

        thread::Builder::new()
            .name(format!("script:{name}"))
            .spawn(move || {
                let _ = go_rx.blocking_recv();
                runner.run(work);
            })
            .map_err(|source| ScriptError::Spawn {
                name: name.clone(),
                source,
            })?;

        if let Some(previous) = registry.put(name.clone(), script.clone()) {
            if on_replace == ReplacePolicy::Cancel && previous.is_alive() {
                info!(
                    script = %name,
                    superseded_id = previous.id(),
                    "superseded script asked to stop"
                );
                previous.cancel();
            }
        }

        let _ = go_tx.send(());
        Ok(script)
    }

    /// The script owning the calling thread, if any.
    pub fn current() -> Option<Script> {
        current::get()
    }

    fn run<F>(&self, work: F)
    where
        F: FnOnce(&Script) -> anyhow::Result<()>,
    {
        let _current = current::enter(self.clone());
        let _finished = FinishGuard(self);

        info!(script = %self.name(), id = self.id(), mode = %self.mode(), "script started");

        if !self.is_silent() {
            self.write(["running"], "up");
        }

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| work(self)));

        match outcome {
            Ok(Ok(())) => self.mark_succeeded(),
            Ok(Err(err)) => self.mark_failed(Failure::from_error(err)),
            Err(payload) => self.mark_failed(Failure::from_panic(payload)),
        }

        let code = self.code().unwrap_or(1);
        if !self.is_silent() {
            let status = format!(
                "status:{code} time:{:.1}s",
                self.uptime().as_secs_f64()
            );
            self.write([status], "end");
        }

        if let Some(registry) = self.inner.registry.upgrade() {
            if !registry.remove_if_same(self.name(), self) {
                debug!(script = %self.name(), "entry already gone or replaced; nothing to deregister");
            }
        }

        info!(
            script = %self.name(),
            id = self.id(),
            code,
            uptime_ms = self.uptime().as_millis() as u64,
            "script finished"
        );
    }

    fn mark_succeeded(&self) {
        let mut state = self.inner.state.lock();
        if state.code.is_none() {
            state.code = Some(0);
        }
        state.succeeded = true;
    }

    fn mark_failed(&self, failure: Failure) {
        {
            let mut state = self.inner.state.lock();
            if state.code.is_none() {
                state.code = Some(1);
            }
        }

        if failure.cancelled {
            info!(script = %self.name(), "script work stopped after cancellation");
            self.write(["cancelled"], ());
        } else {
            warn!(script = %self.name(), error = %failure.message, "script work failed");
            self.write([failure.message, failure.trace], ());
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn mode(&self) -> Mode {
        self.inner.mode
    }

    pub fn is_debug(&self) -> bool {
        self.inner.mode == Mode::Debug
    }

    pub fn is_silent(&self) -> bool {
        self.inner.mode == Mode::Silent
    }

    /// True if both handles point at the same script instance.
    pub fn same_as(&self, other: &Script) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// `0` after normal completion, `1` after a failure, `None` while running.
    pub fn code(&self) -> Option<i32> {
        self.inner.state.lock().code
    }

    /// True once the work has returned `Ok`. Has no side effects.
    pub fn succeeded(&self) -> bool {
        self.inner.state.lock().succeeded
    }

    /// True until the script's thread has finished its run.
    pub fn is_alive(&self) -> bool {
        !self.inner.state.lock().finished
    }

    pub fn is_finished(&self) -> bool {
        !self.is_alive()
    }

    /// Time since the script was created. Recomputed on each call.
    pub fn uptime(&self) -> Duration {
        self.inner.started.elapsed()
    }

    pub fn set_result<T: Any + Send + Sync>(&self, value: T) {
        self.inner.state.lock().result = Some(Arc::new(value));
    }

    pub fn result(&self) -> Option<Payload> {
        self.inner.state.lock().result.clone()
    }

    /// The result downcast to `T`, if one is set and has that type.
    pub fn result_as<T: Any + Clone>(&self) -> Option<T> {
        self.result()
            .and_then(|payload| payload.downcast_ref::<T>().cloned())
    }

    pub fn set_package<T: Any + Send + Sync>(&self, value: T) {
        self.inner.state.lock().package = Some(Arc::new(value));
    }

    pub fn package(&self) -> Option<Payload> {
        self.inner.state.lock().package.clone()
    }

    /// Block until the script has finished and return its result.
    ///
    /// By the time this returns the script has already removed itself from
    /// the registry.
    pub fn wait(&self) -> Option<Payload> {
        let mut state = self.inner.state.lock();
        while !state.finished {
            self.inner.changed.wait(&mut state);
        }
        state.result.clone()
    }

    /// [`Script::wait`] followed by a downcast of the result.
    pub fn wait_as<T: Any + Clone>(&self) -> Option<T> {
        self.wait()
            .and_then(|payload| payload.downcast_ref::<T>().cloned())
    }

    /// Wait at most `timeout`. Returns true if the script finished in time.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.inner.state.lock();
        while !state.finished {
            if self.inner.changed.wait_until(&mut state, deadline).timed_out() {
                return state.finished;
            }
        }
        true
    }

    /// Async variant of [`Script::wait`]; blocks a pool thread, not the
    /// executor.
    pub async fn finished(&self) -> Option<Payload> {
        let script = self.clone();
        match tokio::task::spawn_blocking(move || script.wait()).await {
            Ok(result) => result,
            Err(e) => {
                warn!(script = %self.name(), error = %e, "waiting for script failed");
                None
            }
        }
    }

    /// Ask the work to stop. Returns immediately.
    pub fn cancel(&self) {
        let mut state = self.inner.state.lock();
        if !state.cancel_requested {
            debug!(script = %self.name(), "cancellation requested");
        }
        state.cancel_requested = true;
        self.inner.changed.notify_all();
        self.inner.cancel_signal.send_replace(true);
    }

    /// Resolves once cancellation has been requested. For work that drives
    /// its own async runtime.
    pub async fn cancelled(&self) {
        let mut rx = self.inner.cancel_signal.subscribe();
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.state.lock().cancel_requested
    }

    /// `Err(Cancelled)` once cancellation has been requested.
    pub fn checkpoint(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(ScriptError::Cancelled(self.name().to_string()));
        }
        Ok(())
    }

    /// Sleep for `duration`, waking early with `Err(Cancelled)` if the script
    /// is cancelled meanwhile.
    pub fn sleep(&self, duration: Duration) -> Result<()> {
        let deadline = Instant::now() + duration;
        let mut state = self.inner.state.lock();
        while !state.cancel_requested {
            if self.inner.changed.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        if state.cancel_requested {
            return Err(ScriptError::Cancelled(self.name().to_string()));
        }
        Ok(())
    }

    /// Format a line as `[name.label] text` with `<` and `>&` escaped.
    pub fn view(&self, text: &str, label: impl Into<Label>) -> String {
        format_line(self.name(), label.into(), text)
    }

    /// Write each message through the output sink.
    ///
    /// Never fails and never panics: sink errors are reported best-effort
    /// and the remaining messages are dropped.
    pub fn write<I>(&self, messages: I, label: impl Into<Label>) -> &Self
    where
        I: IntoIterator,
        I::Item: fmt::Display,
    {
        let label = label.into();
        for message in messages {
            let line = self.view(&message.to_string(), label.clone());
            if let Err(err) = self.emit(&line) {
                warn!(script = %self.name(), error = %err, "failed to write script output");
                let output = &self.inner.output;
                let _ = panic::catch_unwind(AssertUnwindSafe(|| output.report_failure(&err)));
                break;
            }
        }
        self
    }

    /// Write `message` with a `debug` label prefix, only in debug mode.
    pub fn debug(&self, message: impl fmt::Display, label: impl Into<Label>) -> &Self {
        if !self.is_debug() {
            return self;
        }
        self.write([message], label.into().prefixed("debug"))
    }

    fn emit(&self, line: &str) -> anyhow::Result<()> {
        let output = &self.inner.output;
        match panic::catch_unwind(AssertUnwindSafe(|| output.emit(line))) {
            Ok(result) => result,
            Err(_) => Err(anyhow::anyhow!("output sink panicked")),
        }
    }
}

/// Marks the script finished and wakes waiters, even if the run unwinds.
struct FinishGuard<'a>(&'a Script);

impl Drop for FinishGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.0.inner.state.lock();
        if state.code.is_none() {
            state.code = Some(1);
        }
        state.finished = true;
        self.0.inner.changed.notify_all();
    }
}

impl fmt::Display for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<Script:{} @uptime={:.1}s>",
            self.name(),
            self.uptime().as_secs_f64()
        )
    }
}

impl fmt::Debug for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Script")
            .field("id", &self.id())
            .field("name", &self.name())
            .field("mode", &self.mode())
            .field("code", &self.code())
            .field("alive", &self.is_alive())
            .finish()
    }
}
