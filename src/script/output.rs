// src/script/output.rs

//! Output sink abstraction.
//!
//! Scripts never print directly. Every formatted line goes through an
//! [`Output`], which knows about two destinations:
//!
//! - a local console (always present, stdout by default)
//! - an optional broadcast sink (e.g. connected session clients)
//!
//! If a broadcast sink is configured, lines go there *instead of* the
//! console. Tests plug in their own [`Sink`] to capture lines.

use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use tracing::warn;

/// Destination for formatted output lines.
pub trait Sink: Send + Sync {
    fn write_line(&self, line: &str) -> Result<()>;
}

/// Writes lines to the process stdout.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdoutSink;

impl Sink for StdoutSink {
    fn write_line(&self, line: &str) -> Result<()> {
        use std::io::Write;

        let mut out = std::io::stdout().lock();
        writeln!(out, "{line}")?;
        Ok(())
    }
}

/// Routes script output to the console or, when configured, to a broadcast
/// sink.
#[derive(Clone)]
pub struct Output {
    console: Arc<dyn Sink>,
    broadcast: Option<Arc<dyn Sink>>,
}

impl fmt::Debug for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Output")
            .field("broadcast", &self.broadcast.is_some())
            .finish_non_exhaustive()
    }
}

impl Default for Output {
    fn default() -> Self {
        Self::stdout()
    }
}

impl Output {
    pub fn new(console: Arc<dyn Sink>) -> Self {
        Self {
            console,
            broadcast: None,
        }
    }

    /// Console-only output on stdout.
    pub fn stdout() -> Self {
        Self::new(Arc::new(StdoutSink))
    }

    pub fn with_broadcast(mut self, broadcast: Arc<dyn Sink>) -> Self {
        self.broadcast = Some(broadcast);
        self
    }

    /// Deliver one line to the broadcast sink if there is one, otherwise to
    /// the console. Never both.
    pub fn emit(&self, line: &str) -> Result<()> {
        match &self.broadcast {
            Some(broadcast) => broadcast.write_line(line),
            None => self.console.write_line(line),
        }
    }

    /// Best-effort report of a failure that happened while emitting.
    ///
    /// The message and its detail go to the broadcast sink (if any) and to
    /// the console. Errors from either are logged and dropped.
    pub fn report_failure(&self, err: &anyhow::Error) {
        let message = err.to_string();
        let detail = format!("{err:?}");

        if let Some(broadcast) = &self.broadcast {
            for line in [&message, &detail] {
                if let Err(e) = broadcast.write_line(line) {
                    warn!(error = %e, "broadcast sink unreachable while reporting output failure");
                    break;
                }
            }
        }

        for line in [&message, &detail] {
            if let Err(e) = self.console.write_line(line) {
                warn!(error = %e, "console sink failed while reporting output failure");
                break;
            }
        }
    }
}
