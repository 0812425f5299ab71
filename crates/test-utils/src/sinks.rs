//! Output sinks for tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use norn_scripts::{Output, Sink};
use parking_lot::Mutex;

/// Records every line it receives.
#[derive(Debug, Default, Clone)]
pub struct CaptureSink {
    lines: Arc<Mutex<Vec<String>>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    /// Lines whose bracketed label is exactly `[label]`.
    pub fn lines_labelled(&self, label: &str) -> Vec<String> {
        let prefix = format!("[{label}] ");
        self.lines()
            .into_iter()
            .filter(|l| l.starts_with(&prefix))
            .collect()
    }

    pub fn contains(&self, line: &str) -> bool {
        self.lines.lock().iter().any(|l| l == line)
    }

    /// An `Output` writing only to this sink.
    pub fn output(&self) -> Output {
        Output::new(Arc::new(self.clone()))
    }
}

impl Sink for CaptureSink {
    fn write_line(&self, line: &str) -> anyhow::Result<()> {
        self.lines.lock().push(line.to_string());
        Ok(())
    }
}

/// Fails every write and counts the attempts.
#[derive(Debug, Default, Clone)]
pub struct FailingSink {
    attempts: Arc<AtomicUsize>,
}

impl FailingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl Sink for FailingSink {
    fn write_line(&self, _line: &str) -> anyhow::Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        anyhow::bail!("sink is closed")
    }
}
