// src/host/mod.rs

//! [`ScriptHost`]: the owner of one script subsystem.
//!
//! Bundles a [`Registry`], an [`Output`] and a [`HostConfig`] so callers have
//! a single handle for creating, querying and killing scripts, and for
//! running the supervisor. Nothing here is global; tests build as many
//! hosts as they like.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::config::HostConfig;
use crate::errors::{Result, ScriptError};
use crate::registry::Registry;
use crate::script::{Output, Script};
use crate::supervisor::{Supervisor, SupervisorHandle};
use crate::types::{Mode, Termination};

#[derive(Clone, Debug)]
pub struct ScriptHost {
    registry: Registry,
    output: Output,
    config: HostConfig,
    supervisor: Arc<Mutex<Option<SupervisorHandle>>>,
}

impl ScriptHost {
    pub fn new(output: Output, config: HostConfig) -> Self {
        Self {
            registry: Registry::new(),
            output,
            config,
            supervisor: Arc::new(Mutex::new(None)),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn output(&self) -> &Output {
        &self.output
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    /// Start `work` as a script called `name`.
    pub fn create<F>(&self, name: impl Into<String>, mode: Mode, work: F) -> Result<Script>
    where
        F: FnOnce(&Script) -> anyhow::Result<()> + Send + 'static,
    {
        Script::spawn_with_policy(
            &self.registry,
            &self.output,
            name,
            mode,
            self.config.on_replace,
            work,
        )
    }

    /// [`ScriptHost::create`] using the configured default mode.
    pub fn create_default<F>(&self, name: impl Into<String>, work: F) -> Result<Script>
    where
        F: FnOnce(&Script) -> anyhow::Result<()> + Send + 'static,
    {
        self.create(name, self.config.default_mode, work)
    }

    pub fn running(&self, name: &str) -> bool {
        self.registry.is_running(name)
    }

    /// Every registered script. Registry membership means "believed
    /// alive"; entries the supervisor has not swept yet are included.
    pub fn running_all(&self) -> BTreeMap<String, Script> {
        self.registry.snapshot()
    }

    pub fn fetch(&self, name: &str) -> Result<Script> {
        self.registry.try_fetch(name)
    }

    /// Same as [`ScriptHost::running_all`].
    pub fn fetch_all(&self) -> BTreeMap<String, Script> {
        self.registry.snapshot()
    }

    pub fn current(&self) -> Option<Script> {
        Script::current()
    }

    /// Remove `name` from the registry and stop its script.
    ///
    /// Cancellation is cooperative: the work gets `kill_grace` to notice it.
    /// After that the thread is abandoned rather than forced down. Blocks
    /// for at most the grace period.
    pub fn kill(&self, name: &str) -> Result<Termination> {
        let script = self
            .registry
            .delete(name)
            .ok_or_else(|| ScriptError::NotFound(name.to_string()))?;

        script.cancel();

        if script.wait_timeout(self.config.kill_grace) {
            info!(script = %name, id = script.id(), "script killed");
            Ok(Termination::Stopped)
        } else {
            warn!(
                script = %name,
                id = script.id(),
                grace_ms = self.config.kill_grace.as_millis() as u64,
                "script did not stop within grace period; abandoning it"
            );
            Ok(Termination::Abandoned)
        }
    }

    /// Kill every registered script. Names that vanish concurrently are
    /// skipped.
    pub fn kill_all(&self) -> Vec<(String, Termination)> {
        let names = self.registry.names();
        let scripts: Vec<_> = names
            .into_iter()
            .filter_map(|name| self.registry.delete(&name).map(|s| (name, s)))
            .collect();

        for (_, script) in &scripts {
            script.cancel();
        }

        scripts
            .into_iter()
            .map(|(name, script)| {
                let termination = if script.wait_timeout(self.config.kill_grace) {
                    Termination::Stopped
                } else {
                    Termination::Abandoned
                };
                (name, termination)
            })
            .collect()
    }

    /// Start the supervisor on the current Tokio runtime.
    ///
    /// Returns false if this host's supervisor is already running.
    pub fn start_supervisor(&self) -> bool {
        let mut slot = self.supervisor.lock();
        if slot.as_ref().is_some_and(|h| h.is_running()) {
            return false;
        }
        *slot = Some(Supervisor::start(
            self.registry.clone(),
            self.config.supervisor_interval,
        ));
        true
    }

    pub fn supervisor_running(&self) -> bool {
        self.supervisor
            .lock()
            .as_ref()
            .is_some_and(|h| h.is_running())
    }

    /// Stop the supervisor, if running, and wait for it to exit.
    pub async fn stop_supervisor(&self) {
        let handle = self.supervisor.lock().take();
        if let Some(handle) = handle {
            handle.stop().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn host() -> ScriptHost {
        let config = HostConfig {
            kill_grace: Duration::from_millis(200),
            ..HostConfig::default()
        };
        ScriptHost::new(Output::stdout(), config)
    }

    #[test]
    fn kill_absent_name_is_not_found() {
        let host = host();
        assert!(matches!(host.kill("nobody"), Err(ScriptError::NotFound(_))));
        assert!(host.registry().is_empty());
    }

    #[test]
    fn kill_stops_cooperative_work() {
        let host = host();
        let script = host
            .create("loop", Mode::Silent, |s| loop {
                s.sleep(Duration::from_millis(20))?;
            })
            .unwrap();

        assert!(host.running("loop"));
        assert_eq!(host.kill("loop").unwrap(), Termination::Stopped);
        assert!(!host.running("loop"));
        assert!(script.is_finished());
    }

    #[test]
    fn kill_abandons_uncooperative_work() {
        let host = host();
        let script = host
            .create("stubborn", Mode::Silent, |_| {
                std::thread::sleep(Duration::from_millis(600));
                Ok(())
            })
            .unwrap();

        assert_eq!(host.kill("stubborn").unwrap(), Termination::Abandoned);
        assert!(host.registry().fetch("stubborn").is_none());
        script.wait();
    }

    #[tokio::test]
    async fn supervisor_starts_once() {
        let host = host();
        assert!(host.start_supervisor());
        assert!(!host.start_supervisor());
        host.stop_supervisor().await;
        assert!(!host.supervisor_running());
    }
}
