// src/config/model.rs

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

use crate::types::{Mode, ReplacePolicy};

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [host]
/// supervisor_interval_ms = 1000
/// kill_grace_ms = 500
/// on_replace = "keep"
/// default_mode = "normal"
///
/// [script.greet]
/// cmd = "echo hello"
/// mode = "debug"
/// ```
///
/// This is the unvalidated form; convert with `ConfigFile::try_from`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub host: HostSection,

    /// All scripts from `[script.<name>]`, keyed by script name.
    #[serde(default)]
    pub script: BTreeMap<String, ScriptConfig>,
}

/// `[host]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct HostSection {
    /// How often the supervisor sweeps the registry.
    #[serde(default = "default_supervisor_interval_ms")]
    pub supervisor_interval_ms: u64,

    /// How long `kill` waits for a script to stop before abandoning it.
    #[serde(default = "default_kill_grace_ms")]
    pub kill_grace_ms: u64,

    /// What to do with a running script that gets replaced by a new one
    /// with the same name.
    #[serde(default)]
    pub on_replace: ReplacePolicy,

    /// Mode for scripts that don't set their own.
    #[serde(default)]
    pub default_mode: Mode,
}

fn default_supervisor_interval_ms() -> u64 {
    1000
}

fn default_kill_grace_ms() -> u64 {
    500
}

impl Default for HostSection {
    fn default() -> Self {
        Self {
            supervisor_interval_ms: default_supervisor_interval_ms(),
            kill_grace_ms: default_kill_grace_ms(),
            on_replace: ReplacePolicy::default(),
            default_mode: Mode::default(),
        }
    }
}

/// `[script.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ScriptConfig {
    /// Shell command the script runs.
    pub cmd: String,

    /// If `None`, `host.default_mode` applies.
    #[serde(default)]
    pub mode: Option<Mode>,
}

impl ScriptConfig {
    pub fn effective_mode(&self, default_mode: Mode) -> Mode {
        self.mode.unwrap_or(default_mode)
    }
}

/// Validated configuration.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub host: HostSection,
    pub script: BTreeMap<String, ScriptConfig>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(host: HostSection, script: BTreeMap<String, ScriptConfig>) -> Self {
        Self { host, script }
    }

    pub fn host_config(&self) -> HostConfig {
        HostConfig::from(&self.host)
    }
}

/// Runtime settings for a `ScriptHost`, with durations already resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostConfig {
    pub supervisor_interval: Duration,
    pub kill_grace: Duration,
    pub on_replace: ReplacePolicy,
    pub default_mode: Mode,
}

impl Default for HostConfig {
    fn default() -> Self {
        HostConfig::from(&HostSection::default())
    }
}

impl From<&HostSection> for HostConfig {
    fn from(section: &HostSection) -> Self {
        Self {
            supervisor_interval: Duration::from_millis(section.supervisor_interval_ms),
            kill_grace: Duration::from_millis(section.kill_grace_ms),
            on_replace: section.on_replace,
            default_mode: section.default_mode,
        }
    }
}
