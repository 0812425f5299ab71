#![allow(dead_code)]

use std::collections::BTreeMap;
use std::time::Duration;

use norn_scripts::config::{ConfigFile, HostConfig, HostSection, RawConfigFile, ScriptConfig};
use norn_scripts::{Mode, ReplacePolicy};

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                host: HostSection::default(),
                script: BTreeMap::new(),
            },
        }
    }

    pub fn with_script(mut self, name: &str, cmd: &str, mode: Option<Mode>) -> Self {
        self.config.script.insert(
            name.to_string(),
            ScriptConfig {
                cmd: cmd.to_string(),
                mode,
            },
        );
        self
    }

    pub fn supervisor_interval_ms(mut self, ms: u64) -> Self {
        self.config.host.supervisor_interval_ms = ms;
        self
    }

    pub fn kill_grace_ms(mut self, ms: u64) -> Self {
        self.config.host.kill_grace_ms = ms;
        self
    }

    pub fn on_replace(mut self, policy: ReplacePolicy) -> Self {
        self.config.host.on_replace = policy;
        self
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A `HostConfig` with short timings for tests.
pub fn fast_host_config() -> HostConfig {
    HostConfig {
        supervisor_interval: Duration::from_millis(20),
        kill_grace: Duration::from_millis(300),
        on_replace: ReplacePolicy::Keep,
        default_mode: Mode::Normal,
    }
}
