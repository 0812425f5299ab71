// src/config/validate.rs

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{Result, ScriptError};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = ScriptError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.host, raw.script))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_scripts(cfg)?;
    validate_host(cfg)?;
    validate_scripts(cfg)?;
    Ok(())
}

fn ensure_has_scripts(cfg: &RawConfigFile) -> Result<()> {
    if cfg.script.is_empty() {
        return Err(ScriptError::ConfigError(
            "config must contain at least one [script.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_host(cfg: &RawConfigFile) -> Result<()> {
    // on_replace and default_mode are validated during deserialization.
    if cfg.host.supervisor_interval_ms == 0 {
        return Err(ScriptError::ConfigError(
            "[host].supervisor_interval_ms must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_scripts(cfg: &RawConfigFile) -> Result<()> {
    for (name, script) in cfg.script.iter() {
        if name.chars().all(char::is_whitespace) {
            return Err(ScriptError::ConfigError(format!(
                "script name '{name}' must contain at least one non-whitespace character"
            )));
        }
        if script.cmd.trim().is_empty() {
            return Err(ScriptError::ConfigError(format!(
                "script '{name}' has an empty `cmd`"
            )));
        }
    }
    Ok(())
}
