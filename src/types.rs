use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// Emission policy for a script's lifecycle and diagnostic lines.
///
/// - `Normal`: `up` and `end` status lines, no debug lines.
/// - `Debug`: like `Normal`, plus everything passed to `Script::debug`.
/// - `Silent`: no status lines. Failure lines are still written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Normal,
    Debug,
    Silent,
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "normal" => Ok(Mode::Normal),
            "debug" => Ok(Mode::Debug),
            "silent" => Ok(Mode::Silent),
            other => Err(format!(
                "invalid mode: {other} (expected \"normal\", \"debug\" or \"silent\")"
            )),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Mode::Normal => "normal",
            Mode::Debug => "debug",
            Mode::Silent => "silent",
        };
        f.write_str(s)
    }
}

/// What happens to a running script when another one is registered under the
/// same name.
///
/// - `Keep`: the superseded script keeps running, it is only unreachable
///   through the registry (default).
/// - `Cancel`: the superseded script is asked to stop cooperatively. Nobody
///   waits for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplacePolicy {
    #[default]
    Keep,
    Cancel,
}

impl FromStr for ReplacePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "keep" => Ok(ReplacePolicy::Keep),
            "cancel" => Ok(ReplacePolicy::Cancel),
            other => Err(format!(
                "invalid on_replace: {other} (expected \"keep\" or \"cancel\")"
            )),
        }
    }
}

impl fmt::Display for ReplacePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReplacePolicy::Keep => "keep",
            ReplacePolicy::Cancel => "cancel",
        };
        f.write_str(s)
    }
}

/// How `kill` ended for a script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The work observed cancellation and the thread finished within the
    /// grace period.
    Stopped,
    /// The thread was still running when the grace period ran out. It is no
    /// longer tracked and will finish on its own.
    Abandoned,
}
