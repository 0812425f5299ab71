// src/exec/command.rs

//! Shell command as script work.

use std::process::Stdio;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::errors::ScriptError;
use crate::script::Script;

/// Build work that runs `cmd` through the platform shell.
///
/// - stdout lines are written through [`Script::write`]
/// - stderr lines go to [`Script::debug`] under the `stderr` label
/// - the exit code becomes the script result (`i32`)
/// - a non-zero exit is a work failure
/// - cancelling the script kills the process and stops reading its output,
///   even when a background child still holds the pipes open
pub fn command_work(cmd: String) -> impl FnOnce(&Script) -> Result<()> + Send + 'static {
    move |script| {
        // Script work runs on its own thread, so it drives its own runtime.
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .with_context(|| format!("building runtime for script '{}'", script.name()))?;
        runtime.block_on(run_command(script, &cmd))
    }
}

async fn run_command(script: &Script, cmd: &str) -> Result<()> {
    info!(script = %script.name(), cmd = %cmd, "starting script process");

    let mut command = shell_command(cmd);
    command
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command
        .spawn()
        .with_context(|| format!("spawning process for script '{}'", script.name()))?;

    let mut readers = attach_readers(script, &mut child);

    let status = tokio::select! {
        status_res = child.wait() => {
            status_res.with_context(|| {
                format!("waiting for process of script '{}'", script.name())
            })?
        }
        _ = script.cancelled() => {
            info!(script = %script.name(), "cancellation requested; killing process");
            if let Err(e) = child.kill().await {
                warn!(script = %script.name(), error = %e, "failed to kill child process on cancellation");
            }
            readers.abort_all();
            return Err(ScriptError::Cancelled(script.name().to_string()).into());
        }
    };

    // A background child may keep the pipes open after the shell exits.
    tokio::select! {
        _ = drain(&mut readers) => {}
        _ = script.cancelled() => {
            info!(script = %script.name(), "cancellation requested while output was still open");
            readers.abort_all();
            return Err(ScriptError::Cancelled(script.name().to_string()).into());
        }
    }

    let code = status.code().unwrap_or(-1);
    info!(
        script = %script.name(),
        exit_code = code,
        success = status.success(),
        "script process exited"
    );
    script.set_result(code);

    if !status.success() {
        anyhow::bail!("command `{cmd}` exited with status {code}");
    }
    Ok(())
}

fn shell_command(cmd: &str) -> Command {
    if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(cmd);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(cmd);
        c
    }
}

fn attach_readers(script: &Script, child: &mut Child) -> JoinSet<()> {
    let mut readers = JoinSet::new();

    if let Some(stdout) = child.stdout.take() {
        let script = script.clone();
        readers.spawn(forward_lines(stdout, move |line| {
            script.write([line], ());
        }));
    }

    // Always consume stderr so the pipe never fills.
    if let Some(stderr) = child.stderr.take() {
        let script = script.clone();
        readers.spawn(forward_lines(stderr, move |line| {
            script.debug(line, "stderr");
        }));
    }

    readers
}

async fn forward_lines<R, F>(source: R, mut on_line: F)
where
    R: AsyncRead + Unpin,
    F: FnMut(String),
{
    let mut lines = BufReader::new(source).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => on_line(line),
            Ok(None) => break,
            Err(e) => {
                debug!(error = %e, "stopped reading process output");
                break;
            }
        }
    }
}

async fn drain(readers: &mut JoinSet<()>) {
    while let Some(joined) = readers.join_next().await {
        if let Err(e) = joined {
            debug!(error = %e, "output reader ended abnormally");
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use parking_lot::Mutex;

    use super::*;
    use crate::config::HostConfig;
    use crate::host::ScriptHost;
    use crate::registry::Registry;
    use crate::script::{Output, Sink};
    use crate::types::{Mode, Termination};

    #[derive(Default)]
    struct Lines(Mutex<Vec<String>>);

    impl Sink for Lines {
        fn write_line(&self, line: &str) -> Result<()> {
            self.0.lock().push(line.to_string());
            Ok(())
        }
    }

    #[test]
    fn forwards_stdout_and_exit_code() {
        let lines = Arc::new(Lines::default());
        let output = Output::new(lines.clone());
        let script = Script::spawn(
            &Registry::new(),
            &output,
            "echo",
            Mode::Silent,
            command_work("echo hello".to_string()),
        )
        .unwrap();

        assert_eq!(script.wait_as::<i32>(), Some(0));
        assert_eq!(script.code(), Some(0));
        assert_eq!(*lines.0.lock(), vec!["[echo] hello".to_string()]);
    }

    #[test]
    fn nonzero_exit_fails_the_script() {
        let script = Script::spawn(
            &Registry::new(),
            &Output::new(Arc::new(Lines::default())),
            "false",
            Mode::Silent,
            command_work("exit 3".to_string()),
        )
        .unwrap();

        assert_eq!(script.wait_as::<i32>(), Some(3));
        assert_eq!(script.code(), Some(1));
    }

    #[test]
    fn cancel_kills_the_process() {
        let script = Script::spawn(
            &Registry::new(),
            &Output::new(Arc::new(Lines::default())),
            "sleeper",
            Mode::Silent,
            command_work("sleep 30".to_string()),
        )
        .unwrap();

        script.cancel();
        assert!(script.wait_timeout(Duration::from_secs(5)));
        assert_eq!(script.code(), Some(1));
    }

    #[test]
    fn kill_stops_a_script_whose_background_child_holds_stdout() {
        let lines = Arc::new(Lines::default());
        let config = HostConfig {
            kill_grace: Duration::from_secs(2),
            ..HostConfig::default()
        };
        let host = ScriptHost::new(Output::new(lines.clone()), config);

        // The shell exits right away; `sleep` keeps the stdout pipe open.
        let script = host
            .create("bg", Mode::Silent, command_work("sleep 4 & echo hi".to_string()))
            .unwrap();
        std::thread::sleep(Duration::from_millis(300));

        assert_eq!(host.kill("bg").unwrap(), Termination::Stopped);
        assert!(script.is_finished());
        assert_eq!(script.code(), Some(1));
        let lines = lines.0.lock();
        assert_eq!(lines[0], "[bg] hi");
        assert_eq!(lines[1], "[bg] cancelled");
    }
}
