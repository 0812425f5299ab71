// src/lib.rs

pub mod cli;
pub mod config;
pub mod errors;
pub mod exec;
pub mod host;
pub mod logging;
pub mod registry;
pub mod script;
pub mod supervisor;
pub mod types;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::{ConfigFile, load_and_validate};
use crate::exec::command_work;

pub use crate::config::HostConfig;
pub use crate::errors::ScriptError;
pub use crate::host::ScriptHost;
pub use crate::registry::Registry;
pub use crate::script::{Label, Output, Payload, Script, Sink};
pub use crate::supervisor::{Supervisor, SupervisorHandle};
pub use crate::types::{Mode, ReplacePolicy, Termination};

/// How the configured scripts ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub succeeded: usize,
    pub failed: usize,
}

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - a host with stdout output and its supervisor
/// - one script per `[script.<name>]`
/// - Ctrl-C handling (kills every running script)
pub async fn run(args: CliArgs) -> Result<RunSummary> {
    let cfg = load_and_validate(&args.config)?;

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(RunSummary::default());
    }

    let host = ScriptHost::new(Output::stdout(), cfg.host_config());
    host.start_supervisor();

    let mut scripts = Vec::with_capacity(cfg.script.len());
    for (name, script_cfg) in cfg.script.iter() {
        let mode = script_cfg.effective_mode(cfg.host.default_mode);
        let script = host.create(name.clone(), mode, command_work(script_cfg.cmd.clone()))?;
        scripts.push(script);
    }
    info!(count = scripts.len(), "scripts started");

    // Ctrl-C -> kill everything still registered.
    let interrupt = {
        let host = host.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl+C");
                return;
            }
            info!("interrupt received; killing scripts");
            let killed = tokio::task::spawn_blocking(move || host.kill_all()).await;
            debug!(?killed, "kill_all finished");
        })
    };

    let mut summary = RunSummary::default();
    for script in scripts {
        script.finished().await;
        if script.succeeded() {
            summary.succeeded += 1;
        } else {
            summary.failed += 1;
        }
    }

    interrupt.abort();
    host.stop_supervisor().await;

    info!(
        succeeded = summary.succeeded,
        failed = summary.failed,
        "all scripts finished"
    );
    Ok(summary)
}

/// Simple dry-run output: print host settings and scripts.
fn print_dry_run(cfg: &ConfigFile) {
    println!("norn-scripts dry-run");
    println!(
        "  host.supervisor_interval_ms = {}",
        cfg.host.supervisor_interval_ms
    );
    println!("  host.kill_grace_ms = {}", cfg.host.kill_grace_ms);
    println!("  host.on_replace = {}", cfg.host.on_replace);
    println!("  host.default_mode = {}", cfg.host.default_mode);
    println!();

    println!("scripts ({}):", cfg.script.len());
    for (name, script) in cfg.script.iter() {
        println!("  - {name}");
        println!("      cmd: {}", script.cmd);
        println!("      mode: {}", script.effective_mode(cfg.host.default_mode));
    }

    debug!("dry-run complete (no execution)");
}
