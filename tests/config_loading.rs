use std::io::Write;

use tempfile::NamedTempFile;

use norn_scripts::cli::CliArgs;
use norn_scripts::config::load_and_validate;
use norn_scripts::{Mode, ReplacePolicy, RunSummary, ScriptError};
use norn_scripts_test_utils::builders::ConfigFileBuilder;
use norn_scripts_test_utils::init_tracing;

fn config_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{contents}").unwrap();
    file
}

#[test]
fn loads_host_section_and_scripts() {
    let file = config_file(
        r#"
[host]
supervisor_interval_ms = 250
kill_grace_ms = 100
on_replace = "cancel"
default_mode = "silent"

[script.build]
cmd = "echo build"

[script.watch]
cmd = "echo watch"
mode = "debug"
"#,
    );

    let cfg = load_and_validate(file.path()).unwrap();
    let host = cfg.host_config();

    assert_eq!(host.supervisor_interval.as_millis(), 250);
    assert_eq!(host.kill_grace.as_millis(), 100);
    assert_eq!(host.on_replace, ReplacePolicy::Cancel);
    assert_eq!(cfg.script["build"].effective_mode(host.default_mode), Mode::Silent);
    assert_eq!(cfg.script["watch"].effective_mode(host.default_mode), Mode::Debug);
}

#[test]
fn config_without_scripts_is_rejected() {
    let file = config_file("[host]\nkill_grace_ms = 10\n");

    match load_and_validate(file.path()) {
        Err(ScriptError::ConfigError(msg)) => assert!(msg.contains("at least one")),
        other => panic!("expected ConfigError, got {other:?}"),
    }
}

#[test]
fn builder_produces_validated_config() {
    let cfg = ConfigFileBuilder::new()
        .with_script("a", "echo a", None)
        .kill_grace_ms(42)
        .build();
    assert_eq!(cfg.host.kill_grace_ms, 42);
}

#[tokio::test]
async fn dry_run_starts_nothing() {
    init_tracing();
    let file = config_file("[script.a]\ncmd = \"exit 1\"\n");
    let args = CliArgs {
        config: file.path().to_path_buf(),
        log_level: None,
        dry_run: true,
    };

    let summary = norn_scripts::run(args).await.unwrap();
    assert_eq!(summary, RunSummary::default());
}

#[cfg(unix)]
#[tokio::test]
async fn run_counts_successes_and_failures() {
    init_tracing();
    let file = config_file(
        r#"
[host]
supervisor_interval_ms = 20

[script.good]
cmd = "echo ok"
mode = "silent"

[script.bad]
cmd = "exit 4"
mode = "silent"
"#,
    );
    let args = CliArgs {
        config: file.path().to_path_buf(),
        log_level: None,
        dry_run: false,
    };

    let summary = norn_scripts::run(args).await.unwrap();
    assert_eq!(summary, RunSummary { succeeded: 1, failed: 1 });
}
