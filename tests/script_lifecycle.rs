use std::sync::Arc;
use std::sync::mpsc;
use std::time::Duration;

use norn_scripts::{Mode, Output, Script, ScriptHost};
use norn_scripts_test_utils::builders::fast_host_config;
use norn_scripts_test_utils::init_tracing;
use norn_scripts_test_utils::sinks::{CaptureSink, FailingSink};

fn host_with(sink: &CaptureSink) -> ScriptHost {
    ScriptHost::new(sink.output(), fast_host_config())
}

#[test]
fn silent_script_returns_result_without_status_lines() {
    init_tracing();
    let sink = CaptureSink::new();
    let host = host_with(&sink);

    let script = host
        .create("foo", Mode::Silent, |s| {
            std::thread::sleep(Duration::from_millis(50));
            s.set_result(42_i32);
            Ok(())
        })
        .unwrap();

    assert_eq!(script.wait_as::<i32>(), Some(42));
    assert!(sink.lines().is_empty());
    assert!(!host.running("foo"));
}

#[test]
fn running_until_work_returns() {
    init_tracing();
    let sink = CaptureSink::new();
    let host = host_with(&sink);
    let (release_tx, release_rx) = mpsc::channel::<()>();

    let script = host
        .create("gate", Mode::Normal, move |_| {
            release_rx.recv()?;
            Ok(())
        })
        .unwrap();

    assert!(host.running("gate"));
    assert!(script.is_alive());
    assert_eq!(script.code(), None);

    release_tx.send(()).unwrap();
    script.wait();

    assert!(!host.running("gate"));
    assert!(host.registry().fetch("gate").is_none());
}

#[test]
fn wait_matches_result_observed_afterwards() {
    init_tracing();
    let sink = CaptureSink::new();
    let host = host_with(&sink);

    let script = host
        .create("answer", Mode::Normal, |s| {
            s.set_result("done".to_string());
            Ok(())
        })
        .unwrap();

    let waited = script.wait_as::<String>();
    assert!(!host.running("answer"));
    assert_eq!(waited, script.result_as::<String>());
    assert_eq!(waited.as_deref(), Some("done"));
}

#[test]
fn normal_success_emits_up_and_end_only() {
    init_tracing();
    let sink = CaptureSink::new();
    let host = host_with(&sink);

    let script = host.create("tidy", Mode::Normal, |_| Ok(())).unwrap();
    script.wait();

    assert_eq!(script.code(), Some(0));
    assert!(script.succeeded());
    let lines = sink.lines();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0], "[tidy.up] running");
    assert!(lines[1].starts_with("[tidy.end] status:0 time:"));
    assert!(lines[1].ends_with('s'));
}

#[test]
fn failure_emits_message_then_trace_and_code_one() {
    init_tracing();
    let sink = CaptureSink::new();
    let host = host_with(&sink);

    let script = host
        .create("broken", Mode::Silent, |_| {
            Err(anyhow::anyhow!("disk <full>"))
        })
        .unwrap();
    script.wait();

    assert_eq!(script.code(), Some(1));
    assert!(!script.succeeded());
    let lines = sink.lines_labelled("broken");
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0], "[broken] disk &lt;full>");
    assert!(lines[1].starts_with("[broken] disk &lt;full>"));
}

#[test]
fn failed_script_still_reports_end_status() {
    init_tracing();
    let sink = CaptureSink::new();
    let host = host_with(&sink);

    let script = host
        .create("flaky", Mode::Normal, |_| anyhow::bail!("nope"))
        .unwrap();
    script.wait();

    let end = sink.lines_labelled("flaky.end");
    assert_eq!(end.len(), 1);
    assert!(end[0].starts_with("[flaky.end] status:1 time:"));
}

#[test]
fn failing_sink_never_reaches_the_work() {
    init_tracing();
    let failing = FailingSink::new();
    let console = CaptureSink::new();
    let output = Output::new(Arc::new(console.clone())).with_broadcast(Arc::new(failing.clone()));
    let host = ScriptHost::new(output, fast_host_config());

    let script = host
        .create("chatty", Mode::Normal, |s| {
            s.write(["one", "two"], "log");
            s.set_result(true);
            Ok(())
        })
        .unwrap();

    assert_eq!(script.wait_as::<bool>(), Some(true));
    assert_eq!(script.code(), Some(0));
    assert!(failing.attempts() >= 1);
    // The failure is reported to the console instead.
    assert!(console.contains("sink is closed"));
}

#[test]
fn broadcast_sink_receives_lines_instead_of_console() {
    init_tracing();
    let console = CaptureSink::new();
    let clients = CaptureSink::new();
    let output = Output::new(Arc::new(console.clone())).with_broadcast(Arc::new(clients.clone()));
    let host = ScriptHost::new(output, fast_host_config());

    host.create("cast", Mode::Silent, |s| {
        s.write(["hello"], ());
        Ok(())
    })
    .unwrap()
    .wait();

    assert!(console.lines().is_empty());
    assert_eq!(clients.lines(), vec!["[cast] hello".to_string()]);
}

#[test]
fn current_and_package_are_visible_to_helpers() {
    init_tracing();
    let sink = CaptureSink::new();
    let host = host_with(&sink);

    fn helper() -> Option<String> {
        let me = Script::current()?;
        me.package()
            .and_then(|p| p.downcast_ref::<&'static str>().map(|s| format!("{}:{s}", me.name())))
    }

    let script = host
        .create("pkg", Mode::Silent, |s| {
            s.set_package("cargo");
            s.set_result(helper());
            Ok(())
        })
        .unwrap();

    assert_eq!(
        script.wait_as::<Option<String>>(),
        Some(Some("pkg:cargo".to_string()))
    );
    assert!(host.current().is_none());
}

#[tokio::test]
async fn finished_waits_without_blocking_the_runtime() {
    init_tracing();
    let sink = CaptureSink::new();
    let host = host_with(&sink);

    let script = host
        .create("async", Mode::Silent, |s| {
            s.sleep(Duration::from_millis(30))?;
            s.set_result(7_u8);
            Ok(())
        })
        .unwrap();

    let result = norn_scripts_test_utils::with_timeout(script.finished()).await;
    assert_eq!(result.and_then(|p| p.downcast_ref::<u8>().copied()), Some(7));
}
