use std::time::Duration;

use norn_scripts::supervisor::sweep;
use norn_scripts::{Mode, Registry, Script, Supervisor};
use norn_scripts_test_utils::sinks::CaptureSink;
use norn_scripts_test_utils::{init_tracing, with_timeout};

/// A finished script that is still listed in the registry, as if its own
/// deregistration never happened.
fn stale_entry(registry: &Registry, name: &str) -> Script {
    let script = Script::spawn(registry, &CaptureSink::new().output(), name, Mode::Silent, |_| Ok(()))
        .unwrap();
    script.wait();
    registry.put(name, script.clone());
    script
}

#[tokio::test]
async fn stale_entries_are_evicted_within_a_tick() {
    init_tracing();
    let registry = Registry::new();
    let interval = Duration::from_millis(20);
    let supervisor = Supervisor::start(registry.clone(), interval);

    stale_entry(&registry, "ghost");
    assert!(registry.fetch("ghost").is_some());
    assert!(!registry.is_running("ghost"));

    with_timeout(async {
        while registry.fetch("ghost").is_some() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;

    supervisor.stop().await;
}

#[tokio::test]
async fn stopped_supervisor_no_longer_sweeps() {
    init_tracing();
    let registry = Registry::new();
    let supervisor = Supervisor::start(registry.clone(), Duration::from_millis(10));
    with_timeout(supervisor.stop()).await;

    stale_entry(&registry, "leftover");
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(registry.fetch("leftover").is_some());
    assert_eq!(sweep(&registry), vec!["leftover".to_string()]);
    assert!(registry.is_empty());
}

#[test]
fn sweep_tolerates_entries_already_removed() {
    init_tracing();
    let registry = Registry::new();
    let script = stale_entry(&registry, "twice");

    registry.delete("twice");
    assert!(sweep(&registry).is_empty());
    assert!(!registry.remove_if_same("twice", &script));
}
