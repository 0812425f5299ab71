// src/supervisor/mod.rs

//! Background sweep that evicts finished scripts from the registry.
//!
//! Scripts normally deregister themselves when their work ends. The
//! supervisor is the backstop for entries that outlive their thread (e.g. a
//! script that was put back into the registry after it finished). It runs
//! as a Tokio task on a fixed interval until [`SupervisorHandle::stop`] is
//! called or the handle is dropped.

use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::registry::Registry;

/// Remove every entry whose script is no longer alive.
///
/// Returns the evicted names. An entry that was replaced by a live script
/// between the snapshot and the delete is left alone.
pub fn sweep(registry: &Registry) -> Vec<String> {
    let mut evicted = Vec::new();

    registry.each(|name, script, store| {
        if !script.is_alive() && store.remove_if_same(name, script) {
            evicted.push(name.to_string());
        }
    });

    if !evicted.is_empty() {
        debug!(?evicted, "supervisor evicted finished scripts");
    }

    evicted
}

/// Entry point for starting the periodic sweep.
pub struct Supervisor;

impl Supervisor {
    /// Spawn the sweep loop on the current Tokio runtime.
    ///
    /// The first sweep happens one `interval` after start.
    pub fn start(registry: Registry, interval: Duration) -> SupervisorHandle {
        let interval = interval.max(Duration::from_millis(1));
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            info!(interval_ms = interval.as_millis() as u64, "script supervisor started");

            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => {
                        break;
                    }
                    _ = ticker.tick() => {
                        sweep(&registry);
                    }
                }
            }

            info!("script supervisor stopped");
        });

        SupervisorHandle {
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        }
    }
}

/// Owner of a running supervisor loop.
#[derive(Debug)]
pub struct SupervisorHandle {
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl SupervisorHandle {
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the loop and wait for it to exit.
    pub async fn stop(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                debug!(error = %e, "supervisor task ended abnormally");
            }
        }
    }
}

impl Drop for SupervisorHandle {
    fn drop(&mut self) {
        // Dropping the sender wakes the loop with a closed-channel error,
        // which also ends it.
        self.shutdown.take();
    }
}
