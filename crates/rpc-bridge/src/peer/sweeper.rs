//! Liveness sweeper: prunes connections that died without a close event.

use crate::peer::registry::ConnectionRegistry;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

/// Periodic `ConnectionRegistry::sweep()` on a fixed interval.
pub struct LivenessSweeper {
    registry: Arc<ConnectionRegistry>,
    interval: Duration,
}

impl LivenessSweeper {
    pub fn new(registry: Arc<ConnectionRegistry>, interval: Duration) -> Self {
        Self { registry, interval }
    }

    /// Spawn the sweep loop; it stops when `shutdown` flips to true or its
    /// sender is dropped.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    /// Sweep loop. The first tick fires one interval after start.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(interval_ms = self.interval.as_millis(), "Liveness sweeper started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick();
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Liveness sweeper stopped");
    }

    /// One sweep. A panic inside the sweep is logged and swallowed so the
    /// next tick still runs.
    pub fn tick(&self) -> usize {
        match catch_unwind(AssertUnwindSafe(|| self.registry.sweep())) {
            Ok(removed) => {
                debug!(
                    removed = removed,
                    connected = self.registry.count(),
                    "Sweep tick"
                );
                removed
            }
            Err(_) => {
                error!("Sweep tick panicked; continuing with next tick");
                0
            }
        }
    }
}
