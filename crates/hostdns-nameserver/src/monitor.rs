//! Reload loop for the resolver configuration.
//!
//! Each write to the watched file and each tick re-applies the primary
//! nameserver. Failures are logged and the loop keeps going; only shutdown
//! or a closed change stream ends it.

use std::time::Duration;

use anyhow::Context;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::manager::DnsManager;
use crate::watcher::ChangeStream;

/// Re-applies the primary nameserver on file writes and on a fixed tick.
pub struct ConfigReloadMonitor<M> {
    manager: M,
    tick_interval: Duration,
    changes: ChangeStream,
}

impl<M: DnsManager> ConfigReloadMonitor<M> {
    /// The first tick fires one `tick_interval` after `run` starts.
    pub fn new(manager: M, tick_interval: Duration, changes: ChangeStream) -> Self {
        Self {
            manager,
            tick_interval,
            changes,
        }
    }

    /// Apply the primary nameserver once.
    pub async fn run_once(&self) -> anyhow::Result<()> {
        self.manager
            .set_primary()
            .await
            .context("updating nameserver configs")
    }

    async fn reload(&self, trigger: &'static str) {
        debug!(trigger, "re-applying primary nameserver");
        if let Err(e) = self.run_once().await {
            error!(trigger, error = %format!("{e:#}"), "nameserver reconfiguration failed");
        }
    }

    /// Run until shutdown or until the change stream closes.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let period = self.tick_interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(interval_ms = period.as_millis() as u64, "config reload monitor started");

        loop {
            tokio::select! {
                biased;

                _ = shutdown.changed() => {
                    info!("config reload monitor shutting down");
                    return;
                }

                event = self.changes.events.recv() => match event {
                    Some(event) if event.kind.is_write() => {
                        debug!(path = ?event.path, kind = ?event.kind, "config file changed");
                        self.reload("file").await;
                    }
                    Some(event) => {
                        debug!(path = ?event.path, kind = ?event.kind, "ignoring change");
                    }
                    None => {
                        info!("change events closed, stopping config reload monitor");
                        return;
                    }
                },

                err = self.changes.errors.recv() => match err {
                    Some(e) => error!(error = %e, "config file watcher error"),
                    None => {
                        info!("watcher errors closed, stopping config reload monitor");
                        return;
                    }
                },

                _ = ticker.tick() => {
                    self.reload("tick").await;
                }
            }
        }
    }
}
