//! Nameserver-config mode: watch the resolver config and re-apply the
//! primary nameserver on every write and every tick.

use std::future::Future;
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, anyhow};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use hostdns_core::TokioCmdRunner;
use hostdns_nameserver::{CommandDnsManager, ConfigReloadMonitor, FsWatcher};

pub struct NameserverOptions {
    pub bind_address: IpAddr,
    pub watch: PathBuf,
    pub update_command: PathBuf,
    pub update_args: Vec<String>,
    pub tick_interval: Duration,
    pub command_timeout: Duration,
}

pub async fn run_nameserver(opts: NameserverOptions) -> anyhow::Result<()> {
    info!(
        bind_address = %opts.bind_address,
        watch = ?opts.watch,
        "hostdnsd starting in nameserver-config mode"
    );

    let manager = CommandDnsManager::new(
        TokioCmdRunner::new(opts.command_timeout),
        opts.update_command,
        opts.update_args,
        opts.bind_address,
    );

    let (watcher, changes) = FsWatcher::watch(&opts.watch)
        .with_context(|| format!("failed to watch {}", opts.watch.display()))?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let monitor = ConfigReloadMonitor::new(manager, opts.tick_interval, changes);
    let mut monitor_handle = tokio::spawn(monitor.run(shutdown_rx));

    let result = supervise(&mut monitor_handle, crate::shutdown_signal()).await;
    let _ = shutdown_tx.send(true);
    if !monitor_handle.is_finished() {
        let _ = monitor_handle.await;
    }

    // Keeps the watch registered until the loop has stopped.
    drop(watcher);
    info!("nameserver-config mode stopped");

    result
}

/// Waits for the shutdown signal while the reload monitor runs.
///
/// The monitor only returns once shutdown is requested, so finishing first
/// means it panicked or was cancelled and the daemon should exit non-zero.
async fn supervise(
    monitor: &mut JoinHandle<()>,
    signal: impl Future<Output = ()>,
) -> anyhow::Result<()> {
    tokio::select! {
        res = monitor => {
            let reason = match res {
                Ok(()) => "returned".to_string(),
                Err(e) => e.to_string(),
            };
            error!(%reason, "config reload monitor stopped unexpectedly");
            Err(anyhow!("config reload monitor stopped unexpectedly: {reason}"))
        }
        _ = signal => Ok(()),
    }
}
