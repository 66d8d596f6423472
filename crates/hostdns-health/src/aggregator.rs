//! Health executable monitor: periodically folds the self-reported state,
//! the health-check executables and the job link descriptors into one
//! `AggregatedSnapshot`.
//!
//! Each cycle:
//! 1. read the self-reported state; `overall` starts `true` only when it
//!    reads `running`
//! 2. run every executable in order; a job is healthy only if all of its
//!    executables pass, and every outcome is ANDed into `overall`
//! 3. map each base address from the link descriptors to its job's
//!    verdict, or to `overall` when the job ran no executables
//! 4. publish the snapshot to the `StatusStore`

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use hostdns_core::CmdRunner;

use crate::error::{HealthError, HealthResult};
use crate::jobs::{JobLayout, LinkFile, read_links};
use crate::state_file::read_state_file;
use crate::status::{AggregatedSnapshot, StatusStore};

/// What the monitor checks and how often.
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    /// Health-check executables, run in this order every cycle.
    pub executables: Vec<PathBuf>,
    /// Self-reported state file of the monitored workload.
    pub state_file: PathBuf,
    /// Pause between the end of one cycle and the start of the next.
    pub interval: Duration,
}

/// Runs every health executable each cycle and publishes the combined
/// result to a `StatusStore`.
pub struct HealthExecutableMonitor<R> {
    settings: MonitorSettings,
    runner: R,
    layout: Arc<dyn JobLayout>,
    store: StatusStore,
}

impl<R: CmdRunner + 'static> HealthExecutableMonitor<R> {
    pub fn new(
        settings: MonitorSettings,
        runner: R,
        layout: Arc<dyn JobLayout>,
        store: StatusStore,
    ) -> Self {
        Self {
            settings,
            runner,
            layout,
            store,
        }
    }

    /// Run one cycle now, then keep running cycles in a background task
    /// until `shutdown` changes.
    ///
    /// The store holds a real verdict by the time this returns.
    pub async fn start(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        self.run_checks().await;
        tokio::spawn(self.run(shutdown))
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            executables = ?self.settings.executables,
            interval = ?self.settings.interval,
            "health executable monitor started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            // The sleep is created fresh each iteration, so a slow cycle
            // delays the next one instead of overlapping it.
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                _ = tokio::time::sleep(self.settings.interval) => {
                    if *shutdown.borrow() {
                        break;
                    }
                    self.run_checks().await;
                }
            }
        }

        debug!("health executable monitor stopping");
    }

    /// Run one aggregation cycle and publish its snapshot.
    pub async fn run_checks(&self) -> Arc<AggregatedSnapshot> {
        let mut overall = match read_state_file(&self.settings.state_file).await {
            Ok(health) => {
                if !health.is_running() {
                    debug!(state = %health.state, "self-reported state is not running");
                }
                health.is_running()
            }
            Err(e) => {
                warn!(error = %e, "self-reported state unavailable");
                false
            }
        };

        let mut jobs: HashMap<String, bool> = HashMap::new();

        for executable in &self.settings.executables {
            let succeeded = match self.runner.run(executable, &[]).await {
                Ok(output) if output.success() => true,
                Ok(output) => {
                    debug!(
                        executable = ?executable,
                        exit_status = output.exit_status,
                        "health executable failed"
                    );
                    false
                }
                Err(e) => {
                    error!(executable = ?executable, error = %e, "error executing health executable");
                    false
                }
            };

            if let Some(job) = self.layout.job_for(executable) {
                let job_ok = jobs.entry(job).or_insert(true);
                *job_ok = *job_ok && succeeded;
            }

            overall = overall && succeeded;
        }

        let groups = match self.discover_links().await {
            Ok(files) => link_groups(&files, &jobs, overall).await,
            Err(e) => {
                error!(error = %e, "skipping link groups for this cycle");
                BTreeMap::new()
            }
        };

        debug!(overall, groups = groups.len(), "health executables checked");
        self.store.update(AggregatedSnapshot { overall, groups })
    }

    async fn discover_links(&self) -> HealthResult<Vec<LinkFile>> {
        let layout = Arc::clone(&self.layout);
        tokio::task::spawn_blocking(move || layout.link_files())
            .await
            .map_err(|e| HealthError::Discovery {
                root: PathBuf::new(),
                message: e.to_string(),
            })?
    }
}

/// Base address → verdict. A job that ran executables this cycle lends
/// its own verdict; any other job falls back to `overall`.
async fn link_groups(
    files: &[LinkFile],
    jobs: &HashMap<String, bool>,
    overall: bool,
) -> BTreeMap<String, bool> {
    let mut groups = BTreeMap::new();

    for file in files {
        let links = match read_links(&file.path).await {
            Ok(links) => links,
            Err(e) => {
                warn!(job = %file.job, error = %e, "skipping link descriptor");
                continue;
            }
        };

        let status = jobs.get(&file.job).copied().unwrap_or(overall);
        for link in links {
            groups.insert(link.base_address, status);
        }
    }

    groups
}
