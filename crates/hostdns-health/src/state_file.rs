//! Self-reported state file written by the monitored workload.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{HealthError, HealthResult};

/// The only self-reported state considered healthy.
pub const RUNNING: &str = "running";

/// Contents of the self-reported state file: `{"state": "<string>"}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelfReportedState {
    #[serde(default)]
    pub state: String,
}

impl SelfReportedState {
    /// Whether the reported state is exactly `running`.
    pub fn is_running(&self) -> bool {
        self.state == RUNNING
    }
}

/// Read and parse the state file. Never cached; every call hits the disk.
pub async fn read_state_file(path: &Path) -> HealthResult<SelfReportedState> {
    let raw = tokio::fs::read(path)
        .await
        .map_err(|source| HealthError::StateFileRead {
            path: path.to_path_buf(),
            source,
        })?;

    serde_json::from_slice(&raw).map_err(|source| HealthError::StateFileParse {
        path: path.to_path_buf(),
        source,
    })
}
