//! Job layout on disk: which job owns an executable, and where each job's
//! link descriptor lives.
//!
//! ```text
//! <jobs_root>/
//!   <job>/
//!     bin/health          ← executable owned by <job>
//!     <links_subpath>     ← JSON array of {"base_address": ...}
//! ```

use std::path::{Component, Path, PathBuf};

use serde::Deserialize;
use walkdir::WalkDir;

use crate::error::{HealthError, HealthResult};

/// A job's link descriptor file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkFile {
    pub job: String,
    pub path: PathBuf,
}

/// One record of a link descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LinkRecord {
    pub base_address: String,
}

/// Classifies executables into jobs and discovers link descriptors.
pub trait JobLayout: Send + Sync {
    /// Job owning `executable`, or `None` when it lives outside any job.
    fn job_for(&self, executable: &Path) -> Option<String>;

    /// Every link descriptor present, sorted by job name.
    fn link_files(&self) -> HealthResult<Vec<LinkFile>>;
}

/// The conventional layout: one directory per job under a common root.
#[derive(Debug, Clone)]
pub struct JobsRoot {
    root: PathBuf,
    links_subpath: PathBuf,
}

impl JobsRoot {
    /// Link files live at `<root>/<job>/<links_subpath>`.
    pub fn new(root: impl Into<PathBuf>, links_subpath: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            links_subpath: links_subpath.into(),
        }
    }
}

impl JobLayout for JobsRoot {
    fn job_for(&self, executable: &Path) -> Option<String> {
        let relative = executable.strip_prefix(&self.root).ok()?;
        match relative.components().next()? {
            Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
            _ => None,
        }
    }

    fn link_files(&self) -> HealthResult<Vec<LinkFile>> {
        let discovery = |message: String| HealthError::Discovery {
            root: self.root.clone(),
            message,
        };

        match std::fs::metadata(&self.root) {
            // No jobs root means no jobs, not a broken layout.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(discovery(e.to_string())),
            Ok(meta) if !meta.is_dir() => return Err(discovery("not a directory".to_string())),
            Ok(_) => {}
        }

        let mut files = Vec::new();
        let entries = WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name();

        for entry in entries {
            let entry = entry.map_err(|e| discovery(e.to_string()))?;
            let candidate = entry.path().join(&self.links_subpath);
            if candidate.is_file() {
                files.push(LinkFile {
                    job: entry.file_name().to_string_lossy().into_owned(),
                    path: candidate,
                });
            }
        }

        Ok(files)
    }
}

/// Read and parse a link descriptor.
pub async fn read_links(path: &Path) -> HealthResult<Vec<LinkRecord>> {
    let raw = tokio::fs::read(path)
        .await
        .map_err(|source| HealthError::LinkRead {
            path: path.to_path_buf(),
            source,
        })?;

    serde_json::from_slice(&raw).map_err(|source| HealthError::LinkParse {
        path: path.to_path_buf(),
        source,
    })
}
