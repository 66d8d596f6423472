//! Health daemon configuration file.
//!
//! The file is JSON by default; a path ending in `.toml` is parsed as TOML.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Common name a client certificate must carry to read health data.
pub const DEFAULT_COMMON_NAME: &str = "health.bosh-dns";

/// Root directory under which every job lives.
pub const DEFAULT_JOBS_ROOT: &str = "/var/vcap/jobs";

/// Location of a job's link descriptor, relative to its job directory.
pub const DEFAULT_LINKS_SUBPATH: &str = "bosh/links";

/// Health server configuration as written by the deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Bind IP address of the health endpoint.
    pub address: String,
    pub port: u16,
    pub certificate_file: PathBuf,
    pub private_key_file: PathBuf,
    /// CA bundle used to verify client certificates.
    pub ca_file: PathBuf,
    /// Self-reported state file written by the monitored workload.
    pub health_file_name: PathBuf,
    #[serde(default)]
    pub health_executable_paths: Vec<PathBuf>,
    #[serde(default = "default_interval")]
    pub health_executable_interval: String,
    #[serde(default = "default_timeout")]
    pub health_executable_timeout: String,
    #[serde(default = "default_jobs_root")]
    pub jobs_root: PathBuf,
    #[serde(default = "default_links_subpath")]
    pub links_subpath: PathBuf,
    #[serde(default = "default_common_name")]
    pub expected_common_name: String,
}

fn default_interval() -> String {
    "5s".to_string()
}

fn default_timeout() -> String {
    "10s".to_string()
}

fn default_jobs_root() -> PathBuf {
    PathBuf::from(DEFAULT_JOBS_ROOT)
}

fn default_links_subpath() -> PathBuf {
    PathBuf::from(DEFAULT_LINKS_SUBPATH)
}

fn default_common_name() -> String {
    DEFAULT_COMMON_NAME.to_string()
}

impl HealthConfig {
    /// Parse `path`; a `.toml` extension selects TOML, anything else JSON.
    pub fn from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| CoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let is_toml = path.extension().is_some_and(|ext| ext == "toml");
        let parsed = if is_toml {
            toml::from_str(&content).map_err(|e| e.to_string())
        } else {
            serde_json::from_str(&content).map_err(|e| e.to_string())
        };

        parsed.map_err(|message| CoreError::Parse {
            path: path.to_path_buf(),
            message,
        })
    }

    /// Socket address the health endpoint binds to.
    pub fn socket_addr(&self) -> CoreResult<SocketAddr> {
        let ip: IpAddr = self
            .address
            .parse()
            .map_err(|_| CoreError::InvalidAddress(self.address.clone()))?;
        Ok(SocketAddr::new(ip, self.port))
    }

    /// Pause between aggregation cycles.
    pub fn interval(&self) -> CoreResult<Duration> {
        parse_duration(&self.health_executable_interval)
    }

    /// Wall-clock limit for a single health executable.
    pub fn executable_timeout(&self) -> CoreResult<Duration> {
        parse_duration(&self.health_executable_timeout)
    }
}

/// Parse a duration string like `"500ms"`, `"5s"` or `"2m"`.
///
/// A bare number is read as seconds.
pub fn parse_duration(s: &str) -> CoreResult<Duration> {
    let s = s.trim();
    let invalid = || CoreError::InvalidDuration(s.to_string());

    let (digits, unit): (&str, fn(u64) -> Duration) = if let Some(ms) = s.strip_suffix("ms") {
        (ms, Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        (secs, Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        (mins, |m| Duration::from_secs(m * 60))
    } else {
        (s, Duration::from_secs)
    };

    let value = digits.trim().parse::<u64>().map_err(|_| invalid())?;
    if value == 0 {
        return Err(invalid());
    }
    Ok(unit(value))
}
