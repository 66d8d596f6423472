//! hostdns-health: aggregated health for the host DNS agent.
//!
//! Runs the configured health-check executables on an interval, folds
//! their outcomes into per-job and per-link-group verdicts, and serves
//! the latest verdict over a mutually-authenticated TLS endpoint.
//!
//! # Architecture
//!
//! ```text
//! HealthExecutableMonitor (background task)
//!   ├── read_state_file()      → self-reported state
//!   ├── CmdRunner::run()       → per-executable outcome → job status
//!   ├── JobLayout::link_files() → base address → group status
//!   └── StatusStore::update()  → AggregatedSnapshot
//!
//! HealthServer (task per TLS connection)
//!   ├── client certificate common name check
//!   ├── read_state_file()
//!   └── StatusStore::status()  → JSON health document
//! ```

pub mod aggregator;
pub mod error;
pub mod jobs;
pub mod server;
pub mod state_file;
pub mod status;
pub mod tls;

pub use aggregator::{HealthExecutableMonitor, MonitorSettings};
pub use error::{HealthError, HealthResult};
pub use jobs::{JobLayout, JobsRoot, LinkFile, LinkRecord};
pub use server::{FAILURE_STATE, HealthResponse, HealthServer, ServerSettings};
pub use state_file::{RUNNING, SelfReportedState, read_state_file};
pub use status::{AggregatedSnapshot, HealthStatus, StatusStore};
