//! hostdns-core: shared building blocks for the hostdns agent.
//!
//! - **`config`**: health daemon configuration file and duration strings
//! - **`process`**: `CmdRunner` seam for running external programs
//! - **`error`**: configuration error type

pub mod config;
pub mod error;
pub mod process;

pub use config::{HealthConfig, parse_duration};
pub use error::{CoreError, CoreResult};
pub use process::{CmdOutput, CmdRunner, ProcessError, TokioCmdRunner};
