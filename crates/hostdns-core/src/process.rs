//! External program execution.
//!
//! `CmdRunner` is the seam between monitors and the operating system.
//! Monitors are generic over it so tests can substitute scripted results.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

/// Captured result of a program that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CmdOutput {
    pub stdout: String,
    pub stderr: String,
    /// Process exit code, or `-1` when the process was killed by a signal.
    pub exit_status: i32,
}

impl CmdOutput {
    /// Exit status zero.
    pub fn success(&self) -> bool {
        self.exit_status == 0
    }
}

/// Errors that prevent a program from producing an exit status.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to run {}: {source}", program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} did not exit within {timeout:?}", program.display())]
    Timeout { program: PathBuf, timeout: Duration },
}

/// Runs an external program and reports how it exited.
pub trait CmdRunner: Send + Sync {
    fn run(
        &self,
        program: &Path,
        args: &[String],
    ) -> impl Future<Output = Result<CmdOutput, ProcessError>> + Send;
}

impl<T: CmdRunner> CmdRunner for Arc<T> {
    fn run(
        &self,
        program: &Path,
        args: &[String],
    ) -> impl Future<Output = Result<CmdOutput, ProcessError>> + Send {
        (**self).run(program, args)
    }
}

/// `CmdRunner` backed by `tokio::process` with a wall-clock limit per run.
///
/// A program still running at the deadline is killed.
#[derive(Debug, Clone)]
pub struct TokioCmdRunner {
    timeout: Duration,
}

impl TokioCmdRunner {
    /// Children still running after `timeout` are killed.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl CmdRunner for TokioCmdRunner {
    async fn run(&self, program: &Path, args: &[String]) -> Result<CmdOutput, ProcessError> {
        let mut command = tokio::process::Command::new(program);
        command.args(args).stdin(Stdio::null()).kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(result) => result.map_err(|source| ProcessError::Spawn {
                program: program.to_path_buf(),
                source,
            })?,
            Err(_) => {
                return Err(ProcessError::Timeout {
                    program: program.to_path_buf(),
                    timeout: self.timeout,
                });
            }
        };

        let exit_status = output.status.code().unwrap_or(-1);
        debug!(program = ?program, exit_status, "program exited");

        Ok(CmdOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_status,
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["-c".to_string(), script.to_string()]
    }

    #[tokio::test]
    async fn captures_exit_status_and_output() {
        let runner = TokioCmdRunner::new(Duration::from_secs(5));
        let shell = Path::new("/bin/sh");

        let out = runner.run(shell, &sh("echo hello")).await.unwrap();
        assert!(out.success());
        assert_eq!(out.stdout.trim(), "hello");

        let out = runner.run(shell, &sh("echo oops >&2; exit 3")).await.unwrap();
        assert!(!out.success());
        assert_eq!(out.exit_status, 3);
        assert_eq!(out.stderr.trim(), "oops");
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let runner = TokioCmdRunner::new(Duration::from_secs(5));
        let err = runner
            .run(Path::new("/nonexistent/health"), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessError::Spawn { .. }));
    }

    #[tokio::test]
    async fn slow_program_times_out() {
        let runner = TokioCmdRunner::new(Duration::from_millis(100));
        let err = runner
            .run(Path::new("/bin/sh"), &sh("sleep 5"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessError::Timeout { .. }));
    }
}
