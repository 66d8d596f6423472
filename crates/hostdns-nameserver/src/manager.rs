//! The reconfiguration collaborator.
//!
//! How the system resolver is rewritten is platform specific and lives
//! outside this crate; the monitor only needs "apply the primary
//! nameserver now".

use std::future::Future;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use tracing::debug;

use hostdns_core::CmdRunner;

/// Points the host resolver at the local DNS server.
pub trait DnsManager: Send + Sync {
    fn set_primary(&self) -> impl Future<Output = anyhow::Result<()>> + Send;
}

impl<T: DnsManager> DnsManager for Arc<T> {
    fn set_primary(&self) -> impl Future<Output = anyhow::Result<()>> + Send {
        (**self).set_primary()
    }
}

/// `DnsManager` that delegates to an external update command, invoked as
/// `<command> <args...> <bind_address>`.
///
/// The command runs once per write to the watched file. It must be
/// idempotent and must leave the file untouched when the nameserver is
/// already in place; a command that always rewrites the file retriggers
/// itself forever.
pub struct CommandDnsManager<R> {
    runner: R,
    command: PathBuf,
    args: Vec<String>,
    bind_address: IpAddr,
}

impl<R: CmdRunner> CommandDnsManager<R> {
    /// `args` go before the bind address on every invocation.
    pub fn new(runner: R, command: PathBuf, args: Vec<String>, bind_address: IpAddr) -> Self {
        Self {
            runner,
            command,
            args,
            bind_address,
        }
    }
}

impl<R: CmdRunner> DnsManager for CommandDnsManager<R> {
    async fn set_primary(&self) -> anyhow::Result<()> {
        let mut args = self.args.clone();
        args.push(self.bind_address.to_string());

        let output = self
            .runner
            .run(&self.command, &args)
            .await
            .with_context(|| format!("running {}", self.command.display()))?;

        if !output.success() {
            bail!(
                "{} exited with status {}: {}",
                self.command.display(),
                output.exit_status,
                output.stderr.trim()
            );
        }

        debug!(bind_address = %self.bind_address, "primary nameserver applied");
        Ok(())
    }
}
