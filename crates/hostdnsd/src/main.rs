//! hostdnsd: the host DNS agent daemon.
//!
//! One binary, two long-running modes:
//! - `health`: aggregates health executables and serves `/health` over mTLS
//! - `nameserver-config`: keeps the host resolver pointed at the local DNS server
//!
//! # Usage
//!
//! ```text
//! hostdnsd health --config /var/vcap/jobs/bosh-dns/config/health_server_config.json
//! hostdnsd nameserver-config --bind-address 169.254.0.2 \
//!     --watch /etc/resolv.conf --update-command /var/vcap/jobs/bosh-dns/bin/set-nameserver
//! ```

mod health_mode;
mod nameserver_mode;

use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use hostdns_core::parse_duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "info,hostdnsd=debug,hostdns_health=debug,hostdns_nameserver=debug";

#[derive(Parser)]
#[command(name = "hostdnsd", about = "Host DNS agent daemon")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the health aggregator and the mTLS health endpoint.
    Health {
        /// Health server configuration file (JSON, or TOML for `.toml`).
        #[arg(long)]
        config: PathBuf,
    },

    /// Re-apply the primary nameserver whenever the resolver config changes.
    NameserverConfig {
        /// Address the local DNS server is bound to.
        #[arg(long)]
        bind_address: IpAddr,

        /// Resolver configuration file to watch.
        #[arg(long)]
        watch: PathBuf,

        /// Program that points the resolver at the bind address. Runs on every
        /// write to the watched file, so it must not rewrite the file when the
        /// nameserver is already in place.
        #[arg(long)]
        update_command: PathBuf,

        /// Extra argument for the update command, placed before the address.
        #[arg(long = "update-arg", allow_hyphen_values = true)]
        update_args: Vec<String>,

        /// Fallback re-apply interval.
        #[arg(long, default_value = "3s", value_parser = parse_duration)]
        tick_interval: Duration,

        /// Wall-clock limit for one run of the update command.
        #[arg(long, default_value = "10s", value_parser = parse_duration)]
        command_timeout: Duration,
    },
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Command::Health { config } => health_mode::run_health(config).await,
        Command::NameserverConfig {
            bind_address,
            watch,
            update_command,
            update_args,
            tick_interval,
            command_timeout,
        } => {
            nameserver_mode::run_nameserver(nameserver_mode::NameserverOptions {
                bind_address,
                watch,
                update_command,
                update_args,
                tick_interval,
                command_timeout,
            })
            .await
        }
    }
}

/// Resolves on SIGTERM or Ctrl-C.
pub(crate) async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = sigterm.recv() => {}
                    _ = tokio::signal::ctrl_c() => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    info!("shutdown signal received");
}
