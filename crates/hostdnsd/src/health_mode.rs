//! Health mode: aggregator loop plus the mTLS status endpoint.
//!
//! 1. Load and validate the configuration file
//! 2. Load TLS material and bind the listener
//! 3. Run the first aggregation pass, then start the periodic loop
//! 4. Serve `/health` until the listener fails or a shutdown signal arrives
//! 5. Stop the aggregator and wait for it

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tracing::info;

use hostdns_core::{HealthConfig, TokioCmdRunner};
use hostdns_health::{
    HealthExecutableMonitor, HealthServer, JobsRoot, MonitorSettings, ServerSettings, StatusStore,
};

pub async fn run_health(config_path: PathBuf) -> anyhow::Result<()> {
    let config = HealthConfig::from_file(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    let bind = config.socket_addr()?;
    let interval = config.interval()?;
    let timeout = config.executable_timeout()?;

    info!(
        %bind,
        executables = config.health_executable_paths.len(),
        interval_ms = interval.as_millis() as u64,
        "hostdnsd starting in health mode"
    );

    // ── Listener ─────────────────────────────────────────────────
    let settings = ServerSettings {
        bind,
        certificate_file: config.certificate_file.clone(),
        private_key_file: config.private_key_file.clone(),
        ca_file: config.ca_file.clone(),
    };
    let (listener, tls) = HealthServer::bind(&settings)
        .await
        .context("starting health server")?;

    // ── Aggregator ───────────────────────────────────────────────
    let store = StatusStore::new();
    let monitor = HealthExecutableMonitor::new(
        MonitorSettings {
            executables: config.health_executable_paths.clone(),
            state_file: config.health_file_name.clone(),
            interval,
        },
        TokioCmdRunner::new(timeout),
        Arc::new(JobsRoot::new(
            config.jobs_root.clone(),
            config.links_subpath.clone(),
        )),
        store.clone(),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let monitor_handle = monitor.start(shutdown_rx).await;

    // ── Status endpoint ──────────────────────────────────────────
    let server = HealthServer::new(
        config.health_file_name.clone(),
        Arc::new(store),
        config.expected_common_name.clone(),
    );

    let result = tokio::select! {
        res = server.serve_listener(listener, tls) => res.context("health server stopped"),
        _ = crate::shutdown_signal() => Ok(()),
    };

    let _ = shutdown_tx.send(true);
    let _ = monitor_handle.await;
    info!("health mode stopped");

    result
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    use std::os::unix::fs::PermissionsExt;

    #[tokio::test]
    async fn bad_tls_material_fails_before_any_executable_runs() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("ran");
        let exe = dir.path().join("check");
        std::fs::write(
            &exe,
            format!("#!/bin/sh\ntouch '{}'\n", marker.display()),
        )
        .unwrap();
        std::fs::set_permissions(&exe, std::fs::Permissions::from_mode(0o755)).unwrap();

        let config = serde_json::json!({
            "address": "127.0.0.1",
            "port": 0,
            "certificate_file": dir.path().join("missing.crt"),
            "private_key_file": dir.path().join("missing.key"),
            "ca_file": dir.path().join("missing-ca.crt"),
            "health_file_name": dir.path().join("health.json"),
            "health_executable_paths": [exe],
            "jobs_root": dir.path().join("jobs"),
        });
        let config_path = dir.path().join("health_server_config.json");
        std::fs::write(&config_path, config.to_string()).unwrap();

        let err = run_health(config_path).await.unwrap_err();

        assert!(format!("{err:#}").contains("tls material"), "{err:#}");
        assert!(!marker.exists(), "health executable ran before TLS was loaded");
    }
}
