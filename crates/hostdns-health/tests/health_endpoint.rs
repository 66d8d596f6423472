//! End-to-end tests for the mTLS health endpoint.
//!
//! Generates a throwaway CA with server and client certificates, runs the
//! real server on a loopback port and talks to it with a rustls client.

mod common;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use http::StatusCode;
use rustls::ClientConfig;
use tokio::sync::watch;

use hostdns_core::TokioCmdRunner;
use hostdns_health::{HealthExecutableMonitor, JobsRoot, MonitorSettings, StatusStore};

use common::*;

#[tokio::test]
async fn authorized_client_reads_health() {
    let dir = tempfile::tempdir().unwrap();
    let state_file = dir.path().join("health.json");
    write_state(&state_file, "running");

    let pki = Pki::new();
    let addr = start_server(&pki, &state_file, healthy_store()).await;

    let (status, body) = get(addr, client_config(&pki, Some(pki.client_leaf(CN))), "/health")
        .await
        .unwrap();

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        serde_json::from_slice::<serde_json::Value>(&body).unwrap(),
        serde_json::json!({"state": "running", "group_state": {"addr1": "running"}})
    );
}

#[tokio::test]
async fn client_with_other_common_name_gets_bad_request() {
    let dir = tempfile::tempdir().unwrap();
    let state_file = dir.path().join("health.json");
    write_state(&state_file, "running");

    let pki = Pki::new();
    let addr = start_server(&pki, &state_file, healthy_store()).await;

    let (status, body) = get(
        addr,
        client_config(&pki, Some(pki.client_leaf("someone-else"))),
        "/health",
    )
    .await
    .unwrap();

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(&body[..], b"TLS certificate common name does not match");
}

#[tokio::test]
async fn client_without_certificate_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let state_file = dir.path().join("health.json");
    write_state(&state_file, "running");

    let pki = Pki::new();
    let addr = start_server(&pki, &state_file, healthy_store()).await;

    let result = get(addr, client_config(&pki, None), "/health").await;
    assert!(result.is_err());
}

#[tokio::test]
async fn client_from_untrusted_ca_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let state_file = dir.path().join("health.json");
    write_state(&state_file, "running");

    let pki = Pki::new();
    let rogue = Pki::new();
    let addr = start_server(&pki, &state_file, healthy_store()).await;

    // Trusts the real server, but presents a certificate from another CA.
    let identity = rogue.client_leaf(CN);
    let config = ClientConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .unwrap()
    .with_root_certificates(pki.roots())
    .with_client_auth_cert(vec![identity.cert], identity.key)
    .unwrap();

    let result = get(addr, Arc::new(config), "/health").await;
    assert!(result.is_err());
}

#[tokio::test]
async fn server_keeps_serving_after_rejected_handshakes() {
    let dir = tempfile::tempdir().unwrap();
    let state_file = dir.path().join("health.json");
    write_state(&state_file, "running");

    let pki = Pki::new();
    let addr = start_server(&pki, &state_file, healthy_store()).await;

    assert!(get(addr, client_config(&pki, None), "/health").await.is_err());

    let (status, _) = get(addr, client_config(&pki, Some(pki.client_leaf(CN))), "/health")
        .await
        .unwrap();
    assert_eq!(status, StatusCode::OK);
}

#[cfg(unix)]
mod with_executables {
    use super::*;

    /// Job `a` whose single health executable is a symlink to `target`.
    fn job_with_executable(jobs_root: &Path, target: &str) -> std::path::PathBuf {
        let bin = jobs_root.join("a/bin");
        std::fs::create_dir_all(&bin).unwrap();
        let exe = bin.join("health");
        std::os::unix::fs::symlink(target, &exe).unwrap();

        let bosh = jobs_root.join("a/bosh");
        std::fs::create_dir_all(&bosh).unwrap();
        std::fs::write(bosh.join("links"), r#"[{"base_address":"addr1"}]"#).unwrap();
        exe
    }

    async fn scenario(target: &str) -> serde_json::Value {
        let dir = tempfile::tempdir().unwrap();
        let state_file = dir.path().join("health.json");
        write_state(&state_file, "running");
        let jobs_root = dir.path().join("jobs");
        let exe = job_with_executable(&jobs_root, target);

        let store = StatusStore::new();
        let monitor = HealthExecutableMonitor::new(
            MonitorSettings {
                executables: vec![exe],
                state_file: state_file.clone(),
                interval: Duration::from_secs(60),
            },
            TokioCmdRunner::new(Duration::from_secs(10)),
            Arc::new(JobsRoot::new(&jobs_root, "bosh/links")),
            store.clone(),
        );
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = monitor.start(shutdown_rx).await;

        let pki = Pki::new();
        let addr = start_server(&pki, &state_file, store).await;
        let (status, body) = get(addr, client_config(&pki, Some(pki.client_leaf(CN))), "/health")
            .await
            .unwrap();
        assert_eq!(status, StatusCode::OK);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn passing_executable_reports_running() {
        assert_eq!(
            scenario("/bin/true").await,
            serde_json::json!({"state": "running", "group_state": {"addr1": "running"}})
        );
    }

    #[tokio::test]
    async fn failing_executable_reports_failure_marker() {
        assert_eq!(
            scenario("/bin/false").await,
            serde_json::json!({
                "state": "job-health-executable-fail",
                "group_state": {"addr1": "job-health-executable-fail"}
            })
        );
    }
}
