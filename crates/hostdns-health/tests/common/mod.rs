//! Shared fixtures for the health endpoint tests: a throwaway CA, leaf
//! certificates, and a minimal rustls + hyper client.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use http::{Request, StatusCode};
use http_body_util::{BodyExt, Empty};
use hyper_util::rt::TokioIo;
use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, IsCa,
    KeyPair,
};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer, ServerName};
use rustls::{ClientConfig, RootCertStore};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_rustls::TlsConnector;

use hostdns_health::{AggregatedSnapshot, HealthResult, HealthServer, StatusStore, tls};

pub const CN: &str = "health.bosh-dns";

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub struct Pki {
    ca: rcgen::Certificate,
    ca_key: KeyPair,
}

pub struct Leaf {
    pub cert: CertificateDer<'static>,
    pub key: PrivateKeyDer<'static>,
}

impl Pki {
    pub fn new() -> Self {
        let ca_key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::default();
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, "hostdns test CA");
        params.distinguished_name = dn;
        let ca = params.self_signed(&ca_key).unwrap();
        Self { ca, ca_key }
    }

    pub fn leaf(&self, common_name: &str, sans: Vec<String>, usage: ExtendedKeyUsagePurpose) -> Leaf {
        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::new(sans).unwrap();
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, common_name);
        params.distinguished_name = dn;
        params.extended_key_usages = vec![usage];
        let cert = params.signed_by(&key, &self.ca, &self.ca_key).unwrap();

        Leaf {
            cert: cert.der().clone(),
            key: PrivatePkcs8KeyDer::from(key.serialize_der()).into(),
        }
    }

    pub fn server_leaf(&self) -> Leaf {
        self.leaf(
            "hostdns health server",
            vec!["localhost".to_string()],
            ExtendedKeyUsagePurpose::ServerAuth,
        )
    }

    pub fn client_leaf(&self, common_name: &str) -> Leaf {
        self.leaf(common_name, vec![], ExtendedKeyUsagePurpose::ClientAuth)
    }

    pub fn roots(&self) -> RootCertStore {
        let mut roots = RootCertStore::empty();
        roots.add(self.ca.der().clone()).unwrap();
        roots
    }
}

pub fn client_config(pki: &Pki, identity: Option<Leaf>) -> Arc<ClientConfig> {
    let builder = ClientConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .unwrap()
    .with_root_certificates(pki.roots());

    let config = match identity {
        Some(leaf) => builder
            .with_client_auth_cert(vec![leaf.cert], leaf.key)
            .unwrap(),
        None => builder.with_no_client_auth(),
    };
    Arc::new(config)
}

pub async fn start_server(pki: &Pki, state_file: &Path, store: StatusStore) -> SocketAddr {
    spawn_server(pki, state_file, store).await.0
}

/// Like `start_server`, but keeps the task handle so callers can tell
/// whether the accept loop is still alive.
pub async fn spawn_server(
    pki: &Pki,
    state_file: &Path,
    store: StatusStore,
) -> (SocketAddr, JoinHandle<HealthResult<()>>) {
    let server_leaf = pki.server_leaf();
    let config = tls::server_config(vec![server_leaf.cert], server_leaf.key, pki.roots()).unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = HealthServer::new(state_file, Arc::new(store), CN);

    let handle = tokio::spawn(async move { server.serve_listener(listener, config).await });
    (addr, handle)
}

pub async fn get(addr: SocketAddr, config: Arc<ClientConfig>, path: &str) -> Result<(StatusCode, Bytes), BoxError> {
    let tcp = TcpStream::connect(addr).await?;
    let tls = TlsConnector::from(config)
        .connect(ServerName::try_from("localhost")?, tcp)
        .await?;

    let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(tls)).await?;
    tokio::spawn(async move {
        let _ = conn.await;
    });

    let req = Request::builder()
        .method("GET")
        .uri(path)
        .header("host", "localhost")
        .body(Empty::<Bytes>::new())?;

    let resp = sender.send_request(req).await?;
    let status = resp.status();
    let body = resp.into_body().collect().await?.to_bytes();
    Ok((status, body))
}

pub fn write_state(path: &Path, state: &str) {
    std::fs::write(path, format!(r#"{{"state":"{state}"}}"#)).unwrap();
}

pub fn healthy_store() -> StatusStore {
    let store = StatusStore::new();
    store.update(AggregatedSnapshot {
        overall: true,
        groups: [("addr1".to_string(), true)].into_iter().collect(),
    });
    store
}
