//! TLS material for the health endpoint.
//!
//! The server presents its own certificate and requires every client to
//! present one chaining to the configured CA bundle. Which client identity
//! may read health data is decided per request from the certificate's
//! subject common name.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::RootCertStore;
use rustls::ServerConfig;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use tracing::debug;
use x509_parser::prelude::{FromDer, X509Certificate};

use crate::error::{HealthError, HealthResult};

fn material_error(path: &Path, message: impl ToString) -> HealthError {
    HealthError::TlsMaterial {
        path: path.to_path_buf(),
        message: message.to_string(),
    }
}

fn open(path: &Path) -> HealthResult<BufReader<File>> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| material_error(path, e))
}

/// Load every PEM certificate in `path`.
pub fn load_certs(path: &Path) -> HealthResult<Vec<CertificateDer<'static>>> {
    let certs = rustls_pemfile::certs(&mut open(path)?)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| material_error(path, e))?;

    if certs.is_empty() {
        return Err(material_error(path, "no certificates found"));
    }
    Ok(certs)
}

/// Load the first PEM private key in `path`.
pub fn load_private_key(path: &Path) -> HealthResult<PrivateKeyDer<'static>> {
    rustls_pemfile::private_key(&mut open(path)?)
        .map_err(|e| material_error(path, e))?
        .ok_or_else(|| material_error(path, "no private key found"))
}

/// Trust anchors for client certificates.
pub fn load_ca_roots(path: &Path) -> HealthResult<RootCertStore> {
    let mut roots = RootCertStore::empty();
    let (added, ignored) = roots.add_parsable_certificates(load_certs(path)?);
    debug!(path = ?path, added, ignored, "loaded client CA bundle");

    if added == 0 {
        return Err(material_error(path, "no usable CA certificates"));
    }
    Ok(roots)
}

/// Server config that requires a client certificate signed by `roots`.
pub fn server_config(
    certs: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
    roots: RootCertStore,
) -> HealthResult<Arc<ServerConfig>> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());

    let verifier = WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider.clone())
        .build()
        .map_err(|e| HealthError::TlsConfig(e.to_string()))?;

    let config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| HealthError::TlsConfig(e.to_string()))?
        .with_client_cert_verifier(verifier)
        .with_single_cert(certs, key)
        .map_err(|e| HealthError::TlsConfig(e.to_string()))?;

    Ok(Arc::new(config))
}

/// Build the server config straight from PEM files.
pub fn server_config_from_files(
    certificate_file: &Path,
    private_key_file: &Path,
    ca_file: &Path,
) -> HealthResult<Arc<ServerConfig>> {
    let roots = load_ca_roots(ca_file)?;
    let certs = load_certs(certificate_file)?;
    let key = load_private_key(private_key_file)?;
    server_config(certs, key, roots)
}

/// Subject common name of a DER certificate.
pub fn peer_common_name(cert: &CertificateDer<'_>) -> Option<String> {
    let (_, parsed) = X509Certificate::from_der(cert.as_ref()).ok()?;
    let common_name = parsed.subject().iter_common_name().next()?;
    common_name.as_str().ok().map(str::to_string)
}
