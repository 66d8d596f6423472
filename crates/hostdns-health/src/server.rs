//! Health status server: `GET /health` over mutually-authenticated TLS.
//!
//! Every connection carries exactly one request (keep-alive is off). The
//! client certificate has already been verified against the CA bundle by
//! the handshake; the handler additionally requires its subject common
//! name to match the configured identity before reading any state.

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::io::{self, ErrorKind};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderValue};
use http::{Request, Response, StatusCode};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::{TokioIo, TokioTimer};
use rustls::ServerConfig;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, warn};

use crate::error::{HealthError, HealthResult};
use crate::state_file::{SelfReportedState, read_state_file};
use crate::status::{AggregatedSnapshot, HealthStatus};
use crate::tls;

/// State reported in place of the workload's own when checks fail.
pub const FAILURE_STATE: &str = "job-health-executable-fail";

const HEALTH_PATH: &str = "/health";

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
const HEADER_READ_TIMEOUT: Duration = Duration::from_secs(10);
const MIN_ACCEPT_BACKOFF: Duration = Duration::from_millis(5);
const MAX_ACCEPT_BACKOFF: Duration = Duration::from_secs(1);

/// Where to listen and which TLS material to use.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub bind: SocketAddr,
    pub certificate_file: PathBuf,
    pub private_key_file: PathBuf,
    pub ca_file: PathBuf,
}

/// Body of a successful `/health` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub state: String,
    pub group_state: BTreeMap<String, String>,
}

impl HealthResponse {
    /// Combine the workload's own state with the aggregated verdict.
    pub fn render(health: &SelfReportedState, snapshot: &AggregatedSnapshot) -> Self {
        let state = if snapshot.overall {
            health.state.clone()
        } else {
            FAILURE_STATE.to_string()
        };

        let group_state = snapshot
            .groups
            .iter()
            .map(|(group, healthy)| {
                let value = if *healthy { state.as_str() } else { FAILURE_STATE };
                (group.clone(), value.to_string())
            })
            .collect();

        Self { state, group_state }
    }
}

/// Answers `/health` from the state file and the latest snapshot.
pub struct HealthServer {
    state_file: PathBuf,
    status: Arc<dyn HealthStatus>,
    expected_common_name: String,
}

impl HealthServer {
    /// Create a server that reads `state_file` on every request and only
    /// answers clients whose certificate carries `expected_common_name`.
    pub fn new(
        state_file: impl Into<PathBuf>,
        status: Arc<dyn HealthStatus>,
        expected_common_name: impl Into<String>,
    ) -> Self {
        Self {
            state_file: state_file.into(),
            status,
            expected_common_name: expected_common_name.into(),
        }
    }

    /// Load TLS material and bind the listener without serving yet.
    ///
    /// Lets a caller surface bad certificates or an unusable address before
    /// doing any other startup work.
    pub async fn bind(settings: &ServerSettings) -> HealthResult<(TcpListener, Arc<ServerConfig>)> {
        let tls = tls::server_config_from_files(
            &settings.certificate_file,
            &settings.private_key_file,
            &settings.ca_file,
        )?;

        let listener = TcpListener::bind(settings.bind)
            .await
            .map_err(|source| HealthError::Bind {
                addr: settings.bind,
                source,
            })?;

        Ok((listener, tls))
    }

    /// Load TLS material, bind, and serve until the listener fails.
    pub async fn serve(self, settings: &ServerSettings) -> HealthResult<()> {
        let (listener, tls) = Self::bind(settings).await?;
        self.serve_listener(listener, tls).await
    }

    /// Serve on an already-bound listener.
    ///
    /// Accept errors that leave the listener usable (descriptor exhaustion,
    /// aborted connections) are retried with backoff; only a broken
    /// listener ends the loop.
    pub async fn serve_listener(
        self,
        listener: TcpListener,
        tls: Arc<ServerConfig>,
    ) -> HealthResult<()> {
        let acceptor = TlsAcceptor::from(tls);
        let server = Arc::new(self);
        let mut backoff = AcceptBackoff::default();

        info!(addr = ?listener.local_addr().ok(), "health server listening");

        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(conn) => {
                    backoff.reset();
                    conn
                }
                Err(e) => match classify_accept_error(&e) {
                    AcceptFailure::Connection => {
                        debug!(error = %e, "connection dropped before accept");
                        continue;
                    }
                    AcceptFailure::Transient => {
                        let delay = backoff.next_delay();
                        warn!(
                            error = %e,
                            retry_ms = delay.as_millis() as u64,
                            "accept failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    AcceptFailure::Fatal => {
                        error!(error = %e, "health server listener failed");
                        return Err(HealthError::Accept(e));
                    }
                },
            };

            let acceptor = acceptor.clone();
            let server = Arc::clone(&server);

            tokio::spawn(async move {
                let stream = match tokio::time::timeout(HANDSHAKE_TIMEOUT, acceptor.accept(stream)).await {
                    Ok(Ok(stream)) => stream,
                    Ok(Err(e)) => {
                        debug!(%peer, error = %e, "tls handshake failed");
                        return;
                    }
                    Err(_) => {
                        debug!(%peer, "tls handshake timed out");
                        return;
                    }
                };

                let common_name = stream
                    .get_ref()
                    .1
                    .peer_certificates()
                    .and_then(|certs| certs.first())
                    .and_then(tls::peer_common_name);

                let service = service_fn(move |req: Request<Incoming>| {
                    let server = Arc::clone(&server);
                    let common_name = common_name.clone();
                    async move {
                        let resp = server.handle(req.uri().path(), common_name.as_deref()).await;
                        Ok::<_, Infallible>(resp)
                    }
                });

                if let Err(e) = http1::Builder::new()
                    .timer(TokioTimer::new())
                    .header_read_timeout(HEADER_READ_TIMEOUT)
                    .keep_alive(false)
                    .serve_connection(TokioIo::new(stream), service)
                    .await
                {
                    debug!(%peer, error = %e, "health connection error");
                }
            });
        }
    }

    /// Answer one request from a client whose certificate carries
    /// `common_name`.
    pub async fn handle(&self, path: &str, common_name: Option<&str>) -> Response<Full<Bytes>> {
        if path != HEALTH_PATH {
            return text_response(StatusCode::NOT_FOUND, "404 page not found\n");
        }

        if common_name != Some(self.expected_common_name.as_str()) {
            warn!(?common_name, "rejecting health request from unexpected identity");
            return text_response(
                StatusCode::BAD_REQUEST,
                "TLS certificate common name does not match",
            );
        }

        let health = match read_state_file(&self.state_file).await {
            Ok(health) => health,
            Err(e) => {
                error!(error = %e, "failed to load health state");
                return empty_response(StatusCode::INTERNAL_SERVER_ERROR);
            }
        };

        let snapshot = self.status.status();
        let body = HealthResponse::render(&health, &snapshot);

        match serde_json::to_vec(&body) {
            Ok(bytes) => {
                let mut resp = Response::new(Full::new(Bytes::from(bytes)));
                resp.headers_mut()
                    .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                resp
            }
            Err(e) => {
                error!(error = %e, "failed to marshal health response");
                empty_response(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }
}

/// How an `accept()` failure affects the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AcceptFailure {
    /// The pending connection went away; accept the next one at once.
    Connection,
    /// The listener is fine but the host is short on resources.
    Transient,
    /// The listener itself is unusable.
    Fatal,
}

fn classify_accept_error(e: &io::Error) -> AcceptFailure {
    match e.kind() {
        ErrorKind::ConnectionAborted
        | ErrorKind::ConnectionReset
        | ErrorKind::ConnectionRefused
        | ErrorKind::Interrupted
        | ErrorKind::WouldBlock => AcceptFailure::Connection,
        ErrorKind::InvalidInput => AcceptFailure::Fatal,
        _ => match e.raw_os_error() {
            Some(code) if is_broken_listener(code) => AcceptFailure::Fatal,
            _ => AcceptFailure::Transient,
        },
    }
}

#[cfg(unix)]
fn is_broken_listener(code: i32) -> bool {
    matches!(
        code,
        libc::EBADF | libc::ENOTSOCK | libc::EINVAL | libc::EOPNOTSUPP
    )
}

#[cfg(not(unix))]
fn is_broken_listener(_code: i32) -> bool {
    false
}

/// Retry delay for transient accept failures: doubles from 5ms up to 1s and
/// starts over after a successful accept.
#[derive(Debug, Default)]
struct AcceptBackoff {
    last: Option<Duration>,
}

impl AcceptBackoff {
    fn next_delay(&mut self) -> Duration {
        let delay = match self.last {
            None => MIN_ACCEPT_BACKOFF,
            Some(last) => (last * 2).min(MAX_ACCEPT_BACKOFF),
        };
        self.last = Some(delay);
        delay
    }

    fn reset(&mut self) {
        self.last = None;
    }
}

fn text_response(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    let mut resp = Response::new(Full::new(Bytes::from_static(body.as_bytes())));
    *resp.status_mut() = status;
    resp.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    resp
}

fn empty_response(status: StatusCode) -> Response<Full<Bytes>> {
    let mut resp = Response::new(Full::new(Bytes::new()));
    *resp.status_mut() = status;
    resp
}
