pub mod detail;
pub mod verifier;

use std::io;
use std::net::{IpAddr, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::{Arc, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use bon::Builder;
use rustls::pki_types::{CertificateDer, ServerName};
use rustls::{ClientConfig, ClientConnection, RootCertStore};
use tracing::{debug, warn};

pub use detail::{CertificateDetail, PublicKeyAlgorithm, encode_to_pem};
use verifier::AcceptAnyServerCert;

use crate::error::{Result, SslToolError};

/// Budget for connecting and completing the TLS handshake.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Options for [`retrieve`].
///
/// # Fields
/// * `verify_peer` - Enforce chain trust, expiry and hostname checks during the handshake.
/// * `timeout` - Deadline covering name resolution, TCP connect and handshake.
/// * `extra_roots` - Trust anchors added to the Mozilla root set.
/// * `server_name` - Name sent as SNI and verified against, defaults to the host part of the
///   address.
#[derive(Debug, Clone, Builder)]
pub struct RetrieveOptions {
    #[builder(default = true)]
    pub verify_peer: bool,
    #[builder(default = DEFAULT_TIMEOUT)]
    pub timeout: Duration,
    #[builder(default)]
    pub extra_roots: Vec<CertificateDer<'static>>,
    pub server_name: Option<String>,
}

impl Default for RetrieveOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Splits `host:port`, stripping the brackets of an IPv6 literal.
fn split_address(address: &str) -> Result<(String, u16)> {
    let (host, port) = address
        .rsplit_once(':')
        .ok_or_else(|| SslToolError::ConnectFailed(format!("{address}: missing port")))?;
    let port = port
        .parse::<u16>()
        .map_err(|e| SslToolError::ConnectFailed(format!("{address}: invalid port: {e}")))?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        return Err(SslToolError::ConnectFailed(format!("{address}: missing host")));
    }
    Ok((host.to_string(), port))
}

fn client_config(options: &RetrieveOptions) -> Result<ClientConfig> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let supported = provider.signature_verification_algorithms;
    let builder = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| SslToolError::HandshakeFailed(e.to_string()))?;

    if !options.verify_peer {
        warn!("peer certificate verification is disabled");
        return Ok(builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert::new(supported)))
            .with_no_client_auth());
    }

    let mut roots = RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };
    for root in &options.extra_roots {
        roots
            .add(root.clone())
            .map_err(|e| SslToolError::InvalidInput(format!("invalid trust anchor: {e}")))?;
    }
    Ok(builder.with_root_certificates(roots).with_no_client_auth())
}

/// Time left before `deadline`, failing once it has passed.
fn remaining(deadline: Instant, timeout: Duration) -> Result<Duration> {
    deadline
        .checked_duration_since(Instant::now())
        .filter(|left| !left.is_zero())
        .ok_or(SslToolError::ConnectionTimeout(timeout))
}

/// Resolves `host` before `deadline`.
///
/// The system resolver blocks without a timeout, so lookups run on a helper thread. A lookup that
/// outlives the deadline is abandoned and its result discarded.
fn resolve(
    host: &str,
    port: u16,
    deadline: Instant,
    timeout: Duration,
) -> Result<Vec<SocketAddr>> {
    let left = remaining(deadline, timeout)?;
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(vec![SocketAddr::new(ip, port)]);
    }

    let (tx, rx) = mpsc::channel();
    let target = (host.to_string(), port);
    thread::spawn(move || {
        let result = target
            .to_socket_addrs()
            .map(|addrs| addrs.collect::<Vec<_>>());
        let _ = tx.send(result);
    });
    match rx.recv_timeout(left) {
        Ok(Ok(addrs)) => Ok(addrs),
        Ok(Err(e)) => Err(SslToolError::ConnectFailed(format!("{host}:{port}: {e}"))),
        Err(mpsc::RecvTimeoutError::Timeout) => Err(SslToolError::ConnectionTimeout(timeout)),
        Err(mpsc::RecvTimeoutError::Disconnected) => Err(SslToolError::ConnectFailed(format!(
            "{host}:{port}: resolver exited without an answer"
        ))),
    }
}

fn connect(host: &str, port: u16, deadline: Instant, timeout: Duration) -> Result<TcpStream> {
    let addrs = resolve(host, port, deadline, timeout)?;
    debug!(host, addresses = addrs.len(), "resolved");

    let mut last_error = None;
    for addr in addrs {
        debug!(%addr, "connecting");
        match TcpStream::connect_timeout(&addr, remaining(deadline, timeout)?) {
            Ok(stream) => return Ok(stream),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                return Err(SslToolError::ConnectionTimeout(timeout));
            }
            Err(e) => last_error = Some(e),
        }
    }
    Err(SslToolError::ConnectFailed(match last_error {
        Some(e) => format!("{host}:{port}: {e}"),
        None => format!("{host}:{port}: no addresses resolved"),
    }))
}

/// Connects to `address` (`host:port`), completes a TLS handshake and returns the peer's
/// certificate chain, leaf first.
///
/// With `verify_peer` set, an untrusted, expired or mismatched chain fails the handshake and no
/// details are returned. Otherwise the chain is returned as presented. One TCP connection is
/// opened per call and there are no retries.
///
/// # Errors
/// * [`SslToolError::ConnectFailed`] - The address is malformed, does not resolve or refuses.
/// * [`SslToolError::ConnectionTimeout`] - `timeout` expired before the handshake finished.
/// * [`SslToolError::HandshakeFailed`] - TLS negotiation or trust validation failed.
/// * [`SslToolError::ProtocolError`] - The session completed without a peer certificate.
pub fn retrieve(address: &str, options: &RetrieveOptions) -> Result<Vec<CertificateDetail>> {
    let deadline = Instant::now() + options.timeout;
    let (host, port) = split_address(address)?;
    let name = options.server_name.clone().unwrap_or_else(|| host.clone());
    let server_name = ServerName::try_from(name)
        .map_err(|e| SslToolError::ConnectFailed(format!("invalid server name: {e}")))?;

    let config = Arc::new(client_config(options)?);
    let mut conn = ClientConnection::new(config, server_name)
        .map_err(|e| SslToolError::HandshakeFailed(e.to_string()))?;
    let mut tcp = connect(&host, port, deadline, options.timeout)?;

    debug!(address, verify_peer = options.verify_peer, "starting TLS handshake");
    while conn.is_handshaking() {
        let left = remaining(deadline, options.timeout)?;
        tcp.set_read_timeout(Some(left))
            .and_then(|()| tcp.set_write_timeout(Some(left)))
            .map_err(|e| SslToolError::ConnectFailed(e.to_string()))?;
        if let Err(e) = conn.complete_io(&mut tcp) {
            return Err(match e.kind() {
                io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => {
                    SslToolError::ConnectionTimeout(options.timeout)
                }
                _ => SslToolError::HandshakeFailed(e.to_string()),
            });
        }
    }

    let chain = match conn.peer_certificates() {
        Some(chain) if !chain.is_empty() => chain,
        _ => {
            return Err(SslToolError::ProtocolError(
                "handshake completed without a peer certificate".to_string(),
            ));
        }
    };
    debug!(address, certificates = chain.len(), "received peer chain");
    let details = chain
        .iter()
        .map(|cert| CertificateDetail::from_der(cert.as_ref()))
        .collect::<Result<Vec<_>>>()?;

    conn.send_close_notify();
    if let Err(e) = conn.complete_io(&mut tcp) {
        debug!(error = %e, "close_notify not delivered");
    }
    Ok(details)
}
