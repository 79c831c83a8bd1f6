// Transport dialing: plain TCP, connected UDP, and TLS-wrapped TCP,
// each optionally tunneled through a SOCKS5 proxy.
//
// The TLS client configuration is deliberately permissive (every
// supported cipher suite and protocol version, no certificate
// validation): the point is finding out whether TLS is spoken at all,
// not establishing a trustworthy channel.

use std::io;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::timeout;
use tokio_rustls::rustls::{self, ClientConfig, RootCertStore, ServerName};
use tokio_rustls::TlsConnector;
use tokio_socks::tcp::Socks5Stream;
use url::Url;

use crate::error::ScanError;
use crate::plugins::{BoxedStream, Connection, Target};

/// Baseline connect timeout; override with [`Dialer::with_dial_timeout`].
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
struct ProxyAddr {
    host: String,
    port: u16,
}

/// Opens connections to targets, proxy-aware for TCP and TLS.
///
/// Constructing a `Dialer` validates the proxy URL, so a malformed or
/// non-socks5 proxy is rejected before any network I/O happens.
#[derive(Clone)]
pub struct Dialer {
    proxy: Option<ProxyAddr>,
    dial_timeout: Duration,
}

impl Dialer {
    pub fn new(proxy: Option<&str>) -> Result<Self, ScanError> {
        let proxy = match proxy {
            Some(raw) if !raw.is_empty() => Some(parse_proxy(raw)?),
            _ => None,
        };
        Ok(Self {
            proxy,
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
        })
    }

    pub fn with_dial_timeout(mut self, dial_timeout: Duration) -> Self {
        self.dial_timeout = dial_timeout;
        self
    }

    /// Plain TCP connection, direct or through the configured proxy.
    pub async fn tcp(&self, target: &Target) -> Result<Connection, ScanError> {
        Ok(Connection::Tcp(self.raw_stream(target).await?))
    }

    /// TLS handshake over a (possibly proxied) TCP connection. The
    /// server name is supplied per handshake: the target's hostname when
    /// present, its IP otherwise. The shared client config is never
    /// mutated.
    pub async fn tls(&self, target: &Target) -> Result<Connection, ScanError> {
        let tcp = self.raw_stream(target).await?;
        let connector = TlsConnector::from(tls_client_config().clone());
        let name = server_name(target);

        let stream = timeout(self.dial_timeout, connector.connect(name, tcp))
            .await
            .map_err(|_| ScanError::TlsHandshake {
                addr: target.addr,
                source: timed_out("tls handshake timed out"),
            })?
            .map_err(|source| ScanError::TlsHandshake {
                addr: target.addr,
                source,
            })?;

        Ok(Connection::Tls(Box::new(stream)))
    }

    /// Connected UDP socket. UDP is never proxied: SOCKS5 CONNECT only
    /// tunnels TCP.
    pub async fn udp(&self, target: &Target) -> Result<Connection, ScanError> {
        let bind_addr = if target.addr.is_ipv4() {
            "0.0.0.0:0"
        } else {
            "[::]:0"
        };
        let socket = UdpSocket::bind(bind_addr)
            .await
            .map_err(|source| ScanError::Connect {
                addr: target.addr,
                source,
            })?;
        socket
            .connect(target.addr)
            .await
            .map_err(|source| ScanError::Connect {
                addr: target.addr,
                source,
            })?;
        Ok(Connection::Udp(socket))
    }

    async fn raw_stream(&self, target: &Target) -> Result<BoxedStream, ScanError> {
        match &self.proxy {
            None => {
                let stream = timeout(self.dial_timeout, TcpStream::connect(target.addr))
                    .await
                    .map_err(|_| ScanError::Connect {
                        addr: target.addr,
                        source: timed_out("connect timed out"),
                    })?
                    .map_err(|source| ScanError::Connect {
                        addr: target.addr,
                        source,
                    })?;
                Ok(Box::new(stream) as BoxedStream)
            }
            Some(proxy) => {
                let tunnel = timeout(
                    self.dial_timeout,
                    Socks5Stream::connect((proxy.host.as_str(), proxy.port), target.addr),
                )
                .await
                .map_err(|_| ScanError::Connect {
                    addr: target.addr,
                    source: timed_out("proxy tunnel timed out"),
                })?
                .map_err(|source| ScanError::ProxyConnect {
                    addr: target.addr,
                    source,
                })?;
                Ok(Box::new(tunnel) as BoxedStream)
            }
        }
    }
}

fn parse_proxy(raw: &str) -> Result<ProxyAddr, ScanError> {
    let url = Url::parse(raw).map_err(|e| ScanError::InvalidProxyUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;

    if !url.scheme().eq_ignore_ascii_case("socks5") {
        return Err(ScanError::UnsupportedProxyScheme(url.scheme().to_string()));
    }

    let host = url
        .host_str()
        .ok_or_else(|| ScanError::InvalidProxyUrl {
            url: raw.to_string(),
            reason: "missing host".to_string(),
        })?
        .to_string();
    let port = url.port().ok_or_else(|| ScanError::InvalidProxyUrl {
        url: raw.to_string(),
        reason: "missing port".to_string(),
    })?;

    Ok(ProxyAddr { host, port })
}

fn server_name(target: &Target) -> ServerName {
    if !target.host.is_empty() {
        if let Ok(name) = ServerName::try_from(target.host.as_str()) {
            return name;
        }
    }
    ServerName::IpAddress(target.ip())
}

fn timed_out(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::TimedOut, msg.to_string())
}

fn tls_client_config() -> &'static Arc<ClientConfig> {
    static CONFIG: OnceLock<Arc<ClientConfig>> = OnceLock::new();
    CONFIG.get_or_init(|| {
        let mut config = ClientConfig::builder()
            .with_cipher_suites(rustls::ALL_CIPHER_SUITES)
            .with_safe_default_kx_groups()
            .with_protocol_versions(rustls::ALL_VERSIONS)
            .expect("all-suite tls config")
            .with_root_certificates(RootCertStore::empty())
            .with_no_client_auth();

        config
            .dangerous()
            .set_certificate_verifier(Arc::new(AcceptAnyCert));
        Arc::new(config)
    })
}

struct AcceptAnyCert;

impl rustls::client::ServerCertVerifier for AcceptAnyCert {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::Certificate,
        _intermediates: &[rustls::Certificate],
        _server_name: &ServerName,
        _scts: &mut dyn Iterator<Item = &[u8]>,
        _ocsp_response: &[u8],
        _now: std::time::SystemTime,
    ) -> Result<rustls::client::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::ServerCertVerified::assertion())
    }
}
