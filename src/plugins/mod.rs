// Plugin contract and core data types for protocol detection
// Concrete protocol plugins live outside this crate; the engine only
// depends on the capability surface defined here.

pub mod registry;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::UdpSocket;

use crate::error::ScanError;

/// Transport class a plugin is bound to and a service was found on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Tcp,
    Udp,
    Tls,
}

impl Transport {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Transport::Tcp => "tcp",
            Transport::Udp => "udp",
            Transport::Tls => "tls",
        }
    }
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single endpoint to scan. `host` may be empty; when set it is used
/// for TLS server-name indication and logging.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Target {
    pub addr: SocketAddr,
    pub host: String,
}

impl Target {
    pub fn new(addr: SocketAddr, host: impl Into<String>) -> Self {
        Self {
            addr,
            host: host.into(),
        }
    }

    pub fn from_addr(addr: SocketAddr) -> Self {
        Self {
            addr,
            host: String::new(),
        }
    }

    pub fn ip(&self) -> IpAddr {
        self.addr.ip()
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.host.is_empty() {
            write!(f, "{}", self.addr)
        } else {
            write!(f, "{} ({})", self.addr, self.host)
        }
    }
}

/// Identified service on a target endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub host: String,
    pub ip: IpAddr,
    pub port: u16,
    pub transport: Transport,
    pub protocol: String,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Service {
    pub fn new(target: &Target, transport: Transport, protocol: impl Into<String>) -> Self {
        Self {
            host: target.host.clone(),
            ip: target.ip(),
            port: target.port(),
            transport,
            protocol: protocol.into(),
            metadata: serde_json::Map::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Byte stream a probe talks over, plain or TLS, direct or proxied.
pub type BoxedStream = Box<dyn AsyncStream>;

pub trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> AsyncStream for T {}

/// An open connection handed to exactly one probe. The probe owns it;
/// dropping it closes the underlying socket.
pub enum Connection {
    Tcp(BoxedStream),
    Tls(BoxedStream),
    Udp(UdpSocket),
}

impl Connection {
    pub fn transport(&self) -> Transport {
        match self {
            Connection::Tcp(_) => Transport::Tcp,
            Connection::Tls(_) => Transport::Tls,
            Connection::Udp(_) => Transport::Udp,
        }
    }

    /// Write the full buffer (a single datagram for UDP).
    pub async fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        match self {
            Connection::Tcp(stream) | Connection::Tls(stream) => stream.write_all(buf).await,
            Connection::Udp(socket) => {
                socket.send(buf).await?;
                Ok(())
            }
        }
    }

    /// Read whatever the peer sends next (a single datagram for UDP).
    pub async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Connection::Tcp(stream) | Connection::Tls(stream) => stream.read(buf).await,
            Connection::Udp(socket) => socket.recv(buf).await,
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Connection({})", self.transport())
    }
}

/// A protocol-detection unit bound to one transport class.
///
/// Plugins are stateless and safe for concurrent reuse: the engine holds
/// them as `Arc<dyn Plugin>` and may run the same plugin against many
/// connections at once.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Short protocol name, e.g. "mysql".
    fn name(&self) -> &'static str;

    /// Transport class this plugin detects on.
    fn transport(&self) -> Transport;

    /// Ordering key within the transport class; lower runs earlier.
    fn priority(&self) -> u16;

    /// Whether `port` is one of this protocol's well-known default ports.
    fn default_port(&self, port: u16) -> bool;

    /// Attempt to identify this plugin's protocol on an open connection.
    ///
    /// Returns `Ok(Some(service))` on a match, `Ok(None)` when the
    /// connection is not this protocol, and `Err` on I/O or
    /// protocol-level failure. `timeout` is the per-probe budget; the
    /// engine also enforces it from the outside.
    async fn probe(
        &self,
        conn: &mut Connection,
        timeout: Duration,
        target: &Target,
    ) -> Result<Option<Service>, ScanError>;
}

/// Identity string used in diagnostics, e.g. "mysql/tcp".
pub fn plugin_id(plugin: &dyn Plugin) -> String {
    format!("{}/{}", plugin.name(), plugin.transport())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_labels() {
        assert_eq!(Transport::Tcp.to_string(), "tcp");
        assert_eq!(Transport::Udp.to_string(), "udp");
        assert_eq!(Transport::Tls.to_string(), "tls");
    }

    #[test]
    fn service_serializes_flat() {
        let target = Target::new("10.0.0.1:3306".parse().unwrap(), "db.internal");
        let service = Service::new(&target, Transport::Tcp, "mysql")
            .with_metadata("version", serde_json::json!("8.0.32"));

        let value = serde_json::to_value(&service).unwrap();
        assert_eq!(value["host"], "db.internal");
        assert_eq!(value["port"], 3306);
        assert_eq!(value["transport"], "tcp");
        assert_eq!(value["protocol"], "mysql");
        assert_eq!(value["metadata"]["version"], "8.0.32");
    }

    #[test]
    fn empty_metadata_is_omitted() {
        let target = Target::from_addr("10.0.0.1:22".parse().unwrap());
        let service = Service::new(&target, Transport::Tcp, "ssh");
        let value = serde_json::to_value(&service).unwrap();
        assert!(value.get("metadata").is_none());
    }
}
