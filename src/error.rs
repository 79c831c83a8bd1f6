use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// Errors produced while configuring or running a scan.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("unsupported proxy scheme '{0}': only socks5 is supported")]
    UnsupportedProxyScheme(String),

    #[error("invalid proxy url '{url}': {reason}")]
    InvalidProxyUrl { url: String, reason: String },

    #[error("unable to connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("proxy tunnel to {addr} failed: {source}")]
    ProxyConnect {
        addr: SocketAddr,
        #[source]
        source: tokio_socks::Error,
    },

    #[error("tls handshake with {addr} failed: {source}")]
    TlsHandshake {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("probe '{plugin}' timed out after {timeout:?}")]
    ProbeTimeout { plugin: String, timeout: Duration },

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

impl ScanError {
    /// Transport errors abort the attempt that needed the connection;
    /// everything else is handled plugin-locally.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ScanError::Connect { .. } | ScanError::ProxyConnect { .. } | ScanError::TlsHandshake { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_classification() {
        let refused = ScanError::Connect {
            addr: "127.0.0.1:1".parse().unwrap(),
            source: io::Error::new(io::ErrorKind::ConnectionRefused, "refused"),
        };
        assert!(refused.is_transport());
        assert!(!ScanError::Protocol("bad greeting".into()).is_transport());
        assert!(!ScanError::ProbeTimeout {
            plugin: "mysql/tcp".into(),
            timeout: Duration::from_secs(2),
        }
        .is_transport());
    }

    #[test]
    fn messages_name_the_peer() {
        let err = ScanError::Connect {
            addr: "10.0.0.1:3306".parse().unwrap(),
            source: io::Error::new(io::ErrorKind::TimedOut, "connect timed out"),
        };
        assert!(err.to_string().contains("10.0.0.1:3306"));

        let err = ScanError::UnsupportedProxyScheme("ftp".into());
        assert!(err.to_string().contains("ftp"));
    }
}
