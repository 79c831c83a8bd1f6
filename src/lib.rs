//! Application-layer protocol identification.
//!
//! protoscope turns a bare `host:port` into a labeled service by trying
//! protocol-detection plugins against a live connection: a default-port
//! fast lane first, TLS capability detection, then a bounded concurrent
//! race over every remaining candidate. TCP and TLS connections can be
//! tunneled through a SOCKS5 proxy.
//!
//! Protocol plugins are external: implement [`Plugin`], stage it with
//! [`register`] (or hand a [`Registry`] to
//! [`Scanner::with_registry`]), then scan:
//!
//! ```no_run
//! use protoscope::{Config, Scanner, Target};
//!
//! # async fn run() -> Result<(), protoscope::ScanError> {
//! let scanner = Scanner::new(Config::default())?;
//! let target = Target::from_addr("10.0.0.1:3306".parse().unwrap());
//! if let Some(service) = scanner.scan_target(&target).await? {
//!     println!("{}:{} speaks {}", service.ip, service.port, service.protocol);
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod plugins;
pub mod scanner;

pub use error::ScanError;
pub use plugins::registry::{register, Registry};
pub use plugins::{plugin_id, Connection, Plugin, Service, Target, Transport};
pub use scanner::{Config, Dialer, Scanner};
