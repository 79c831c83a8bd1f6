// Scan orchestration: decides which plugins to try against a target,
// over which transport, sequentially or racing, and when to stop.
//
// The TCP/TLS path is a pipeline with an early exit at every stage:
// default-port fast lane, TLS capability detection, TLS fast lane,
// fast-mode short-circuit, then a bounded concurrent race over every
// remaining candidate.

pub mod dialer;
mod probe;

pub use dialer::{Dialer, DEFAULT_DIAL_TIMEOUT};

use futures::future::join_all;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::warn;

use crate::error::ScanError;
use crate::plugins::registry::Registry;
use crate::plugins::{plugin_id, Service, Target, Transport};
use probe::run_plugin;

/// Cap on simultaneous in-flight probes in the slow lane.
const MAX_IN_FLIGHT: usize = 10;

/// Scan-wide options. Passed by reference through every orchestration
/// call and never mutated mid-scan.
#[derive(Debug, Clone)]
pub struct Config {
    /// Per-probe budget, enforced by the probe runner.
    pub default_timeout: Duration,
    /// Restrict the scan to default-port heuristics only.
    pub fast_mode: bool,
    /// Emit per-probe diagnostics through `tracing`.
    pub verbose: bool,
    /// Select the UDP path in `scan_targets`.
    pub udp: bool,
    /// `socks5://host:port` to tunnel TCP/TLS through; `None` = direct.
    pub proxy: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(2),
            fast_mode: false,
            verbose: false,
            udp: false,
            proxy: None,
        }
    }
}

/// Shared slots the slow-lane racers report into. One mutex guards both;
/// the launch loop only consults the `halt` flag.
struct RaceState {
    winner: Option<Service>,
    last_error: Option<ScanError>,
}

/// Scan engine for one configuration. Cheap to construct; one instance
/// can serve many concurrent `scan_target` calls.
pub struct Scanner {
    config: Config,
    dialer: Dialer,
    registry: Arc<Registry>,
}

impl Scanner {
    /// Build a scanner over the process-wide plugin registry. Fails if
    /// the configured proxy URL is malformed or not socks5, before any
    /// network I/O.
    pub fn new(config: Config) -> Result<Self, ScanError> {
        Self::with_registry(config, Registry::global())
    }

    /// Build a scanner over an explicit registry.
    pub fn with_registry(config: Config, registry: Arc<Registry>) -> Result<Self, ScanError> {
        let dialer = Dialer::new(config.proxy.as_deref())?;
        Ok(Self {
            config,
            dialer,
            registry,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Apply the single-target entry point across a collection, using
    /// the UDP path when the config selects it. Per-target failures are
    /// logged and skipped; the batch itself does not fail.
    pub async fn scan_targets(&self, targets: &[Target]) -> Result<Vec<Service>, ScanError> {
        let mut results = Vec::new();
        for target in targets {
            let outcome = if self.config.udp {
                self.scan_target_udp(target).await
            } else {
                self.scan_target(target).await
            };
            match outcome {
                Ok(Some(service)) => results.push(service),
                Ok(None) => {}
                Err(err) => {
                    if self.config.verbose {
                        warn!(endpoint = %target, error = %err, "scan failed");
                    }
                }
            }
        }
        Ok(results)
    }

    /// Identify the service on a TCP endpoint, upgrading to TLS when the
    /// target accepts a handshake. At most one service is returned.
    pub async fn scan_target(&self, target: &Target) -> Result<Option<Service>, ScanError> {
        let port = target.port();
        let mut last_error: Option<ScanError> = None;

        // Fast lane, plaintext: default-port plugins in priority order,
        // a fresh connection per attempt.
        for plugin in self.registry.plugins(Transport::Tcp) {
            if !plugin.default_port(port) {
                continue;
            }
            let conn = self.dialer.tcp(target).await?;
            match run_plugin(conn, target, &self.config, plugin).await {
                Ok(Some(service)) => return Ok(Some(service)),
                Ok(None) => {}
                Err(err) => {
                    if self.config.verbose {
                        warn!(
                            endpoint = %target,
                            plugin = %plugin_id(plugin.as_ref()),
                            error = %err,
                            "probe failed"
                        );
                    }
                    last_error = Some(err);
                }
            }
        }

        // One handshake decides whether the rest of this scan speaks TLS.
        let mut tls_conn = self.dialer.tls(target).await.ok();
        let is_tls = tls_conn.is_some();

        if is_tls {
            for plugin in self.registry.plugins(Transport::Tls) {
                if !plugin.default_port(port) {
                    continue;
                }
                // A probe may have consumed or corrupted the previous
                // stream, so each attempt gets a fresh handshake.
                let conn = match tls_conn.take() {
                    Some(conn) => conn,
                    None => self.dialer.tls(target).await?,
                };
                match run_plugin(conn, target, &self.config, plugin).await {
                    Ok(Some(service)) => return Ok(Some(service)),
                    Ok(None) => {}
                    Err(err) => {
                        if self.config.verbose {
                            warn!(
                                endpoint = %target,
                                plugin = %plugin_id(plugin.as_ref()),
                                error = %err,
                                "probe failed"
                            );
                        }
                        last_error = Some(err);
                    }
                }
            }
        }

        // Fast mode only consults the default-port heuristics.
        if self.config.fast_mode {
            return Ok(None);
        }

        let transport = if is_tls { Transport::Tls } else { Transport::Tcp };
        self.slow_lane(target, transport, last_error).await
    }

    /// Race every plugin of the detected transport class, at most
    /// `MAX_IN_FLIGHT` at a time. The first successful match wins;
    /// racers already in flight when a winner lands run to completion
    /// and their outcomes are discarded.
    async fn slow_lane(
        &self,
        target: &Target,
        transport: Transport,
        last_error: Option<ScanError>,
    ) -> Result<Option<Service>, ScanError> {
        let state = Arc::new(Mutex::new(RaceState {
            winner: None,
            last_error,
        }));
        let halt = Arc::new(AtomicBool::new(false));
        let semaphore = Arc::new(Semaphore::new(MAX_IN_FLIGHT));
        let mut racers = Vec::new();

        for plugin in self.registry.plugins(transport) {
            // Best-effort early exit: a winner may land between this
            // check and the launch, costing one extra discarded probe.
            if halt.load(Ordering::Relaxed) {
                break;
            }

            let permit = semaphore.clone().acquire_owned().await.unwrap();
            let plugin = Arc::clone(plugin);
            let target = target.clone();
            let config = self.config.clone();
            let dialer = self.dialer.clone();
            let state = Arc::clone(&state);
            let halt = Arc::clone(&halt);
            let use_tls = transport == Transport::Tls;

            racers.push(tokio::spawn(async move {
                let _permit = permit;

                let conn = if use_tls {
                    dialer.tls(&target).await
                } else {
                    dialer.tcp(&target).await
                };
                let conn = match conn {
                    Ok(conn) => conn,
                    Err(err) => {
                        // A dead transport stops the launch loop; racers
                        // already running still get to report.
                        state.lock().unwrap().last_error = Some(err);
                        halt.store(true, Ordering::Relaxed);
                        return;
                    }
                };

                match run_plugin(conn, &target, &config, &plugin).await {
                    Ok(Some(service)) => {
                        let mut state = state.lock().unwrap();
                        if state.winner.is_none() {
                            state.winner = Some(service);
                        }
                        drop(state);
                        halt.store(true, Ordering::Relaxed);
                    }
                    Ok(None) => {}
                    Err(err) => {
                        // Probe failures never stop the race; they are
                        // only retained in case nothing ever matches.
                        if config.verbose {
                            warn!(
                                endpoint = %target,
                                plugin = %plugin_id(plugin.as_ref()),
                                error = %err,
                                "probe failed"
                            );
                        }
                        state.lock().unwrap().last_error = Some(err);
                    }
                }
            }));
        }

        join_all(racers).await;

        let mut state = state.lock().unwrap();
        if let Some(service) = state.winner.take() {
            return Ok(Some(service));
        }
        match state.last_error.take() {
            Some(err) => Err(err),
            None => Ok(None),
        }
    }

    /// Identify the service on a UDP endpoint. Fully sequential: the
    /// default-port fast lane, then (unless fast mode) every UDP plugin
    /// with a fresh socket per attempt.
    pub async fn scan_target_udp(&self, target: &Target) -> Result<Option<Service>, ScanError> {
        let port = target.port();
        let mut last_error: Option<ScanError> = None;

        for plugin in self.registry.plugins(Transport::Udp) {
            if !plugin.default_port(port) {
                continue;
            }
            let conn = self.dialer.udp(target).await?;
            match run_plugin(conn, target, &self.config, plugin).await {
                Ok(Some(service)) => return Ok(Some(service)),
                Ok(None) => {}
                Err(err) => {
                    if self.config.verbose {
                        warn!(
                            endpoint = %target,
                            plugin = %plugin_id(plugin.as_ref()),
                            error = %err,
                            "probe failed"
                        );
                    }
                    last_error = Some(err);
                }
            }
        }

        if self.config.fast_mode {
            return Ok(None);
        }

        for plugin in self.registry.plugins(Transport::Udp) {
            let conn = self.dialer.udp(target).await?;
            match run_plugin(conn, target, &self.config, plugin).await {
                Ok(Some(service)) => return Ok(Some(service)),
                Ok(None) => {}
                Err(err) => {
                    if self.config.verbose {
                        warn!(
                            endpoint = %target,
                            plugin = %plugin_id(plugin.as_ref()),
                            error = %err,
                            "probe failed"
                        );
                    }
                    last_error = Some(err);
                }
            }
        }

        match last_error {
            Some(err) => Err(err),
            None => Ok(None),
        }
    }
}
