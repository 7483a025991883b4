use std::io;
use std::net::{IpAddr, SocketAddr};
use std::time::Instant;
use time::OffsetDateTime;
use tokio::net::lookup_host;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{Result, ScanError};
use crate::external::ExternalEngine;
use crate::ports::{parse_port_spec, PortSet};
use crate::scan_log::ScanLog;
use crate::scanner::probe_ports_with_cancel;
use crate::types::{Engine, ScanOptions, ScanResult};

/// Runs one scan request end to end: validate, parse, pick an engine,
/// execute, then record the result in the scan log.
pub struct ScanCoordinator<E> {
    external: E,
    log: ScanLog,
}

struct EngineOutcome {
    engine: Engine,
    open_ports: Vec<u16>,
    partial: bool,
    exit_code: Option<i32>,
}

impl<E: ExternalEngine> ScanCoordinator<E> {
    pub fn new(external: E, log: ScanLog) -> Self {
        Self { external, log }
    }

    pub fn log(&self) -> &ScanLog {
        &self.log
    }

    pub fn external(&self) -> &E {
        &self.external
    }

    /// Scan `target` on the ports named by `port_spec`.
    pub async fn scan(
        &self,
        target: &str,
        port_spec: &str,
        options: &ScanOptions,
    ) -> Result<ScanResult> {
        self.scan_with_cancel(target, port_spec, options, CancellationToken::new())
            .await
    }

    /// Variant that accepts a `CancellationToken`; cancelling yields a
    /// `partial` result rather than an error.
    pub async fn scan_with_cancel(
        &self,
        target: &str,
        port_spec: &str,
        options: &ScanOptions,
        cancel: CancellationToken,
    ) -> Result<ScanResult> {
        let target = target.trim();
        if target.is_empty() {
            return Err(ScanError::EmptyTarget);
        }
        if target.chars().any(|c| c.is_control() || c.is_whitespace()) {
            return Err(ScanError::InvalidTarget(target.to_string()));
        }
        options.validate()?;

        let parsed = parse_port_spec(port_spec);
        if parsed.dropped > 0 {
            warn!(dropped = parsed.dropped, "ignored invalid port tokens");
        }

        let started_at = OffsetDateTime::now_utc();
        let clock = Instant::now();

        // An empty set never touches the network, not even for DNS.
        let outcome = if parsed.ports.is_empty() {
            info!(host = %target, "no valid ports requested; skipping scan");
            EngineOutcome {
                engine: Engine::InternalSocket,
                open_ports: Vec::new(),
                partial: false,
                exit_code: None,
            }
        } else {
            let addr = resolve_target(target).await?;
            self.run_engine(target, addr, &parsed.ports, options, &cancel)
                .await
        };

        let result = ScanResult {
            target: target.to_string(),
            engine_used: outcome.engine,
            open_ports: outcome.open_ports,
            started_at,
            duration: clock.elapsed(),
            partial: outcome.partial,
            ports_requested: parsed.ports.len(),
            dropped_tokens: parsed.dropped,
            external_exit_code: outcome.exit_code,
        };
        info!(
            host = %result.target,
            engine = %result.engine_used,
            open = result.open_ports.len(),
            partial = result.partial,
            elapsed_ms = result.duration.as_millis() as u64,
            "scan finished"
        );

        self.log.append(&result);
        Ok(result)
    }

    async fn run_engine(
        &self,
        target: &str,
        addr: IpAddr,
        ports: &PortSet,
        options: &ScanOptions,
        cancel: &CancellationToken,
    ) -> EngineOutcome {
        if options.prefer_external_engine {
            if self.external.is_available().await {
                match self
                    .external
                    .run(target, ports, &options.external_args, cancel)
                    .await
                {
                    Ok(run) => {
                        return EngineOutcome {
                            engine: Engine::External,
                            open_ports: Vec::new(),
                            partial: run.cancelled,
                            exit_code: run.exit_code,
                        }
                    }
                    Err(e) => warn!(
                        engine = self.external.name(),
                        error = %e,
                        "external engine failed to start; using internal prober"
                    ),
                }
            } else {
                info!(
                    engine = self.external.name(),
                    "external engine not available; using internal prober"
                );
            }
        }

        let probe = probe_ports_with_cancel(addr, ports, options, cancel.clone()).await;
        EngineOutcome {
            engine: Engine::InternalSocket,
            open_ports: probe.open_ports,
            partial: probe.partial,
            exit_code: None,
        }
    }
}

/// Resolve `target` to a single address, preferring IPv4.
///
/// IP literals (including bracketed IPv6) skip DNS entirely.
pub async fn resolve_target(target: &str) -> Result<IpAddr> {
    let host = target.trim_start_matches('[').trim_end_matches(']');
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(ip);
    }

    let addrs: Vec<SocketAddr> = lookup_host((host, 0))
        .await
        .map_err(|source| ScanError::Resolution {
            target: target.to_string(),
            source,
        })?
        .collect();

    addrs
        .iter()
        .find(|a| a.is_ipv4())
        .or_else(|| addrs.first())
        .map(|a| a.ip())
        .ok_or_else(|| ScanError::Resolution {
            target: target.to_string(),
            source: io::Error::new(io::ErrorKind::NotFound, "no addresses returned"),
        })
}
