use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::ports::PortSet;
use crate::types::ScanOptions;

/// What the internal engine found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeOutcome {
    /// Ascending, regardless of completion order.
    pub open_ports: Vec<u16>,
    /// Set when cancellation stopped the scan before every port was tried.
    pub partial: bool,
    /// Number of connect attempts that actually ran.
    pub probed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PortState {
    Open,
    NotOpen,
    Skipped,
}

/// Probe every port in `ports` on `addr` with bounded concurrency.
pub async fn probe_ports(addr: IpAddr, ports: &PortSet, options: &ScanOptions) -> ProbeOutcome {
    probe_ports_with_cancel(addr, ports, options, CancellationToken::new()).await
}

/// Variant that stops submitting work once `cancel` fires.
///
/// - Limits concurrent sockets using a `Semaphore` sized `max_concurrency`.
/// - Uses `tokio::time::timeout` to bound each connect to `timeout_per_port`.
/// - One attempt per port; refused, timed out and unreachable all count as not open.
/// - In-flight connects are joined after cancellation; each is bounded by its timeout.
pub async fn probe_ports_with_cancel(
    addr: IpAddr,
    ports: &PortSet,
    options: &ScanOptions,
    cancel: CancellationToken,
) -> ProbeOutcome {
    if ports.is_empty() {
        return ProbeOutcome::default();
    }

    let timeout = options.timeout_per_port;
    let sem = Arc::new(Semaphore::new(options.max_concurrency.clamp(1, Semaphore::MAX_PERMITS)));
    let mut set = JoinSet::new();

    for port in ports.iter() {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            permit = sem.clone().acquire_owned() => match permit {
                Ok(p) => p,
                Err(_) => break,
            },
        };
        let cancel = cancel.clone();

        set.spawn(async move {
            let _permit = permit; // held until the connect attempt finishes
            if cancel.is_cancelled() {
                return (port, PortState::Skipped);
            }
            (port, connect_once(SocketAddr::new(addr, port), timeout).await)
        });
    }

    let mut open_ports = Vec::new();
    let mut probed = 0usize;
    while let Some(res) = set.join_next().await {
        match res {
            Ok((port, PortState::Open)) => {
                probed += 1;
                info!(%addr, port, "port open");
                open_ports.push(port);
            }
            Ok((_, PortState::NotOpen)) => probed += 1,
            Ok((_, PortState::Skipped)) => {}
            Err(e) => debug!(%addr, error = %e, "probe task aborted"),
        }
    }

    open_ports.sort_unstable();
    ProbeOutcome {
        open_ports,
        partial: cancel.is_cancelled() && probed < ports.len(),
        probed,
    }
}

/// Cancel `token` when the terminal sends an interrupt.
pub fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });
}

async fn connect_once(addr: SocketAddr, timeout: Duration) -> PortState {
    match time::timeout(timeout, TcpStream::connect(addr)).await {
        // Dropping the stream closes it without exchanging data.
        Ok(Ok(_stream)) => PortState::Open,
        Ok(Err(e)) => {
            trace!(%addr, error = %e, "connect failed");
            PortState::NotOpen
        }
        Err(_) => {
            trace!(%addr, "connect timed out");
            PortState::NotOpen
        }
    }
}
