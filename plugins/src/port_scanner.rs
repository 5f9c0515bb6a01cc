//! # Port Scanner
//!
//! TCP connect scan of one host. Each port is a fan-out target, probed with a
//! per-port timeout and bounded by the `concurrency` parameter (itself clamped
//! by the process-wide ceiling).
//!
//! A port that answers with a reset is closed; one that never answers is
//! filtered. Filtered ports are reported separately but also count toward
//! `closedPorts`, which is always `totalPorts - open`.

use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use netprobe_common::network::target::PortSpec;
use netprobe_common::{ParameterValues, Payload, ValidationError};
use netprobe_core::fanout::percentage;
use netprobe_core::{ExecError, ExecutionContext, FanOut, PluginExecutor};
use netprobe_protocols::tcp::{self, PortState};
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::support::{check_host, object, round2, seconds};

/// How ports are reached. Swapped out in tests.
#[async_trait]
pub trait PortProber: Send + Sync + 'static {
    async fn resolve(&self, host: &str) -> Option<IpAddr>;
    async fn probe(&self, addr: SocketAddr, timeout: Duration) -> PortState;
}

/// Plain TCP connects through the OS stack.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpProber;

#[async_trait]
impl PortProber for TcpProber {
    async fn resolve(&self, host: &str) -> Option<IpAddr> {
        tcp::resolve(host).await
    }

    async fn probe(&self, addr: SocketAddr, timeout: Duration) -> PortState {
        tcp::connect_probe(addr, timeout).await
    }
}

pub struct PortScanner {
    prober: Arc<dyn PortProber>,
}

impl PortScanner {
    pub fn new(prober: Arc<dyn PortProber>) -> Self {
        Self { prober }
    }
}

impl Default for PortScanner {
    fn default() -> Self {
        Self::new(Arc::new(TcpProber))
    }
}

#[async_trait]
impl PluginExecutor for PortScanner {
    async fn execute(&self, ctx: &ExecutionContext, params: &ParameterValues) -> Result<Payload, ExecError> {
        let host: &str = check_host("host", params.require_text("host")?)?;
        let range: &str = params.require_text("portRange")?;
        let ports: Vec<u16> = PortSpec::from_str(range)
            .map_err(|e| ValidationError::invalid("portRange", e))?
            .expand();
        let per_port: Duration = seconds(params, "timeout", 1.0);
        let requested: usize = params.integer("concurrency").unwrap_or(50).max(1) as usize;
        let ceiling: usize = ctx.config.ceiling(requested);
        let total: usize = ports.len();

        let started: Instant = Instant::now();
        let mut payload: Payload = object(json!({
            "host": host,
            "portRange": range,
            "totalPorts": total,
            "concurrency": ceiling,
        }));

        let Some(addr) = self.prober.resolve(host).await else {
            warn!(host, "could not resolve host, counting every port closed");
            payload.extend(object(json!({
                "openPorts": [],
                "closedPorts": total,
                "filteredPorts": 0,
                "openPercentage": 0.0,
                "scanTime": round2(started.elapsed().as_secs_f64()),
                "error": format!("could not resolve host '{host}'"),
            })));
            return Ok(payload);
        };

        info!(host, %addr, ports = total, ceiling, "scanning");

        let prober = self.prober.clone();
        let aggregate = FanOut::new(ceiling)
            .run(ports, move |port: u16| {
                let prober = prober.clone();
                async move { prober.probe(SocketAddr::new(addr, port), per_port).await }
            })
            .await
            .map_err(|e| ExecError::Internal(e.to_string()))?;

        let mut open: Vec<Value> = Vec::new();
        let mut filtered: usize = 0;
        for (port, slot) in aggregate.iter() {
            match slot {
                Ok(PortState::Open { latency }) => open.push(json!({
                    "port": port,
                    "service": ctx.catalog.service_name(*port),
                    "status": "open",
                    "latencyMs": round2(latency.as_secs_f64() * 1000.0),
                })),
                Ok(PortState::Filtered) => filtered += 1,
                Ok(PortState::Closed) => {}
                Err(failure) => warn!(port, "{failure}"),
            }
        }

        let open_count: usize = open.len();
        payload.extend(object(json!({
            "openPorts": open,
            "closedPorts": total - open_count,
            "filteredPorts": filtered,
            "openPercentage": round2(percentage(open_count, total)),
            "scanTime": round2(started.elapsed().as_secs_f64()),
        })));
        Ok(payload)
    }
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
