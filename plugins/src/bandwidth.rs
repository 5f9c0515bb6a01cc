//! # Bandwidth Test
//!
//! Throughput measurement through one of two tools:
//!
//! * **[`speedtest`]**: `speedtest-cli` against a public server, download and
//!   upload in one run.
//! * **[`iperf`]**: `iperf3` against a server the caller names, one direction
//!   per run (`reverse` measures download).
//!
//! Both report the same field names in Mbps. When a run is simulated, the
//! `latency` field is replaced with a real TCP-connect round trip if one can
//! be measured.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use netprobe_common::{NormalizedResult, ParameterValues, Payload, ValidationError};
use netprobe_core::fallback::{ProbeCategory, Resolved, connectivity_latency, resolve};
use netprobe_core::{ExecError, ExecutionContext, PluginExecutor, Runner, SystemRunner};
use regex::Regex;
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::support::{check_host, seconds};

pub mod iperf;
pub mod speedtest;

use iperf::{IperfOptions, IperfParser, IperfSimulator};
use speedtest::{SpeedtestParser, SpeedtestSimulator};

/// Host used for the latency signal when no server is named.
const LATENCY_HOST: &str = "8.8.8.8";

static SPEED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+(?:\.\d+)?)\s*([KMG])bits?/s(?:ec)?").expect("speed regex"));

/// Every throughput figure in `text`, converted to Mbps.
pub(crate) fn speeds_mbps(text: &str) -> Vec<f64> {
    SPEED
        .captures_iter(text)
        .filter_map(|caps| {
            let value: f64 = caps[1].parse().ok()?;
            Some(match &caps[2] {
                "K" => value / 1000.0,
                "G" => value * 1000.0,
                _ => value,
            })
        })
        .collect()
}

pub struct BandwidthTest {
    runner: Arc<dyn Runner>,
}

impl BandwidthTest {
    pub fn new(runner: Arc<dyn Runner>) -> Self {
        Self { runner }
    }
}

impl Default for BandwidthTest {
    fn default() -> Self {
        Self::new(Arc::new(SystemRunner))
    }
}

#[async_trait]
impl PluginExecutor for BandwidthTest {
    async fn execute(&self, ctx: &ExecutionContext, params: &ParameterValues) -> Result<Payload, ExecError> {
        let method: &str = params.text("method").unwrap_or("speedtest");
        let duration: u32 = params.integer("duration").unwrap_or(10).max(1) as u32;
        let deadline: Duration = ctx.config.deadline(seconds(params, "timeout", 90.0));

        let (mut resolved, latency_host): (Resolved, String) = match method {
            "iperf3" => {
                let server: &str = match params.text("iperf_server").filter(|s| !s.is_empty()) {
                    Some(server) => check_host("iperf_server", server)?,
                    None => {
                        return Err(ValidationError::invalid(
                            "iperf_server",
                            "an iperf3 server is required when method is iperf3",
                        )
                        .into());
                    }
                };
                let options = IperfOptions {
                    server: server.to_string(),
                    port: params.integer("port").unwrap_or(5201) as u16,
                    udp: params.text("protocol") == Some("udp"),
                    reverse: params.flag("reverse").unwrap_or(false),
                    parallel: params.integer("parallel").unwrap_or(1).max(1) as u32,
                    duration,
                };
                info!(server, port = options.port, udp = options.udp, "starting iperf3 run");

                let outcome = self.runner.run(options.invocation(deadline)).await;
                let parser = IperfParser { reverse: options.reverse };
                let mut resolved = resolve(
                    "iperf3",
                    &outcome,
                    &parser,
                    &IperfSimulator { options: options.clone() },
                    ProbeCategory::Measurement,
                    &mut rand::rng(),
                );
                merge_settings(&mut resolved, options.settings());
                (resolved, options.server)
            }
            _ => {
                let server: &str = params.text("server").unwrap_or("auto");
                info!(server, "starting speedtest run");

                let outcome = self.runner.run(speedtest::invocation(server, deadline)).await;
                let resolved = resolve(
                    "speedtest-cli",
                    &outcome,
                    &SpeedtestParser { duration },
                    &SpeedtestSimulator { server: server.to_string(), duration },
                    ProbeCategory::Measurement,
                    &mut rand::rng(),
                );
                (resolved, LATENCY_HOST.to_string())
            }
        };

        if resolved.is_simulated() {
            match connectivity_latency(&latency_host, Duration::from_secs(3)).await {
                Some(latency) => {
                    resolved.substitute_real("latency", json!(latency), "tcp connect");
                }
                None => debug!(host = %latency_host, "no tcp latency available for simulated run"),
            }
        }

        let mut payload: Payload = resolved.into_payload();
        payload.insert("method".into(), Value::String(method.to_string()));
        payload.entry("testDuration").or_insert(json!(duration));
        Ok(payload)
    }
}

/// Adds run settings to a structured or simulated result.
fn merge_settings(resolved: &mut Resolved, settings: Payload) {
    let fields: &mut Payload = match &mut resolved.result {
        NormalizedResult::Structured { fields, .. } | NormalizedResult::Simulated { fields, .. } => fields,
        NormalizedResult::RawText { .. } => return,
    };
    for (key, value) in settings {
        fields.entry(key).or_insert(value);
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
