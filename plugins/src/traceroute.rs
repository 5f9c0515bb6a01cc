//! Route discovery via the system `traceroute`.

use std::net::IpAddr;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use netprobe_common::{ParameterValues, Payload};
use netprobe_core::fallback::{ProbeCategory, Simulator, resolve};
use netprobe_core::normalize::OutputParser;
use netprobe_core::{ExecError, ExecutionContext, Invocation, PluginExecutor, Runner, SystemRunner};
use rand::Rng;
use regex::Regex;
use serde_json::{Value, json};

use crate::support::{check_host, object, round2, seconds};

static RTT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"([\d.]+)\s*ms").expect("rtt regex"));

pub struct Traceroute {
    runner: Arc<dyn Runner>,
}

impl Traceroute {
    pub fn new(runner: Arc<dyn Runner>) -> Self {
        Self { runner }
    }
}

impl Default for Traceroute {
    fn default() -> Self {
        Self::new(Arc::new(SystemRunner))
    }
}

/// One line of `traceroute -n` output, or `None` for headers and noise.
fn parse_hop(line: &str) -> Option<Value> {
    let mut words = line.split_whitespace();
    let hop: u32 = words.next()?.parse().ok()?;

    let responder: Option<&str> = words.find(|word| *word != "*" && word.parse::<IpAddr>().is_ok());

    let Some(host) = responder else {
        return Some(json!({ "hop": hop, "host": "*", "rtt": Value::Null, "status": "NO RESPONSE" }));
    };

    let rtt: Option<f64> = RTT
        .captures(line)
        .and_then(|caps| caps[1].parse::<f64>().ok());

    Some(json!({ "hop": hop, "host": host, "rtt": rtt, "status": "OK" }))
}

struct TracerouteParser;

impl OutputParser for TracerouteParser {
    fn extract_patterns(&self, text: &str) -> Option<Payload> {
        let hops: Vec<Value> = text.lines().filter_map(parse_hop).collect();
        if hops.is_empty() {
            return None;
        }
        Some(object(json!({ "hops": hops })))
    }
}

struct TracerouteSimulator {
    host: String,
    max_hops: u32,
}

impl Simulator for TracerouteSimulator {
    fn simulate<R: Rng + ?Sized>(&self, rng: &mut R) -> Payload {
        let total: u32 = rng.random_range(5..=15).min(self.max_hops.max(1));
        let mut rtt: f64 = rng.random_range(0.5..3.0);
        let mut hops: Vec<Value> = Vec::with_capacity(total as usize);

        for hop in 1..=total {
            if hop == total {
                rtt += rng.random_range(1.0..10.0);
                hops.push(json!({ "hop": hop, "host": self.host, "rtt": round2(rtt), "status": "OK" }));
            } else if rng.random_bool(0.15) {
                hops.push(json!({ "hop": hop, "host": "*", "rtt": Value::Null, "status": "NO RESPONSE" }));
            } else {
                rtt += rng.random_range(1.0..10.0);
                let router = format!("10.{}.{}.1", rng.random_range(0..=255), hop);
                hops.push(json!({ "hop": hop, "host": router, "rtt": round2(rtt), "status": "OK" }));
            }
        }

        object(json!({ "hops": hops }))
    }
}

#[async_trait]
impl PluginExecutor for Traceroute {
    async fn execute(&self, ctx: &ExecutionContext, params: &ParameterValues) -> Result<Payload, ExecError> {
        let host: &str = check_host("host", params.require_text("host")?)?;
        let max_hops: i64 = params.integer("maxHops").unwrap_or(30);
        let wait: i64 = params.integer("waitTime").unwrap_or(3);
        let timeout: Duration = seconds(params, "timeout", 90.0);

        let invocation = Invocation::new("traceroute")
            .arg("-n")
            .arg("-m")
            .arg(max_hops.to_string())
            .arg("-w")
            .arg(wait.to_string())
            .arg(host)
            .deadline(ctx.config.deadline(timeout));

        let outcome = self.runner.run(invocation).await;
        let simulator = TracerouteSimulator {
            host: host.to_string(),
            max_hops: max_hops.clamp(1, 64) as u32,
        };
        let resolved = resolve(
            "traceroute",
            &outcome,
            &TracerouteParser,
            &simulator,
            ProbeCategory::Inventory,
            &mut rand::rng(),
        );

        let mut payload: Payload = resolved.into_payload();
        payload.insert("host".into(), Value::String(host.to_string()));
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
