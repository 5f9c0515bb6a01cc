//! ICMP echo via the system `ping`.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use netprobe_common::{NormalizedResult, ParameterValues, Payload};
use netprobe_core::fallback::{ProbeCategory, Resolved, Simulator, connectivity_latency, resolve};
use netprobe_core::normalize::OutputParser;
use netprobe_core::{ExecError, ExecutionContext, Invocation, PluginExecutor, Runner, SystemRunner};
use rand::Rng;
use regex::Regex;
use serde_json::{Value, json};
use tracing::debug;

use crate::support::{check_host, object, round2, seconds, seconds_arg};

static TRANSMITTED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+) packets transmitted, (\d+) (?:packets )?received").expect("transmitted regex")
});
static LOSS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"([\d.]+)% packet loss").expect("loss regex"));
static RTT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:rtt|round-trip) min/avg/max/(?:mdev|stddev) = ([\d.]+)/([\d.]+)/([\d.]+)/([\d.]+)")
        .expect("rtt regex")
});

/// Moves simulated `timeMin`/`timeMax` around a measured average, keeping
/// their distance from the simulated one.
fn anchor_times(fields: &mut Payload, latency: f64) {
    let time = |key: &str| fields.get(key).and_then(Value::as_f64);
    let (Some(min), Some(avg), Some(max)) = (time("timeMin"), time("timeAvg"), time("timeMax")) else {
        return;
    };

    let low: f64 = (latency - (avg - min).max(0.0)).max(0.0);
    let high: f64 = latency + (max - avg).max(0.0);
    fields.insert("timeMin".into(), json!(round2(low)));
    fields.insert("timeMax".into(), json!(round2(high)));
}

pub struct Ping {
    runner: Arc<dyn Runner>,
}

impl Ping {
    pub fn new(runner: Arc<dyn Runner>) -> Self {
        Self { runner }
    }
}

impl Default for Ping {
    fn default() -> Self {
        Self::new(Arc::new(SystemRunner))
    }
}

struct PingParser;

impl OutputParser for PingParser {
    fn extract_patterns(&self, text: &str) -> Option<Payload> {
        let mut fields = Payload::new();

        if let Some(caps) = TRANSMITTED.captures(text) {
            fields.insert("transmitted".into(), json!(caps[1].parse::<u64>().ok()?));
            fields.insert("received".into(), json!(caps[2].parse::<u64>().ok()?));
        }
        if let Some(caps) = LOSS.captures(text) {
            fields.insert("packetLoss".into(), json!(caps[1].parse::<f64>().ok()?));
        }
        if let Some(caps) = RTT.captures(text) {
            for (index, key) in ["timeMin", "timeAvg", "timeMax", "timeStdDev"].into_iter().enumerate() {
                fields.insert(key.into(), json!(caps[index + 1].parse::<f64>().ok()?));
            }
        }

        if fields.is_empty() {
            return None;
        }
        fields.insert("rawOutput".into(), Value::String(text.to_string()));
        Some(fields)
    }
}

struct PingSimulator {
    count: u64,
}

impl Simulator for PingSimulator {
    fn simulate<R: Rng + ?Sized>(&self, rng: &mut R) -> Payload {
        let avg: f64 = rng.random_range(15.0..60.0);
        let min: f64 = avg * rng.random_range(0.6..0.95);
        let max: f64 = avg * rng.random_range(1.05..1.6);
        let lost: u64 = if self.count > 1 && rng.random_bool(0.1) { 1 } else { 0 };
        let received: u64 = self.count - lost;

        object(json!({
            "transmitted": self.count,
            "received": received,
            "packetLoss": round2(lost as f64 / self.count.max(1) as f64 * 100.0),
            "timeMin": round2(min),
            "timeAvg": round2(avg),
            "timeMax": round2(max),
            "timeStdDev": round2((max - min) / 4.0),
        }))
    }
}

#[async_trait]
impl PluginExecutor for Ping {
    async fn execute(&self, ctx: &ExecutionContext, params: &ParameterValues) -> Result<Payload, ExecError> {
        let host: &str = check_host("host", params.require_text("host")?)?;
        let count: i64 = params.integer("count").unwrap_or(4);
        let interval: f64 = params.number("interval").unwrap_or(1.0);
        let size: i64 = params.integer("size").unwrap_or(56);
        let timeout: Duration = seconds(params, "timeout", 20.0);

        let invocation = Invocation::new("ping")
            .args(["-n", "-c"])
            .arg(count.to_string())
            .arg("-i")
            .arg(seconds_arg(interval))
            .arg("-s")
            .arg(size.to_string())
            .arg(host)
            .accept_exit_codes(&[0, 1])
            .deadline(ctx.config.deadline(timeout));

        let outcome = self.runner.run(invocation).await;
        let simulator = PingSimulator { count: count.max(1) as u64 };
        let mut resolved: Resolved = resolve(
            "ping",
            &outcome,
            &PingParser,
            &simulator,
            ProbeCategory::Measurement,
            &mut rand::rng(),
        );

        if resolved.is_simulated() {
            match connectivity_latency(host, Duration::from_secs(2)).await {
                Some(latency) => {
                    if let NormalizedResult::Simulated { fields, .. } = &mut resolved.result {
                        anchor_times(fields, latency);
                    }
                    resolved.substitute_real("timeAvg", json!(latency), "tcp connect");
                }
                None => debug!(host, "no tcp latency available for simulated ping"),
            }
        }

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
