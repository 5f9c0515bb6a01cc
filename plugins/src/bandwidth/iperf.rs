use std::time::Duration;

use netprobe_common::Payload;
use netprobe_core::Invocation;
use netprobe_core::fallback::Simulator;
use netprobe_core::normalize::OutputParser;
use rand::Rng;
use serde_json::{Value, json};

use super::speeds_mbps;
use crate::support::{object, round2};

const MAX_SIMULATED_INTERVALS: u32 = 20;

#[derive(Debug, Clone)]
pub struct IperfOptions {
    pub server: String,
    pub port: u16,
    pub udp: bool,
    pub reverse: bool,
    pub parallel: u32,
    pub duration: u32,
}

impl IperfOptions {
    pub fn invocation(&self, deadline: Duration) -> Invocation {
        let mut invocation = Invocation::new("iperf3")
            .arg("-c")
            .arg(self.server.as_str())
            .arg("-p")
            .arg(self.port.to_string())
            .arg("-t")
            .arg(self.duration.to_string())
            .arg("-J")
            .arg("-P")
            .arg(self.parallel.to_string())
            .deadline(deadline);
        if self.udp {
            invocation = invocation.arg("-u");
        }
        if self.reverse {
            invocation = invocation.arg("-R");
        }
        invocation
    }

    /// Run settings echoed back in the payload.
    pub fn settings(&self) -> Payload {
        object(json!({
            "server": self.server,
            "port": self.port,
            "protocol": if self.udp { "udp" } else { "tcp" },
            "duration": self.duration,
            "parallel": self.parallel,
            "reverse": self.reverse,
        }))
    }
}

/// Splits one measured rate into the download/upload pair.
fn directional(mbps: f64, reverse: bool) -> (f64, f64) {
    if reverse { (round2(mbps), 0.0) } else { (0.0, round2(mbps)) }
}

pub struct IperfParser {
    pub reverse: bool,
}

impl OutputParser for IperfParser {
    fn parse_structured(&self, document: &Value) -> Option<Payload> {
        let end: &Value = document.get("end")?;
        let summary: &Value = end.get("sum_received").or_else(|| end.get("sum"))?;
        let mbps: f64 = summary.get("bits_per_second")?.as_f64()? / 1_000_000.0;
        let (download, upload) = directional(mbps, self.reverse);

        let mut fields: Payload = object(json!({
            "downloadSpeed": download,
            "uploadSpeed": upload,
        }));

        if let Some(retransmits) = end.pointer("/sum_sent/retransmits").and_then(Value::as_u64) {
            fields.insert("retransmits".into(), json!(retransmits));
        }
        if let Some(jitter) = summary.get("jitter_ms").and_then(Value::as_f64) {
            fields.insert("jitter".into(), json!(round2(jitter)));
        }
        if let Some(lost) = summary.get("lost_percent").and_then(Value::as_f64) {
            fields.insert("packetLoss".into(), json!(round2(lost)));
        }

        let intervals: Vec<Value> = document
            .get("intervals")
            .and_then(Value::as_array)
            .map(|intervals| {
                intervals
                    .iter()
                    .filter_map(|interval| {
                        let sum = interval.get("sum")?;
                        let time = sum.get("end")?.as_f64()?;
                        let bps = sum.get("bits_per_second")?.as_f64()?;
                        Some(json!({ "time": round2(time), "bandwidth": round2(bps / 1_000_000.0) }))
                    })
                    .collect()
            })
            .unwrap_or_default();
        fields.insert("intervals".into(), Value::Array(intervals));

        Some(fields)
    }

    /// Uses the receiver summary line when present, else the last rate seen.
    fn extract_patterns(&self, text: &str) -> Option<Payload> {
        let receiver: Option<f64> = text
            .lines()
            .filter(|line| line.contains("receiver"))
            .filter_map(|line| speeds_mbps(line).last().copied())
            .last();
        let mbps: f64 = receiver.or_else(|| speeds_mbps(text).last().copied())?;
        let (download, upload) = directional(mbps, self.reverse);

        Some(object(json!({
            "downloadSpeed": download,
            "uploadSpeed": upload,
            "intervals": [],
        })))
    }
}

pub struct IperfSimulator {
    pub options: IperfOptions,
}

impl Simulator for IperfSimulator {
    fn simulate<R: Rng + ?Sized>(&self, rng: &mut R) -> Payload {
        let mbps: f64 = rng.random_range(50.0..150.0);
        let (download, upload) = directional(mbps, self.options.reverse);
        let points: u32 = self.options.duration.clamp(1, MAX_SIMULATED_INTERVALS);

        let intervals: Vec<Value> = (1..=points)
            .map(|i| {
                let time: f64 = f64::from(i) * f64::from(self.options.duration) / f64::from(points);
                json!({ "time": round2(time), "bandwidth": round2(mbps * rng.random_range(0.8..1.2)) })
            })
            .collect();

        let mut fields: Payload = object(json!({
            "downloadSpeed": download,
            "uploadSpeed": upload,
            "intervals": intervals,
        }));
        if self.options.udp {
            fields.insert("jitter".into(), json!(round2(rng.random_range(0.1..2.0))));
            fields.insert("packetLoss".into(), json!(round2(rng.random_range(0.0..1.0))));
        } else {
            fields.insert("retransmits".into(), json!(rng.random_range(0..20)));
        }
        fields
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
