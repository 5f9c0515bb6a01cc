use std::f64::consts::FRAC_PI_2;
use std::sync::LazyLock;
use std::time::Duration;

use netprobe_common::Payload;
use netprobe_core::Invocation;
use netprobe_core::fallback::Simulator;
use netprobe_core::normalize::OutputParser;
use rand::Rng;
use regex::Regex;
use serde_json::{Value, json};

use super::speeds_mbps;
use crate::support::{object, round2};

/// Region choices mapped to speedtest.net server ids.
pub const SERVERS: [(&str, u32); 4] = [
    ("us-west", 18282),
    ("us-east", 10390),
    ("eu-central", 28922),
    ("asia-east", 29106),
];

const CHART_POINTS: u32 = 6;

static PING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*(?:ping|latency):\s*([\d.]+)\s*ms").expect("ping regex"));

pub fn server_id(region: &str) -> Option<u32> {
    SERVERS.iter().find(|(name, _)| *name == region).map(|(_, id)| *id)
}

pub fn invocation(region: &str, deadline: Duration) -> Invocation {
    let mut invocation = Invocation::new("speedtest-cli").arg("--json").deadline(deadline);
    if let Some(id) = server_id(region) {
        invocation = invocation.arg("--server").arg(id.to_string());
    }
    invocation
}

/// Ramp from 70% of the final speed up to the final speed over the run.
pub fn chart(download: f64, upload: f64, duration: u32) -> Value {
    let last: u32 = CHART_POINTS - 1;
    let mut time: Vec<u32> = Vec::new();
    let mut down: Vec<f64> = Vec::new();
    let mut up: Vec<f64> = Vec::new();

    for i in 0..CHART_POINTS {
        let progress: f64 = f64::from(i) / f64::from(last);
        let factor: f64 = if i == last { 1.0 } else { 0.7 + 0.3 * (progress * FRAC_PI_2).sin() };
        time.push(i * duration / last);
        down.push(round2(download * factor));
        up.push(round2(upload * factor));
    }

    json!({ "time": time, "download": down, "upload": up })
}

pub struct SpeedtestParser {
    pub duration: u32,
}

impl SpeedtestParser {
    fn fields(&self, download: f64, upload: f64, latency: Option<f64>) -> Payload {
        let mut fields: Payload = object(json!({
            "downloadSpeed": round2(download),
            "uploadSpeed": round2(upload),
            "packetLoss": 0.0,
            "testDuration": self.duration,
            "chart": chart(download, upload, self.duration),
        }));
        if let Some(latency) = latency {
            fields.insert("latency".into(), json!(round2(latency)));
            fields.insert("jitter".into(), json!(round2(latency * 0.2)));
        }
        fields
    }
}

impl OutputParser for SpeedtestParser {
    fn parse_structured(&self, document: &Value) -> Option<Payload> {
        let download: f64 = document.get("download")?.as_f64()? / 1_000_000.0;
        let upload: f64 = document.get("upload")?.as_f64()? / 1_000_000.0;
        let latency: Option<f64> = document.get("ping").and_then(Value::as_f64);

        let mut fields: Payload = self.fields(download, upload, latency);
        if let Some(server) = document.get("server") {
            let text = |key: &str| server.get(key).and_then(Value::as_str).unwrap_or_default();
            let label: String = match (text("name"), text("country")) {
                ("", _) => text("sponsor").to_string(),
                (name, "") => name.to_string(),
                (name, country) => format!("{name}, {country}"),
            };
            fields.insert("server".into(), Value::String(label));
        }
        Some(fields)
    }

    /// Reads `speedtest-cli --simple` style lines.
    fn extract_patterns(&self, text: &str) -> Option<Payload> {
        let line_speed = |label: &str| {
            text.lines()
                .filter(|line| line.trim_start().to_ascii_lowercase().starts_with(label))
                .find_map(|line| speeds_mbps(line).first().copied())
        };

        let download: Option<f64> = line_speed("download");
        let upload: Option<f64> = line_speed("upload");
        if download.is_none() && upload.is_none() {
            return None;
        }

        let latency: Option<f64> = text
            .lines()
            .find_map(|line| PING.captures(line))
            .and_then(|caps| caps[1].parse().ok());

        Some(self.fields(download.unwrap_or(0.0), upload.unwrap_or(0.0), latency))
    }
}

pub struct SpeedtestSimulator {
    pub server: String,
    pub duration: u32,
}

impl Simulator for SpeedtestSimulator {
    fn simulate<R: Rng + ?Sized>(&self, rng: &mut R) -> Payload {
        let download: f64 = rng.random_range(75.0..125.0);
        let upload: f64 = rng.random_range(8.0..18.0);
        let last: u32 = CHART_POINTS - 1;

        let time: Vec<u32> = (0..CHART_POINTS).map(|i| i * self.duration / last).collect();
        let down: Vec<f64> = (0..CHART_POINTS)
            .map(|_| round2(download * rng.random_range(0.9..1.1)))
            .collect();
        let up: Vec<f64> = (0..CHART_POINTS)
            .map(|_| round2(upload * rng.random_range(0.9..1.1)))
            .collect();

        object(json!({
            "server": self.server,
            "downloadSpeed": round2(download),
            "uploadSpeed": round2(upload),
            "latency": 50.0,
            "jitter": 5.0,
            "packetLoss": round2(rng.random_range(0.0..1.0)),
            "testDuration": self.duration,
            "chart": { "time": time, "download": down, "upload": up },
        }))
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_region_picks_no_server() {
        let auto = invocation("auto", Duration::from_secs(1));
        assert_eq!(auto.command_line(), "speedtest-cli --json");
        assert_eq!(server_id("eu-central"), Some(28922));
    }

    #[test]
    fn chart_ramps_to_final_speed() {
        let chart = chart(100.0, 10.0, 10);
        assert_eq!(chart["time"], json!([0, 2, 4, 6, 8, 10]));
        assert_eq!(chart["download"][0], json!(70.0));
        assert_eq!(chart["download"][5], json!(100.0));
        assert_eq!(chart["upload"][5], json!(10.0));
    }

    #[test]
    fn simple_output_is_understood() {
        let text = "Ping: 21.4 ms\nDownload: 88.10 Mbit/s\nUpload: 9.50 Mbit/s\n";
        let fields = SpeedtestParser { duration: 10 }.extract_patterns(text).unwrap();
        assert_eq!(fields["downloadSpeed"], json!(88.1));
        assert_eq!(fields["uploadSpeed"], json!(9.5));
        assert_eq!(fields["latency"], json!(21.4));
    }

    #[test]
    fn json_without_speeds_is_a_miss() {
        let document = json!({ "type": "log", "message": "Retrieving configuration" });
        assert!(SpeedtestParser { duration: 10 }.parse_structured(&document).is_none());
    }
}
