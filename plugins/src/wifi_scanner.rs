//! # WiFi Scanner
//!
//! Lists nearby networks with `iw dev <if> scan`, falling back to
//! `iwlist <if> scanning` when `iw` is missing or fails. Both need root, so
//! they run privileged.
//!
//! With `bring_up`, an interface that is down is set up for the scan and set
//! back down afterwards, through a [`StateScope`] so the second step happens
//! even if the scan is cancelled.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use netprobe_common::network::interface;
use netprobe_common::{InvocationOutcome, ParameterValues, Payload, ValidationError};
use netprobe_core::fallback::{ProbeCategory, Simulator, resolve};
use netprobe_core::normalize::OutputParser;
use netprobe_core::{ExecError, ExecutionContext, Invocation, PluginExecutor, Runner, StateScope, SystemRunner};
use rand::Rng;
use regex::Regex;
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::support::{object, seconds};

const DEFAULT_INTERFACE: &str = "wlan0";

macro_rules! pattern {
    ($name:ident, $re:expr) => {
        static $name: LazyLock<Regex> = LazyLock::new(|| Regex::new($re).expect(stringify!($name)));
    };
}

pattern!(IW_BSS, r"(?m)^BSS ([0-9a-f:]{17})");
pattern!(IW_SSID, r"(?m)^\s*SSID: ?(.*)$");
pattern!(IW_SIGNAL, r"signal: (-?\d+\.\d+) dBm");
pattern!(IW_CHANNEL, r"(?:DS Parameter set: channel|primary channel:) (\d+)");
pattern!(IW_FREQ, r"freq: (\d+)");
pattern!(IW_CAPABILITY, r"capability:.*?(Privacy|IBSS)");
pattern!(IWLIST_CELL, r"Cell \d+ - Address: ([0-9A-Fa-f:]{17})");
pattern!(IWLIST_ESSID, r#"ESSID:"(.*)""#);
pattern!(IWLIST_QUALITY, r"Quality=(\d+)/(\d+)");
pattern!(IWLIST_SIGNAL, r"Signal level=(-?\d+) dBm");
pattern!(IWLIST_CHANNEL, r"Channel:(\d+)");
pattern!(IWLIST_FREQ, r"Frequency:(\d+\.\d+) GHz");
pattern!(IWLIST_KEY, r"Encryption key:(on|off)");

#[derive(Debug, Clone, PartialEq)]
struct Network {
    bssid: String,
    ssid: String,
    signal_dbm: Option<f64>,
    signal_quality: u8,
    channel: Option<u32>,
    frequency: Option<u32>,
    encrypted: bool,
    security: &'static str,
}

impl Network {
    fn is_hidden(&self) -> bool {
        self.ssid.is_empty() || self.ssid.starts_with("\\x00") || self.ssid.chars().all(|c| c == '\0')
    }

    fn to_json(&self) -> Value {
        json!({
            "bssid": self.bssid,
            "ssid": if self.is_hidden() { "<hidden>" } else { self.ssid.as_str() },
            "signal_dbm": self.signal_dbm,
            "signal_quality": self.signal_quality,
            "channel": self.channel,
            "frequency": self.frequency,
            "encrypted": self.encrypted,
            "security": self.security,
        })
    }
}

/// Rough 0-100 quality from a dBm reading.
fn quality_from_dbm(dbm: f64) -> u8 {
    (2.0 * (dbm + 100.0)).clamp(0.0, 100.0).round() as u8
}

fn channel_from_frequency(mhz: u32) -> Option<u32> {
    match mhz {
        2484 => Some(14),
        2412..=2472 => Some((mhz - 2407) / 5),
        5000..=5900 => Some((mhz - 5000) / 5),
        _ => None,
    }
}

fn capture<T: std::str::FromStr>(re: &Regex, text: &str) -> Option<T> {
    re.captures(text).and_then(|caps| caps[1].parse().ok())
}

/// Splits `text` into blocks, each starting at a match of `header`.
fn blocks<'t>(header: &Regex, text: &'t str) -> Vec<(String, &'t str)> {
    let starts: Vec<(usize, String)> = header
        .captures_iter(text)
        .filter_map(|caps| Some((caps.get(0)?.start(), caps[1].to_ascii_lowercase())))
        .collect();

    starts
        .iter()
        .enumerate()
        .map(|(index, (start, bssid))| {
            let end: usize = starts.get(index + 1).map_or(text.len(), |(next, _)| *next);
            (bssid.clone(), &text[*start..end])
        })
        .collect()
}

fn parse_iw(text: &str) -> Vec<Network> {
    blocks(&IW_BSS, text)
        .into_iter()
        .map(|(bssid, block)| {
            let signal_dbm: Option<f64> = capture(&IW_SIGNAL, block);
            let frequency: Option<u32> = capture(&IW_FREQ, block);
            let privacy: bool = IW_CAPABILITY
                .captures_iter(block)
                .any(|caps| &caps[1] == "Privacy");
            let security: &'static str = if block.contains("RSN:") {
                "WPA2"
            } else if block.contains("WPA:") {
                "WPA"
            } else if privacy {
                "WEP"
            } else {
                "Open"
            };

            Network {
                bssid,
                ssid: capture::<String>(&IW_SSID, block).unwrap_or_default().trim_end().to_string(),
                signal_dbm,
                signal_quality: signal_dbm.map_or(0, quality_from_dbm),
                channel: capture(&IW_CHANNEL, block).or_else(|| frequency.and_then(channel_from_frequency)),
                frequency,
                encrypted: security != "Open",
                security,
            }
        })
        .collect()
}

fn parse_iwlist(text: &str) -> Vec<Network> {
    blocks(&IWLIST_CELL, text)
        .into_iter()
        .map(|(bssid, block)| {
            let signal_dbm: Option<f64> = capture(&IWLIST_SIGNAL, block);
            let frequency: Option<u32> = capture::<f64>(&IWLIST_FREQ, block).map(|ghz| (ghz * 1000.0).round() as u32);
            let quality: Option<u8> = IWLIST_QUALITY.captures(block).and_then(|caps| {
                let value: f64 = caps[1].parse().ok()?;
                let scale: f64 = caps[2].parse().ok()?;
                (scale > 0.0).then(|| (value / scale * 100.0).round().clamp(0.0, 100.0) as u8)
            });
            let key_on: bool = capture::<String>(&IWLIST_KEY, block).is_some_and(|key| key == "on");
            let security: &'static str = if block.contains("WPA2") || block.contains("802.11i") {
                "WPA2"
            } else if block.contains("WPA Version") {
                "WPA"
            } else if key_on {
                "WEP"
            } else {
                "Open"
            };

            Network {
                bssid,
                ssid: capture(&IWLIST_ESSID, block).unwrap_or_default(),
                signal_dbm,
                signal_quality: quality.or_else(|| signal_dbm.map(quality_from_dbm)).unwrap_or(0),
                channel: capture(&IWLIST_CHANNEL, block).or_else(|| frequency.and_then(channel_from_frequency)),
                frequency,
                encrypted: key_on || security != "Open",
                security,
            }
        })
        .collect()
}

struct ScanParser {
    show_hidden: bool,
}

impl OutputParser for ScanParser {
    fn extract_patterns(&self, text: &str) -> Option<Payload> {
        let mut networks: Vec<Network> = if IW_BSS.is_match(text) {
            parse_iw(text)
        } else if IWLIST_CELL.is_match(text) {
            parse_iwlist(text)
        } else if text.trim().is_empty() || text.contains("No scan results") {
            Vec::new()
        } else {
            return None;
        };

        if !self.show_hidden {
            networks.retain(|network| !network.is_hidden());
        }
        networks.sort_by(|a, b| b.signal_quality.cmp(&a.signal_quality).then_with(|| a.ssid.cmp(&b.ssid)));

        Some(object(json!({
            "networks": networks.iter().map(Network::to_json).collect::<Vec<Value>>(),
        })))
    }
}

struct ScanSimulator;

impl Simulator for ScanSimulator {
    fn simulate<R: Rng + ?Sized>(&self, rng: &mut R) -> Payload {
        let names: [(&str, &'static str); 4] = [
            ("HomeNetwork", "WPA2"),
            ("CoffeeShop_Guest", "Open"),
            ("Office-5G", "WPA2"),
            ("Neighbor", "WPA"),
        ];

        let networks: Vec<Value> = names
            .into_iter()
            .enumerate()
            .map(|(index, (ssid, security))| {
                let dbm: f64 = f64::from(rng.random_range(-85..-35));
                let five_ghz: bool = ssid.ends_with("5G");
                let channel: u32 = if five_ghz { 36 } else { [1, 6, 11][index % 3] };
                let frequency: u32 = if five_ghz { 5180 } else { 2407 + channel * 5 };
                Network {
                    bssid: format!("02:00:00:00:00:{:02x}", index + 1),
                    ssid: ssid.to_string(),
                    signal_dbm: Some(dbm),
                    signal_quality: quality_from_dbm(dbm),
                    channel: Some(channel),
                    frequency: Some(frequency),
                    encrypted: security != "Open",
                    security,
                }
                .to_json()
            })
            .collect();

        object(json!({ "networks": networks }))
    }
}

/// Interface state as the scanner sees it.
pub trait LinkState: Send + Sync + 'static {
    fn exists(&self, name: &str) -> bool;
    fn is_up(&self, name: &str) -> bool;
}

/// The host's interfaces.
pub struct HostLinks;

impl LinkState for HostLinks {
    fn exists(&self, name: &str) -> bool {
        interface::interface_exists(name)
    }

    fn is_up(&self, name: &str) -> bool {
        interface::is_up(name)
    }
}

pub struct WifiScanner {
    runner: Arc<dyn Runner>,
    links: Arc<dyn LinkState>,
}

impl WifiScanner {
    pub fn new(runner: Arc<dyn Runner>) -> Self {
        Self::with_links(runner, Arc::new(HostLinks))
    }

    pub fn with_links(runner: Arc<dyn Runner>, links: Arc<dyn LinkState>) -> Self {
        Self { runner, links }
    }

    /// Runs `iw`, then `iwlist` if `iw` could not produce a scan.
    async fn scan(&self, iface: &str, deadline: Duration) -> (&'static str, InvocationOutcome) {
        let iw = Invocation::new("iw")
            .args(["dev", iface, "scan"])
            .privileged(true)
            .deadline(deadline);
        let outcome = self.runner.run(iw).await;

        match outcome {
            InvocationOutcome::ToolMissing { .. } | InvocationOutcome::ProcessError { .. } => {
                warn!(interface = iface, "iw scan unavailable ({}), trying iwlist", outcome.describe());
                let iwlist = Invocation::new("iwlist")
                    .args([iface, "scanning"])
                    .privileged(true)
                    .deadline(deadline);
                match self.runner.run(iwlist).await {
                    InvocationOutcome::ToolMissing { .. } => ("iw", outcome),
                    fallback => ("iwlist", fallback),
                }
            }
            outcome => ("iw", outcome),
        }
    }
}

impl Default for WifiScanner {
    fn default() -> Self {
        Self::new(Arc::new(SystemRunner))
    }
}

#[async_trait]
impl PluginExecutor for WifiScanner {
    async fn execute(&self, ctx: &ExecutionContext, params: &ParameterValues) -> Result<Payload, ExecError> {
        let iface: String = match params.text("interface").filter(|name| !name.is_empty()) {
            Some(name) if self.links.exists(name) => name.to_string(),
            Some(name) => {
                return Err(ValidationError::invalid("interface", format!("no network interface named '{name}'")).into());
            }
            None => interface::first_wireless().unwrap_or_else(|| DEFAULT_INTERFACE.to_string()),
        };
        let scan_time: Duration = seconds(params, "scan_time", 5.0);
        let show_hidden: bool = params.flag("show_hidden").unwrap_or(false);
        let bring_up: bool = params.flag("bring_up").unwrap_or(false);
        let deadline: Duration = ctx.config.deadline(scan_time);

        let mut scope: Option<StateScope> = None;
        if bring_up && !self.links.is_up(&iface) {
            let up = Invocation::new("ip").args(["link", "set", iface.as_str(), "up"]).privileged(true);
            let outcome = self.runner.run(up).await;
            if outcome.is_success() {
                info!(interface = %iface, "interface brought up for scan");
                let mut guard = StateScope::acquire(format!("wifi:{iface}"), self.runner.clone());
                guard.on_release(Invocation::new("ip").args(["link", "set", iface.as_str(), "down"]).privileged(true));
                scope = Some(guard);
            } else {
                warn!(interface = %iface, "could not bring interface up: {}", outcome.describe());
            }
        }

        let (program, outcome) = self.scan(&iface, deadline).await;
        let resolved = resolve(
            program,
            &outcome,
            &ScanParser { show_hidden },
            &ScanSimulator,
            ProbeCategory::Inventory,
            &mut rand::rng(),
        );
        let mut payload: Payload = resolved.into_payload();

        if let Some(scope) = scope {
            let report = scope.release().await;
            payload.insert("interface_restored".into(), json!(report.all_succeeded()));
        }

        let count: usize = payload.get("networks").and_then(Value::as_array).map_or(0, Vec::len);
        payload.extend(object(json!({
            "interface": iface,
            "scan_time": scan_time.as_secs_f64(),
            "show_hidden": show_hidden,
            "network_count": count,
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::support::testing::{ScriptedRunner, context, failure, success};
    use netprobe_common::ParameterValue;

    const IW_OUTPUT: &str = "\
BSS aa:bb:cc:dd:ee:01(on wlan0)
\tfreq: 2437
\tcapability: ESS Privacy ShortSlotTime (0x0411)
\tsignal: -45.00 dBm
\tSSID: HomeNetwork
\tDS Parameter set: channel 6
\tRSN:\t * Version: 1
BSS aa:bb:cc:dd:ee:02(on wlan0)
\tfreq: 5180
\tcapability: ESS (0x0001)
\tsignal: -80.00 dBm
\tSSID:
BSS aa:bb:cc:dd:ee:03(on wlan0)
\tfreq: 2412
\tcapability: ESS (0x0401)
\tsignal: -70.00 dBm
\tSSID: Cafe
";

    const IWLIST_OUTPUT: &str = r#"wlan0     Scan completed :
          Cell 01 - Address: AA:BB:CC:DD:EE:10
                    Channel:11
                    Frequency:2.462 GHz (Channel 11)
                    Quality=56/70  Signal level=-54 dBm
                    Encryption key:on
                    ESSID:"Office"
                    IE: IEEE 802.11i/WPA2 Version 1
          Cell 02 - Address: AA:BB:CC:DD:EE:11
                    Channel:1
                    Frequency:2.412 GHz (Channel 1)
                    Quality=20/70  Signal level=-90 dBm
                    Encryption key:off
                    ESSID:"Lobby"
"#;

    #[test]
    fn iw_blocks_become_networks() {
        let networks = parse_iw(IW_OUTPUT);
        assert_eq!(networks.len(), 3);

        let home = &networks[0];
        assert_eq!(home.bssid, "aa:bb:cc:dd:ee:01");
        assert_eq!(home.ssid, "HomeNetwork");
        assert_eq!(home.signal_quality, 100);
        assert_eq!(home.channel, Some(6));
        assert_eq!(home.security, "WPA2");
        assert!(home.encrypted);

        assert!(networks[1].is_hidden());
        assert_eq!(networks[1].channel, Some(36));
        assert_eq!(networks[2].security, "Open");
        assert_eq!(networks[2].signal_quality, 60);
    }

    #[test]
    fn iwlist_cells_become_networks() {
        let networks = parse_iwlist(IWLIST_OUTPUT);
        assert_eq!(networks.len(), 2);
        assert_eq!(networks[0].bssid, "aa:bb:cc:dd:ee:10");
        assert_eq!(networks[0].signal_quality, 80);
        assert_eq!(networks[0].frequency, Some(2462));
        assert_eq!(networks[0].security, "WPA2");
        assert_eq!(networks[1].security, "Open");
        assert!(!networks[1].encrypted);
    }

    #[test]
    fn hidden_networks_are_filtered_unless_asked() {
        let hidden = ScanParser { show_hidden: false }.extract_patterns(IW_OUTPUT).unwrap();
        assert_eq!(hidden["networks"].as_array().unwrap().len(), 2);

        let shown = ScanParser { show_hidden: true }.extract_patterns(IW_OUTPUT).unwrap();
        let networks = shown["networks"].as_array().unwrap();
        assert_eq!(networks.len(), 3);
        assert!(networks.iter().any(|n| n["ssid"] == json!("<hidden>")));
    }

    #[tokio::test]
    async fn falls_back_to_iwlist() {
        let runner = Arc::new(
            ScriptedRunner::new()
                .then("iw", failure("iw exited with status 255: command failed: Operation not supported"))
                .then("iwlist", success(IWLIST_OUTPUT)),
        );
        let payload = WifiScanner::new(runner.clone())
            .execute(&context(), &ParameterValues::new().with("show_hidden", ParameterValue::Bool(false)))
            .await
            .unwrap();

        assert_eq!(payload["simulated"], json!(false));
        assert_eq!(payload["network_count"], json!(2));
        assert_eq!(payload["networks"][0]["ssid"], json!("Office"));
        assert_eq!(runner.calls().len(), 2);
    }

    #[tokio::test]
    async fn no_scanner_tools_is_simulated() {
        let payload = WifiScanner::new(Arc::new(ScriptedRunner::new()))
            .execute(&context(), &ParameterValues::new())
            .await
            .unwrap();
        assert_eq!(payload["simulated"], json!(true));
        assert!(payload["note"].as_str().unwrap().contains("iw is not available"));
        assert_eq!(payload["network_count"], json!(4));
    }

    /// A single interface that is down.
    struct DownLink(&'static str);

    impl LinkState for DownLink {
        fn exists(&self, name: &str) -> bool {
            name == self.0
        }

        fn is_up(&self, _name: &str) -> bool {
            false
        }
    }

    fn bring_up_params() -> ParameterValues {
        ParameterValues::new()
            .with("interface", ParameterValue::Text("wlan7".into()))
            .with("bring_up", ParameterValue::Bool(true))
            .with("scan_time", ParameterValue::Integer(1))
    }

    #[tokio::test]
    async fn raised_interface_goes_back_down_after_failed_scan() {
        let timed_out = InvocationOutcome::TimedOut {
            stdout: String::new(),
            stderr: String::new(),
            after: Duration::from_secs(1),
        };
        let runner = Arc::new(
            ScriptedRunner::new()
                .always("ip", success(""))
                .then("iw", failure("iw exited with status 240: Device or resource busy"))
                .then("iwlist", timed_out),
        );
        let payload = WifiScanner::with_links(runner.clone(), Arc::new(DownLink("wlan7")))
            .execute(&context(), &bring_up_params())
            .await
            .unwrap();

        assert_eq!(
            runner.calls(),
            vec![
                "ip link set wlan7 up",
                "iw dev wlan7 scan",
                "iwlist wlan7 scanning",
                "ip link set wlan7 down",
            ]
        );
        assert_eq!(payload["interface_restored"], json!(true));
    }

    #[tokio::test]
    async fn interface_that_would_not_come_up_is_left_alone() {
        let runner = Arc::new(
            ScriptedRunner::new()
                .then("ip", failure("ip exited with status 2: Operation not permitted"))
                .then("iw", success(IW_OUTPUT)),
        );
        let payload = WifiScanner::with_links(runner.clone(), Arc::new(DownLink("wlan7")))
            .execute(&context(), &bring_up_params())
            .await
            .unwrap();

        assert_eq!(runner.calls(), vec!["ip link set wlan7 up", "iw dev wlan7 scan"]);
        assert!(payload.get("interface_restored").is_none());
        assert_eq!(payload["network_count"], json!(2));
    }

    #[tokio::test]
    async fn unknown_interface_is_rejected() {
        let params = ParameterValues::new().with("interface", ParameterValue::Text("netprobe-nope0".into()));
        let err = WifiScanner::new(Arc::new(ScriptedRunner::new()))
            .execute(&context(), &params)
            .await
            .unwrap_err();
        assert!(matches!(err, ExecError::Validation(ref e) if e.param == "interface"));
    }
}
