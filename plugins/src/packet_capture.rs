//! Packet capture via `tcpdump`, lines passed through as captured.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use netprobe_common::network::interface;
use netprobe_common::{InvocationOutcome, NormalizedResult, ParameterValues, Payload, ValidationError};
use netprobe_core::fallback::{ProbeCategory, Resolved, Simulator, resolve};
use netprobe_core::normalize::OutputParser;
use netprobe_core::{ExecError, ExecutionContext, Invocation, PluginExecutor, Runner, SystemRunner};
use rand::Rng;
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::support::{object, seconds};

const MAX_LINES: usize = 1000;
const ALL_INTERFACES: &str = "any";

pub struct PacketCapture {
    runner: Arc<dyn Runner>,
}

impl PacketCapture {
    pub fn new(runner: Arc<dyn Runner>) -> Self {
        Self { runner }
    }
}

impl Default for PacketCapture {
    fn default() -> Self {
        Self::new(Arc::new(SystemRunner))
    }
}

/// Non-empty lines, capped at [`MAX_LINES`] plus a marker when cut.
fn packet_lines(stdout: &str) -> Vec<String> {
    let lines: Vec<&str> = stdout.lines().filter(|line| !line.trim().is_empty()).collect();
    let total: usize = lines.len();

    let mut kept: Vec<String> = lines.into_iter().take(MAX_LINES).map(str::to_string).collect();
    if total > MAX_LINES {
        kept.push(format!("... output truncated (showing {MAX_LINES} of {total} lines)"));
    }
    kept
}

fn simulated_lines(interface: &str, count: usize) -> Vec<String> {
    (0..count.min(5))
        .map(|i| {
            format!(
                "12:00:0{i}.000000 {interface} IP 192.168.1.{}.52344 > 93.184.216.34.443: Flags [P.], length {}",
                10 + i,
                64 * (i + 1)
            )
        })
        .collect()
}

/// Filter expression words, none of which may read as a tcpdump option.
fn filter_words(filter: &str) -> Result<Vec<&str>, ValidationError> {
    let words: Vec<&str> = filter.split_whitespace().collect();
    match words.iter().find(|word| word.starts_with('-')) {
        Some(word) => Err(ValidationError::invalid(
            "capture_filter",
            format!("'{word}' would be read as a tcpdump option"),
        )),
        None => Ok(words),
    }
}

struct CaptureParser;

impl OutputParser for CaptureParser {
    fn extract_patterns(&self, text: &str) -> Option<Payload> {
        let packets: Vec<String> = packet_lines(text);
        (!packets.is_empty()).then(|| object(json!({ "packets": packets })))
    }
}

struct CaptureSimulator<'a> {
    interface: &'a str,
    count: usize,
}

impl Simulator for CaptureSimulator<'_> {
    fn simulate<R: Rng + ?Sized>(&self, _rng: &mut R) -> Payload {
        object(json!({ "packets": simulated_lines(self.interface, self.count) }))
    }
}

#[async_trait]
impl PluginExecutor for PacketCapture {
    async fn execute(&self, _ctx: &ExecutionContext, params: &ParameterValues) -> Result<Payload, ExecError> {
        let iface: &str = params.text("interface").filter(|name| !name.is_empty()).unwrap_or(ALL_INTERFACES);
        if iface != ALL_INTERFACES && !interface::interface_exists(iface) {
            return Err(ValidationError::invalid("interface", format!("no network interface named '{iface}'")).into());
        }
        let filter: &str = params.text("capture_filter").unwrap_or_default();
        let words: Vec<&str> = filter_words(filter)?;
        let count: i64 = params.integer("packet_count").unwrap_or(100);
        let timeout: Duration = seconds(params, "capture_timeout", 10.0);
        let verbose: bool = params.flag("include_headers").unwrap_or(true);

        let mut invocation = Invocation::new("tcpdump")
            .args(["-n", "-l", "-i", iface, "-c"])
            .arg(count.to_string())
            .privileged(true)
            .deadline(timeout);
        if verbose {
            invocation = invocation.arg("-v");
        }
        if !words.is_empty() {
            invocation = invocation.args(words);
        }

        info!(interface = iface, count, filter, "starting capture");
        let outcome = self.runner.run(invocation).await;

        let mut payload: Payload = object(json!({
            "interface": iface,
            "capture_filter": filter,
            "packet_count": count,
            "timeout": timeout.as_secs_f64(),
            "include_headers": verbose,
        }));

        let result: NormalizedResult = match &outcome {
            InvocationOutcome::Success { stdout, .. } => NormalizedResult::Structured {
                fields: object(json!({ "packets": packet_lines(stdout) })),
                derived_from_text: true,
            },
            InvocationOutcome::TimedOut { stdout, .. } => {
                payload.insert("note".into(), json!("Capture stopped due to timeout"));
                NormalizedResult::Structured {
                    fields: object(json!({ "packets": packet_lines(stdout) })),
                    derived_from_text: true,
                }
            }
            InvocationOutcome::ToolMissing { program } => {
                let note = format!("{program} is not available; results are simulated");
                warn!("{note}");
                NormalizedResult::Simulated {
                    fields: object(json!({ "packets": simulated_lines(iface, count.max(0) as usize) })),
                    note,
                }
            }
            InvocationOutcome::ProcessError { .. } => {
                let simulator = CaptureSimulator {
                    interface: iface,
                    count: count.max(0) as usize,
                };
                let Resolved { result, error, .. } = resolve(
                    "tcpdump",
                    &outcome,
                    &CaptureParser,
                    &simulator,
                    ProbeCategory::Inventory,
                    &mut rand::rng(),
                );
                if let Some(error) = error {
                    payload.insert("error".into(), Value::String(error));
                }
                result
            }
        };

        let captured: usize = match &result {
            NormalizedResult::Structured { fields, .. } | NormalizedResult::Simulated { fields, .. } => {
                fields.get("packets").and_then(Value::as_array).map_or(0, Vec::len)
            }
            NormalizedResult::RawText { .. } => 0,
        };
        payload.extend(result.into_payload());
        payload.insert("captured_lines".into(), json!(captured));
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
