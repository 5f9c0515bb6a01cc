//! Traffic shaping on an interface's root qdisc with `tc`.
//!
//! Rules are held for the requested duration and then removed through a
//! [`StateScope`], so the interface is reset even when the hold is cut short.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use netprobe_common::network::interface;
use netprobe_common::{InvocationOutcome, NormalizedResult, ParameterValues, Payload, ValidationError};
use netprobe_core::{ExecError, ExecutionContext, Invocation, PluginExecutor, Runner, StateScope, SystemRunner};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::support::object;

const TC_DEADLINE: Duration = Duration::from_secs(5);

/// What `tc qdisc del` prints when the interface has no root qdisc to remove.
const NOTHING_TO_DELETE: [&str; 2] = ["No such file or directory", "Cannot delete qdisc with handle of zero"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Reset,
    Bandwidth,
    Latency,
    PacketLoss,
    Jitter,
    Combination,
}

impl Mode {
    fn parse(raw: &str) -> Result<Self, ValidationError> {
        match raw {
            "reset" => Ok(Self::Reset),
            "bandwidth" => Ok(Self::Bandwidth),
            "latency" => Ok(Self::Latency),
            "packet_loss" => Ok(Self::PacketLoss),
            "jitter" => Ok(Self::Jitter),
            "combination" => Ok(Self::Combination),
            other => Err(ValidationError::invalid("mode", format!("unknown mode '{other}'"))),
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Reset => "reset",
            Self::Bandwidth => "bandwidth",
            Self::Latency => "latency",
            Self::PacketLoss => "packet_loss",
            Self::Jitter => "jitter",
            Self::Combination => "combination",
        }
    }
}

#[derive(Debug, Clone)]
struct Shaping {
    bandwidth: i64,
    latency: i64,
    packet_loss: f64,
    jitter: i64,
    duration: i64,
}

impl Shaping {
    fn from_params(params: &ParameterValues) -> Self {
        Self {
            bandwidth: params.integer("bandwidth").unwrap_or(1000),
            latency: params.integer("latency").unwrap_or(100),
            packet_loss: params.number("packet_loss").unwrap_or(1.0),
            jitter: params.integer("jitter").unwrap_or(20),
            duration: params.integer("duration").unwrap_or(60),
        }
    }

    fn to_json(&self) -> Value {
        json!({
            "bandwidth": self.bandwidth,
            "latency": self.latency,
            "packet_loss": self.packet_loss,
            "jitter": self.jitter,
            "duration": self.duration,
        })
    }
}

fn tc(iface: &str, action: &str) -> Invocation {
    Invocation::new("tc")
        .args(["qdisc", action, "dev", iface])
        .privileged(true)
        .deadline(TC_DEADLINE)
}

fn reset(iface: &str) -> Invocation {
    tc(iface, "del").arg("root")
}

fn token_bucket(invocation: Invocation, kbit: i64) -> Invocation {
    invocation
        .args(["tbf", "rate"])
        .arg(format!("{kbit}kbit"))
        .args(["burst", "32kB", "latency", "400ms"])
}

/// The rules a mode installs, in application order. Reset installs nothing.
fn rules(mode: Mode, iface: &str, shaping: &Shaping) -> Vec<Invocation> {
    let delay = |ms: i64| format!("{ms}ms");
    let loss = format!("{:.2}%", shaping.packet_loss);

    match mode {
        Mode::Reset => Vec::new(),
        Mode::Bandwidth => vec![token_bucket(tc(iface, "add").args(["root", "handle", "1:"]), shaping.bandwidth)],
        Mode::Latency => vec![tc(iface, "add").args(["root", "netem", "delay"]).arg(delay(shaping.latency))],
        Mode::PacketLoss => vec![tc(iface, "add").args(["root", "netem", "loss"]).arg(loss)],
        Mode::Jitter => vec![
            tc(iface, "add")
                .args(["root", "netem", "delay"])
                .arg(delay(shaping.latency))
                .arg(delay(shaping.jitter))
                .args(["distribution", "normal"]),
        ],
        Mode::Combination => vec![
            tc(iface, "add")
                .args(["root", "handle", "1:", "netem", "delay"])
                .arg(delay(shaping.latency))
                .arg(delay(shaping.jitter))
                .args(["distribution", "normal", "loss"])
                .arg(loss),
            token_bucket(tc(iface, "add").args(["parent", "1:1", "handle", "10:"]), shaping.bandwidth),
        ],
    }
}

/// A failed delete still leaves the interface clean when there was nothing to delete.
fn cleared_cleanly(outcome: &InvocationOutcome) -> bool {
    match outcome {
        InvocationOutcome::Success { .. } => true,
        InvocationOutcome::ProcessError { stderr, .. } => {
            NOTHING_TO_DELETE.iter().any(|benign| stderr.contains(benign))
        }
        _ => false,
    }
}

pub struct TcController {
    runner: Arc<dyn Runner>,
}

impl TcController {
    pub fn new(runner: Arc<dyn Runner>) -> Self {
        Self { runner }
    }
}

impl Default for TcController {
    fn default() -> Self {
        Self::new(Arc::new(SystemRunner))
    }
}

#[async_trait]
impl PluginExecutor for TcController {
    async fn execute(&self, _ctx: &ExecutionContext, params: &ParameterValues) -> Result<Payload, ExecError> {
        let iface: &str = params.require_text("interface")?;
        if !interface::interface_exists(iface) {
            return Err(ValidationError::invalid("interface", format!("no network interface named '{iface}'")).into());
        }
        let mode: Mode = Mode::parse(params.text("mode").unwrap_or("reset"))?;
        let shaping = Shaping::from_params(params);

        let rules: Vec<Invocation> = rules(mode, iface, &shaping);
        let commands: Vec<String> = std::iter::once(reset(iface))
            .chain(rules.iter().cloned())
            .map(|invocation| invocation.command_line())
            .collect();

        let mut payload: Payload = object(json!({
            "mode": mode.as_str(),
            "interface": iface,
            "commands": commands,
            "parameters": shaping.to_json(),
        }));

        let cleared = self.runner.run(reset(iface)).await;
        if let InvocationOutcome::ToolMissing { program } = &cleared {
            let note = format!("{program} is not available; no rules were applied");
            warn!("{note}");
            payload.insert("success".into(), json!(false));
            payload.insert("applied_for".into(), json!(0));
            payload.extend(NormalizedResult::Simulated { fields: Payload::new(), note }.into_payload());
            return Ok(payload);
        }
        debug!(interface = iface, outcome = %cleared.describe(), "cleared root qdisc");

        if mode == Mode::Reset {
            let errors: Vec<String> = if cleared_cleanly(&cleared) {
                Vec::new()
            } else {
                vec![cleared.describe()]
            };
            payload.insert("success".into(), json!(errors.is_empty()));
            payload.insert("applied_for".into(), json!(0));
            payload.insert("reset".into(), json!({ "success": errors.is_empty(), "errors": errors }));
            return Ok(payload);
        }

        let mut scope = StateScope::acquire(format!("tc:{iface}"), self.runner.clone());
        scope.on_release(reset(iface));

        for rule in rules {
            let line: String = rule.command_line();
            let outcome = self.runner.run(rule).await;
            if !outcome.is_success() {
                warn!(command = %line, outcome = %outcome.describe(), "tc rule failed");
                let report = scope.release().await;
                payload.insert("success".into(), json!(false));
                payload.insert("applied_for".into(), json!(0));
                payload.insert("error".into(), json!(format!("'{line}' failed: {}", outcome.describe())));
                payload.insert("reset".into(), json!({ "success": report.all_succeeded(), "errors": report.errors() }));
                return Ok(payload);
            }
        }

        let hold = Duration::from_secs(shaping.duration.max(0) as u64);
        info!(interface = iface, mode = mode.as_str(), seconds = hold.as_secs(), "shaping rules applied");
        tokio::time::sleep(hold).await;

        let report = scope.release().await;
        if !report.all_succeeded() {
            warn!(interface = iface, errors = ?report.errors(), "reset after shaping failed");
        }
        payload.insert("success".into(), json!(true));
        payload.insert("applied_for".into(), json!(hold.as_secs()));
        payload.insert("reset".into(), json!({ "success": report.all_succeeded(), "errors": report.errors() }));
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
