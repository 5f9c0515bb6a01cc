//! # Fallback Simulation
//!
//! Decides, from an [`InvocationOutcome`] and the normalizer's verdict,
//! whether a probe reports real data or a labelled simulation.
//!
//! | outcome | measurement probe | inventory probe |
//! |---|---|---|
//! | `ToolMissing` | simulated | simulated |
//! | `Success`, parsed | structured | structured |
//! | `Success`, unparsed | simulated | raw text |
//! | `TimedOut` | partial data + `note`, simulated if nothing parsed | partial data + `note` |
//! | `ProcessError` | `error` + simulated | `error` + simulated |
//!
//! Simulated payloads always carry `simulated: true` and a `note` saying why.
//! Validation errors never reach this module.

use std::net::SocketAddr;
use std::time::Duration;

use netprobe_common::{InvocationOutcome, NormalizedResult, Payload};
use netprobe_protocols::tcp;
use rand::Rng;
use serde_json::Value;
use tracing::warn;

use crate::normalize::{OutputParser, normalize};

/// Ports tried, in order, when measuring TCP-connect latency.
const LATENCY_PORTS: [u16; 3] = [443, 80, 53];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeCategory {
    /// Produces numbers. Unparseable output is useless and gets simulated.
    Measurement,
    /// Lists things. Unparseable output is still worth showing verbatim.
    Inventory,
}

/// Produces plausible values for a probe whose tool gave nothing usable.
pub trait Simulator {
    fn simulate<R: Rng + ?Sized>(&self, rng: &mut R) -> Payload;
}

/// The normalized result plus any annotations the outcome warrants.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub result: NormalizedResult,
    pub note: Option<String>,
    pub error: Option<String>,
}

impl Resolved {
    fn plain(result: NormalizedResult) -> Self {
        Self {
            result,
            note: None,
            error: None,
        }
    }

    pub fn is_simulated(&self) -> bool {
        self.result.is_simulated()
    }

    /// Replaces a simulated field with a real measurement.
    ///
    /// Returns `false`, changing nothing, when the result is not simulated.
    pub fn substitute_real(&mut self, field: &str, value: Value, source: &str) -> bool {
        let NormalizedResult::Simulated { fields, note } = &mut self.result else {
            return false;
        };
        fields.insert(field.to_string(), value);
        note.push_str(&format!(" ({field} measured via {source})"));
        true
    }

    pub fn into_payload(self) -> Payload {
        let mut payload: Payload = self.result.into_payload();
        if let Some(note) = self.note {
            payload.entry("note").or_insert(Value::String(note));
        }
        if let Some(error) = self.error {
            payload.insert("error".into(), Value::String(error));
        }
        payload
    }
}

pub fn resolve<P, S, R>(
    program: &str,
    outcome: &InvocationOutcome,
    parser: &P,
    simulator: &S,
    category: ProbeCategory,
    rng: &mut R,
) -> Resolved
where
    P: OutputParser,
    S: Simulator,
    R: Rng + ?Sized,
{
    match outcome {
        InvocationOutcome::ToolMissing { program } => {
            let note = format!("{program} is not available; results are simulated");
            Resolved::plain(simulated(simulator, rng, note, None))
        }
        InvocationOutcome::Success { stdout, .. } => match normalize(stdout, parser) {
            NormalizedResult::RawText { output } if category == ProbeCategory::Measurement => {
                let note = format!("could not parse {program} output; results are simulated");
                Resolved::plain(simulated(simulator, rng, note, Some(("rawOutput", output))))
            }
            result => Resolved::plain(result),
        },
        InvocationOutcome::TimedOut { stdout, after, .. } => {
            let secs: f64 = after.as_secs_f64();
            match normalize(stdout, parser) {
                NormalizedResult::RawText { output } if category == ProbeCategory::Measurement => {
                    let note = format!(
                        "{program} timed out after {secs:.1}s without usable output; results are simulated"
                    );
                    Resolved::plain(simulated(simulator, rng, note, Some(("partialOutput", output))))
                }
                result => Resolved {
                    result,
                    note: Some(format!("{program} timed out after {secs:.1}s; output is partial")),
                    error: None,
                },
            }
        }
        InvocationOutcome::ProcessError { cause, stdout, .. } => {
            let result = match normalize(stdout, parser) {
                structured @ NormalizedResult::Structured { .. } => structured,
                _ => {
                    let note = format!("{program} failed; results are simulated");
                    simulated(simulator, rng, note, None)
                }
            };
            Resolved {
                result,
                note: None,
                error: Some(cause.clone()),
            }
        }
    }
}

fn simulated<S, R>(simulator: &S, rng: &mut R, note: String, keep: Option<(&str, String)>) -> NormalizedResult
where
    S: Simulator,
    R: Rng + ?Sized,
{
    warn!("{note}");
    let mut fields: Payload = simulator.simulate(rng);
    if let Some((key, text)) = keep {
        if !text.trim().is_empty() {
            fields.insert(key.to_string(), Value::String(text));
        }
    }
    NormalizedResult::Simulated { fields, note }
}

/// TCP-connect round trip to `host` in milliseconds, if any probe port answers.
pub async fn connectivity_latency(host: &str, wait: Duration) -> Option<f64> {
    let addr = tcp::resolve(host).await?;

    for port in LATENCY_PORTS {
        if let Some(rtt) = tcp::handshake_rtt(SocketAddr::new(addr, port), wait).await {
            return Some((rtt.as_secs_f64() * 1000.0 * 100.0).round() / 100.0);
        }
    }
    None
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
