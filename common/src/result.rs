//! # Invocation Results
//!
//! Two layers of result live here:
//!
//! * [`InvocationOutcome`]: what happened when an external tool ran.
//! * [`NormalizedResult`]: what a plugin makes of that outcome, whether real
//!   data parsed from the tool or a clearly labelled simulation.
//!
//! Every payload a plugin returns carries a boolean `simulated` field, so a
//! caller can never mistake fabricated numbers for measurements.

use std::time::Duration;

use serde_json::{Map, Value};

/// The flat JSON object a plugin returns to its caller.
pub type Payload = Map<String, Value>;

/// Result of running one external program.
#[derive(Debug, Clone, PartialEq)]
pub enum InvocationOutcome {
    /// Exited with an accepted status code.
    Success {
        stdout: String,
        stderr: String,
        exit_code: i32,
    },
    /// The executable is not installed or not on the search path.
    ToolMissing { program: String },
    /// The deadline passed and the process group was killed.
    TimedOut {
        stdout: String,
        stderr: String,
        after: Duration,
    },
    /// Spawn failure other than "not found", or an unaccepted exit status.
    ProcessError {
        cause: String,
        stdout: String,
        stderr: String,
    },
}

impl InvocationOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, InvocationOutcome::Success { .. })
    }

    /// Whatever the process managed to write to stdout, even on failure.
    pub fn stdout(&self) -> &str {
        match self {
            InvocationOutcome::Success { stdout, .. }
            | InvocationOutcome::TimedOut { stdout, .. }
            | InvocationOutcome::ProcessError { stdout, .. } => stdout,
            InvocationOutcome::ToolMissing { .. } => "",
        }
    }

    pub fn stderr(&self) -> &str {
        match self {
            InvocationOutcome::Success { stderr, .. }
            | InvocationOutcome::TimedOut { stderr, .. }
            | InvocationOutcome::ProcessError { stderr, .. } => stderr,
            InvocationOutcome::ToolMissing { .. } => "",
        }
    }

    /// One-line description used in logs and `error` fields.
    pub fn describe(&self) -> String {
        match self {
            InvocationOutcome::Success { exit_code, .. } => format!("exited with {exit_code}"),
            InvocationOutcome::ToolMissing { program } => format!("{program} is not installed"),
            InvocationOutcome::TimedOut { after, .. } => {
                format!("timed out after {:.1}s", after.as_secs_f64())
            }
            InvocationOutcome::ProcessError { cause, .. } => cause.clone(),
        }
    }
}

/// How a plugin's answer was obtained.
#[derive(Debug, Clone, PartialEq)]
pub enum NormalizedResult {
    /// Real data. `derived_from_text` is set when the fields were scraped
    /// from human-readable output rather than a structured format.
    Structured {
        fields: Payload,
        derived_from_text: bool,
    },
    /// Tool output nobody could parse, passed through verbatim.
    RawText { output: String },
    /// Fabricated values. `note` says why real data was unavailable.
    Simulated { fields: Payload, note: String },
}

impl NormalizedResult {
    pub fn is_simulated(&self) -> bool {
        matches!(self, NormalizedResult::Simulated { .. })
    }

    /// Flattens into the caller-facing payload, always setting `simulated`.
    pub fn into_payload(self) -> Payload {
        match self {
            NormalizedResult::Structured {
                mut fields,
                derived_from_text,
            } => {
                fields.insert("simulated".into(), Value::Bool(false));
                if derived_from_text {
                    fields.insert("derivedFromText".into(), Value::Bool(true));
                }
                fields
            }
            NormalizedResult::RawText { output } => {
                let mut fields: Payload = Payload::new();
                fields.insert("rawOutput".into(), Value::String(output));
                fields.insert("simulated".into(), Value::Bool(false));
                fields
            }
            NormalizedResult::Simulated { mut fields, note } => {
                fields.insert("simulated".into(), Value::Bool(true));
                fields.insert("note".into(), Value::String(note));
                fields
            }
        }
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
