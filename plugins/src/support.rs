use std::time::Duration;

use netprobe_common::{ParameterValues, Payload, ValidationError};
use serde_json::Value;

/// Unwraps a `json!` object literal into a payload.
pub(crate) fn object(value: Value) -> Payload {
    match value {
        Value::Object(map) => map,
        _ => Payload::new(),
    }
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// A host argument that is safe to hand to a tool as a positional argument.
pub(crate) fn check_host<'a>(param: &str, host: &'a str) -> Result<&'a str, ValidationError> {
    if host.is_empty() {
        return Err(ValidationError::missing(param));
    }
    if host.starts_with('-') || host.chars().any(char::is_whitespace) {
        return Err(ValidationError::invalid(param, format!("'{host}' is not a host name or address")));
    }
    Ok(host)
}

/// Reads a seconds parameter, falling back to `default` when absent.
pub(crate) fn seconds(params: &ParameterValues, id: &str, default: f64) -> Duration {
    let secs: f64 = params.number(id).unwrap_or(default);
    Duration::from_secs_f64(secs.max(0.0))
}

/// Formats seconds the way ping's `-i`/`-W` flags expect them.
pub(crate) fn seconds_arg(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        format!("{value:.1}")
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use netprobe_common::InvocationOutcome;
    use netprobe_core::{Invocation, Runner};

    /// Answers invocations from a per-program script and records every call.
    #[derive(Default)]
    pub struct ScriptedRunner {
        scripts: Mutex<HashMap<String, VecDeque<InvocationOutcome>>>,
        fallback: Mutex<HashMap<String, InvocationOutcome>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedRunner {
        pub fn new() -> Self {
            Self::default()
        }

        /// Queues one outcome for the next call of `program`.
        pub fn then(self, program: &str, outcome: InvocationOutcome) -> Self {
            self.scripts
                .lock()
                .unwrap()
                .entry(program.to_string())
                .or_default()
                .push_back(outcome);
            self
        }

        /// Outcome for every call of `program` once its queue is empty.
        pub fn always(self, program: &str, outcome: InvocationOutcome) -> Self {
            self.fallback.lock().unwrap().insert(program.to_string(), outcome);
            self
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Runner for ScriptedRunner {
        async fn run(&self, invocation: Invocation) -> InvocationOutcome {
            self.calls.lock().unwrap().push(invocation.command_line());
            let program: &str = invocation.program();

            if let Some(outcome) = self.scripts.lock().unwrap().get_mut(program).and_then(VecDeque::pop_front) {
                return outcome;
            }
            self.fallback
                .lock()
                .unwrap()
                .get(program)
                .cloned()
                .unwrap_or_else(|| InvocationOutcome::ToolMissing { program: program.to_string() })
        }
    }

    pub fn success(stdout: &str) -> InvocationOutcome {
        InvocationOutcome::Success {
            stdout: stdout.to_string(),
            stderr: String::new(),
            exit_code: 0,
        }
    }

    pub fn failure(cause: &str) -> InvocationOutcome {
        InvocationOutcome::ProcessError {
            cause: cause.to_string(),
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    pub fn context() -> netprobe_core::ExecutionContext {
        netprobe_core::ExecutionContext::new(
            netprobe_common::config::Config::default(),
            netprobe_common::catalog::Catalog::builtin().unwrap(),
        )
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
    fn host_arguments_cannot_become_flags() {
        assert_eq!(check_host("host", "example.com").unwrap(), "example.com");
        assert!(check_host("host", "-f").is_err());
        assert!(check_host("host", "a b").is_err());
        assert!(check_host("host", "").is_err());
    }

    #[test]
    fn seconds_arg_drops_needless_fraction() {
        assert_eq!(seconds_arg(1.0), "1");
        assert_eq!(seconds_arg(0.2), "0.2");
    }
}
