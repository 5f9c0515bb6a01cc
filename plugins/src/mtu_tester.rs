//! # MTU Tester
//!
//! Finds the largest MTU that reaches a target with the don't-fragment bit
//! set. One reachability ping comes first; then a binary search over the
//! `step_size` grid between `min_mtu` and `max_mtu`, then a linear walk up
//! from the best grid point to pin the exact value.
//!
//! Path MTU is assumed monotonic: if size `n` passes, every smaller size
//! passes. Under that assumption a path whose real limit is `P` reports
//! `min(P, max_mtu)`, and `min_mtu` when nothing fits.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use netprobe_common::{InvocationOutcome, NormalizedResult, ParameterValues, Payload, ValidationError};
use netprobe_core::fallback::Simulator;
use netprobe_core::{ExecError, ExecutionContext, Invocation, PluginExecutor, Runner, SystemRunner};
use rand::Rng;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::support::{check_host, object};

/// IPv4 header plus ICMP header.
const HEADER_OVERHEAD: u32 = 28;
const STANDARD_MTU: u32 = 1500;

pub struct MtuTester {
    runner: Arc<dyn Runner>,
}

impl MtuTester {
    pub fn new(runner: Arc<dyn Runner>) -> Self {
        Self { runner }
    }
}

impl Default for MtuTester {
    fn default() -> Self {
        Self::new(Arc::new(SystemRunner))
    }
}

#[derive(Debug, Clone, Copy)]
struct Bounds {
    min: u32,
    max: u32,
    step: u32,
}

impl Bounds {
    fn grid_len(&self) -> u32 {
        (self.max - self.min) / self.step + 1
    }

    fn grid(&self, index: u32) -> u32 {
        self.min + index * self.step
    }
}

/// Probes run so far, keyed by MTU.
struct Search<'a> {
    runner: &'a dyn Runner,
    target: &'a str,
    wait: u64,
    deadline: Duration,
    results: BTreeMap<u32, bool>,
}

impl Search<'_> {
    async fn fits(&mut self, mtu: u32) -> bool {
        if let Some(known) = self.results.get(&mtu) {
            return *known;
        }

        let payload: u32 = mtu.saturating_sub(HEADER_OVERHEAD);
        let invocation = Invocation::new("ping")
            .args(["-c", "1", "-M", "do", "-s"])
            .arg(payload.to_string())
            .arg("-W")
            .arg(self.wait.to_string())
            .arg(self.target)
            .deadline(self.deadline);

        let fits: bool = self.runner.run(invocation).await.is_success();
        debug!(mtu, fits, "mtu probe");
        self.results.insert(mtu, fits);
        fits
    }

    async fn optimum(&mut self, bounds: Bounds) -> u32 {
        let mut best: Option<u32> = None;
        let (mut low, mut high) = (0u32, bounds.grid_len() - 1);

        while low <= high {
            let mid: u32 = low + (high - low) / 2;
            if self.fits(bounds.grid(mid)).await {
                best = Some(mid);
                low = mid + 1;
            } else if mid == 0 {
                break;
            } else {
                high = mid - 1;
            }
        }

        let Some(index) = best else {
            return bounds.min;
        };

        let base: u32 = bounds.grid(index);
        let ceiling: u32 = (base + bounds.step - 1).min(bounds.max);
        let mut optimum: u32 = base;
        for mtu in base + 1..=ceiling {
            if !self.fits(mtu).await {
                break;
            }
            optimum = mtu;
        }
        optimum
    }

    fn test_results(&self) -> Vec<Value> {
        self.results
            .iter()
            .map(|(mtu, success)| json!({ "mtu": mtu, "success": success }))
            .collect()
    }
}

fn recommendations(optimum: u32, max: u32) -> Vec<String> {
    let mut advice: Vec<String> = Vec::new();

    if optimum >= max {
        advice.push("Your connection supports the standard MTU size. No changes are needed.".to_string());
    } else if optimum >= 1400 {
        advice.push(format!(
            "Your optimal MTU is {optimum}, which is slightly below the standard {STANDARD_MTU} bytes."
        ));
        advice.push("This is common with some VPN or PPPoE connections.".to_string());
    } else if optimum >= 1000 {
        advice.push(format!("Your optimal MTU is {optimum}, which is significantly below the standard."));
        advice.push("You may be experiencing packet fragmentation issues.".to_string());
        advice.push(format!("Consider setting your network interface MTU to {optimum}."));
    } else {
        advice.push(format!("Your optimal MTU is {optimum}, which is very low."));
        advice.push("This might indicate serious network issues or router misconfiguration.".to_string());
        advice.push("Check your network equipment and connection type.".to_string());
        advice.push(format!("For now, set your network interface MTU to {optimum} to avoid fragmentation."));
    }

    advice.push(format!("To set MTU on Linux: sudo ip link set dev <interface> mtu {optimum}"));
    advice
}

struct MtuSimulator {
    bounds: Bounds,
}

impl Simulator for MtuSimulator {
    fn simulate<R: Rng + ?Sized>(&self, rng: &mut R) -> Payload {
        let typical: [u32; 5] = [STANDARD_MTU, STANDARD_MTU, 1492, 1480, 1420];
        let pick: u32 = typical[rng.random_range(0..typical.len())];
        let optimum: u32 = pick.clamp(self.bounds.min, self.bounds.max);

        let test_results: Vec<Value> = (0..self.bounds.grid_len())
            .map(|index| self.bounds.grid(index))
            .map(|mtu| json!({ "mtu": mtu, "success": mtu <= optimum }))
            .collect();

        object(json!({
            "optimum_mtu": optimum,
            "test_results": test_results,
            "recommendations": recommendations(optimum, self.bounds.max),
        }))
    }
}

#[async_trait]
impl PluginExecutor for MtuTester {
    async fn execute(&self, ctx: &ExecutionContext, params: &ParameterValues) -> Result<Payload, ExecError> {
        let target: &str = check_host("target", params.text("target").unwrap_or("8.8.8.8"))?;
        let min: u32 = params.integer("min_mtu").unwrap_or(576) as u32;
        let max: u32 = params.integer("max_mtu").unwrap_or(STANDARD_MTU as i64) as u32;
        let step: u32 = params.integer("step_size").unwrap_or(8).max(1) as u32;
        let wait: u64 = params.integer("timeout").unwrap_or(5).max(1) as u64;

        if min > max {
            return Err(ValidationError::invalid(
                "min_mtu",
                format!("minimum MTU {min} is larger than maximum MTU {max}"),
            )
            .into());
        }
        let bounds = Bounds { min, max, step };
        let deadline: Duration = ctx.config.deadline(Duration::from_secs(wait));

        let mut payload: Payload = object(json!({
            "target": target,
            "min_mtu": min,
            "max_mtu": max,
            "step_size": step,
        }));

        let reachability = Invocation::new("ping")
            .args(["-c", "1", "-W"])
            .arg(wait.to_string())
            .arg(target)
            .deadline(deadline);

        match self.runner.run(reachability).await {
            InvocationOutcome::Success { .. } => {}
            InvocationOutcome::ToolMissing { program } => {
                let note = format!("{program} is not available; results are simulated");
                warn!("{note}");
                let fields: Payload = MtuSimulator { bounds }.simulate(&mut rand::rng());
                payload.extend(NormalizedResult::Simulated { fields, note }.into_payload());
                return Ok(payload);
            }
            failed => {
                warn!(target, "target unreachable: {}", failed.describe());
                payload.extend(object(json!({
                    "optimum_mtu": Value::Null,
                    "test_results": [],
                    "recommendations": [],
                    "error": format!("target {target} is not reachable: {}", failed.describe()),
                })));
                return Ok(payload);
            }
        }

        let mut search = Search {
            runner: self.runner.as_ref(),
            target,
            wait,
            deadline,
            results: BTreeMap::new(),
        };
        let optimum: u32 = search.optimum(bounds).await;
        info!(target, optimum, probes = search.results.len(), "mtu search finished");

        payload.extend(object(json!({
            "optimum_mtu": optimum,
            "test_results": search.test_results(),
            "recommendations": recommendations(optimum, max),
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
