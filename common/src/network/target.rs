//! # Probe Targets
//!
//! Multi-target probes expand their parameters into a list of targets before
//! any work starts. Each target exposes a stable identity so the fan-out
//! engine can key its per-target slots.
//!
//! Port specifications accept:
//! * A single port (e.g., `443`).
//! * An inclusive range (e.g., `1-1024`).
//! * A comma-separated mix of both (e.g., `22, 80, 8000-8100`).

use std::collections::HashSet;
use std::fmt::Debug;
use std::net::IpAddr;
use std::str::FromStr;

use crate::catalog::DnsServer;
use crate::network::range::PortRange;

/// Anything the fan-out engine can probe.
pub trait ProbeTarget: Send + Sync + 'static {
    type Id: Ord + Clone + Debug + Send + Sync + 'static;

    fn id(&self) -> Self::Id;
}

impl ProbeTarget for u16 {
    type Id = u16;

    fn id(&self) -> u16 {
        *self
    }
}

impl ProbeTarget for DnsServer {
    type Id = IpAddr;

    fn id(&self) -> IpAddr {
        self.address
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortSpec {
    Single(u16),
    Range(PortRange),
    Multi(Vec<PortSpec>),
}

impl FromStr for PortSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();

        if s.contains(',') {
            return parse_commas(s);
        }

        if let Some((start, end)) = s.split_once('-') {
            let start: u16 = parse_port(start)?;
            let end: u16 = parse_port(end)?;
            return Ok(PortSpec::Range(PortRange::new(start, end)?));
        }

        Ok(PortSpec::Single(parse_port(s)?))
    }
}

impl PortSpec {
    /// Ascending, duplicate-free list of every port the spec names.
    pub fn expand(&self) -> Vec<u16> {
        let mut ports: Vec<u16> = Vec::new();
        self.collect_into(&mut ports);
        ports.sort_unstable();
        ports.dedup();
        ports
    }

    fn collect_into(&self, ports: &mut Vec<u16>) {
        match self {
            PortSpec::Single(port) => ports.push(*port),
            PortSpec::Range(range) => ports.extend(range.to_iter()),
            PortSpec::Multi(specs) => {
                for spec in specs {
                    spec.collect_into(ports);
                }
            }
        }
    }
}

fn parse_port(s: &str) -> Result<u16, String> {
    let s = s.trim();
    match s.parse::<u16>() {
        Ok(0) => Err("port 0 is not scannable".to_string()),
        Ok(port) => Ok(port),
        Err(_) => Err(format!("'{s}' is not a port number (1-65535)")),
    }
}

/// Parses a comma-separated list of ports and ranges (e.g., "22, 80, 8000-8100").
pub fn parse_commas(s: &str) -> Result<PortSpec, String> {
    let mut specs: Vec<PortSpec> = Vec::new();

    for part in s.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }

        let spec = PortSpec::from_str(part)
            .map_err(|e| format!("failed to parse ports '{part}': {e}"))?;

        specs.push(spec);
    }

    if specs.is_empty() {
        return Err("no ports given".to_string());
    }

    Ok(PortSpec::Multi(specs))
}

/// Parses a comma-separated list of resolver addresses, dropping repeats.
pub fn parse_server_list(s: &str) -> Result<Vec<IpAddr>, String> {
    let mut seen: HashSet<IpAddr> = HashSet::new();
    let mut servers: Vec<IpAddr> = Vec::new();

    for part in s.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }

        let addr: IpAddr = part
            .parse()
            .map_err(|_| format!("'{part}' is not an IP address"))?;

        if seen.insert(addr) {
            servers.push(addr);
        }
    }

    Ok(servers)
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
