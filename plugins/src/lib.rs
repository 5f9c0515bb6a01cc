//! # Netprobe Plugins
//!
//! The built-in diagnostic probes. Each module pairs an executor with the
//! metadata record under `metadata/`, embedded at compile time.
//!
//! Probes that shell out hold an [`Arc<dyn Runner>`](netprobe_core::Runner)
//! so tests can script tool output without touching the host.

use std::collections::BTreeMap;
use std::sync::Arc;

use netprobe_common::PluginDescriptor;
use netprobe_core::registry::metadata::parse_descriptor;
use netprobe_core::{ExecutionContext, PluginExecutor, Registry, RegistryError};
use tracing::{debug, warn};

pub mod bandwidth;
pub mod dns_propagation;
pub mod mtu_tester;
pub mod packet_capture;
pub mod ping;
pub mod port_scanner;
pub mod tc_controller;
pub mod traceroute;
pub mod wifi_scanner;

mod support;

/// Embedded metadata, keyed by the file it came from.
const BUILTIN_METADATA: [(&str, &str); 9] = [
    ("ping.json", include_str!("../metadata/ping.json")),
    ("traceroute.json", include_str!("../metadata/traceroute.json")),
    ("port_scanner.json", include_str!("../metadata/port_scanner.json")),
    ("dns_propagation.json", include_str!("../metadata/dns_propagation.json")),
    ("mtu_tester.json", include_str!("../metadata/mtu_tester.json")),
    ("bandwidth_test.json", include_str!("../metadata/bandwidth_test.json")),
    ("wifi_scanner.json", include_str!("../metadata/wifi_scanner.json")),
    ("packet_capture.json", include_str!("../metadata/packet_capture.json")),
    ("tc_controller.json", include_str!("../metadata/tc_controller.json")),
];

/// Executors of every built-in plugin, keyed by plugin id.
pub fn builtin_executors() -> BTreeMap<&'static str, Arc<dyn PluginExecutor>> {
    let executors: [(&'static str, Arc<dyn PluginExecutor>); 9] = [
        ("ping", Arc::new(ping::Ping::default())),
        ("traceroute", Arc::new(traceroute::Traceroute::default())),
        ("port_scanner", Arc::new(port_scanner::PortScanner::default())),
        ("dns_propagation", Arc::new(dns_propagation::DnsPropagation::default())),
        ("mtu_tester", Arc::new(mtu_tester::MtuTester::default())),
        ("bandwidth_test", Arc::new(bandwidth::BandwidthTest::default())),
        ("wifi_scanner", Arc::new(wifi_scanner::WifiScanner::default())),
        ("packet_capture", Arc::new(packet_capture::PacketCapture::default())),
        ("tc_controller", Arc::new(tc_controller::TcController::default())),
    ];
    executors.into_iter().collect()
}

/// Descriptors shipped with the binary.
pub fn builtin_descriptors() -> Result<Vec<PluginDescriptor>, RegistryError> {
    BUILTIN_METADATA
        .iter()
        .map(|(origin, text)| parse_descriptor(text, &format!("builtin:{origin}")))
        .collect()
}

/// Builds a registry of every built-in plugin.
///
/// A descriptor in `overrides` replaces the embedded one with the same id.
/// Overrides naming a plugin that has no executor are ignored.
pub fn builtin_registry(
    context: ExecutionContext,
    overrides: &BTreeMap<String, PluginDescriptor>,
) -> Result<Registry, RegistryError> {
    let mut executors = builtin_executors();
    let mut registry = Registry::new(context);

    for embedded in builtin_descriptors()? {
        let executor: Arc<dyn PluginExecutor> = executors
            .remove(embedded.id.as_str())
            .ok_or_else(|| RegistryError::MissingMetadata(embedded.id.clone()))?;

        let descriptor: PluginDescriptor = match overrides.get(&embedded.id) {
            Some(custom) => {
                debug!(plugin = %custom.id, "using metadata override");
                custom.clone()
            }
            None => embedded,
        };
        registry.register(descriptor, executor)?;
    }

    if let Some(id) = executors.keys().next() {
        return Err(RegistryError::MissingMetadata(id.to_string()));
    }

    for id in overrides.keys() {
        if registry.descriptor(id).is_none() {
            warn!(plugin = %id, "metadata override names no built-in plugin, ignoring");
        }
    }

    Ok(registry)
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
