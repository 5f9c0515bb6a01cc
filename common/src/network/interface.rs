use pnet::datalink::{self, NetworkInterface};

#[cfg(target_os = "linux")]
use linux_impl::is_wireless;
#[cfg(not(target_os = "linux"))]
use other_impl::is_wireless;

pub fn find_interface(name: &str) -> Option<NetworkInterface> {
    datalink::interfaces()
        .into_iter()
        .find(|interface| interface.name == name)
}

pub fn interface_exists(name: &str) -> bool {
    find_interface(name).is_some()
}

/// Name of the first wireless interface, preferring ones that are up.
pub fn first_wireless() -> Option<String> {
    select_wireless(datalink::interfaces(), is_wireless)
}

pub fn is_up(name: &str) -> bool {
    find_interface(name).is_some_and(|interface| interface.is_up())
}

fn select_wireless(
    interfaces: Vec<NetworkInterface>,
    is_wireless: impl Fn(&NetworkInterface) -> bool,
) -> Option<String> {
    let wireless: Vec<NetworkInterface> = interfaces
        .into_iter()
        .filter(|interface| !interface.is_loopback() && is_wireless(interface))
        .collect();

    wireless
        .iter()
        .find(|interface| interface.is_up())
        .or(wireless.first())
        .map(|interface| interface.name.clone())
}

#[cfg(target_os = "linux")]
mod linux_impl {
    use super::*;
    use std::path::Path;

    pub fn is_wireless(interface: &NetworkInterface) -> bool {
        Path::new(&format!("/sys/class/net/{}/wireless", interface.name)).exists()
    }
}

#[cfg(not(target_os = "linux"))]
mod other_impl {
    use super::*;

    pub fn is_wireless(interface: &NetworkInterface) -> bool {
        interface.name.starts_with("wl")
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
