//! # Netprobe Protocols
//!
//! Wire-level helpers the probes speak directly instead of shelling out:
//!
//! * **[`dns`]**: single-question DNS queries over UDP.
//! * **[`tcp`]**: TCP connect probes and name resolution.

pub mod dns;
pub mod tcp;
