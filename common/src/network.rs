//! # Network Primitives
//!
//! * **[`target`]**: probe targets and the parsers that expand parameters into them.
//! * **[`range`]**: inclusive TCP port ranges.
//! * **[`interface`]**: local interface lookup.

pub mod interface;
pub mod range;
pub mod target;
