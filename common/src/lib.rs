//! # Netprobe Common
//!
//! Types shared by every crate in the workspace:
//!
//! * **[`schema`]**: declarative plugin descriptors and parameter specs.
//! * **[`value`]**: coercion of untyped parameter input into typed values.
//! * **[`result`]**: invocation outcomes and normalized results.
//! * **[`error`]**: validation and descriptor errors.
//! * **[`config`]** / **[`catalog`]**: read-only settings loaded once at startup.
//! * **[`network`]**: probe targets, port ranges and interface lookup.

pub mod catalog;
pub mod config;
pub mod error;
pub mod network;
pub mod result;
pub mod schema;
pub mod value;

pub use error::{DescriptorError, ValidationError, ValidationReason};
pub use result::{InvocationOutcome, NormalizedResult, Payload};
pub use schema::{ParameterKind, ParameterSpec, PluginDescriptor, SelectOption};
pub use value::{ParameterValue, ParameterValues, RawParams};
