//! # Netprobe Core
//!
//! The orchestration layer shared by every probe:
//!
//! * **[`process`]**: runs external tools under a deadline and owns cleanup
//!   of any system state a probe changes.
//! * **[`normalize`]**: turns tool output into structured fields.
//! * **[`fallback`]**: decides when to simulate and labels it.
//! * **[`fanout`]**: bounded-concurrency execution over many targets.
//! * **[`registry`]**: plugin lookup, parameter coercion and dispatch.

pub mod fallback;
pub mod fanout;
pub mod normalize;
pub mod process;
pub mod registry;

pub use fanout::{Aggregate, FanOut, FanOutError, TargetFailure};
pub use process::{Invocation, ReleaseReport, Runner, StateScope, SystemRunner};
pub use registry::{DispatchError, ExecError, ExecutionContext, PluginExecutor, Registry, RegistryError};
