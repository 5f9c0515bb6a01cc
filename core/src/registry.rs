//! # Plugin Registry
//!
//! Maps plugin ids to their descriptor and executor, and dispatches calls:
//! look up, coerce the raw parameters, execute.
//!
//! The registry is built once at startup and only read afterwards. Dispatch
//! takes `&self` and keeps no per-call state, so one registry can serve any
//! number of concurrent calls.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use netprobe_common::catalog::Catalog;
use netprobe_common::config::Config;
use netprobe_common::value::coerce;
use netprobe_common::{DescriptorError, ParameterValues, Payload, PluginDescriptor, RawParams, ValidationError};
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

pub mod metadata;

/// Read-only state every executor may consult.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub config: Arc<Config>,
    pub catalog: Arc<Catalog>,
}

impl ExecutionContext {
    pub fn new(config: Config, catalog: Catalog) -> Self {
        Self {
            config: Arc::new(config),
            catalog: Arc::new(catalog),
        }
    }
}

/// Request-level failure raised by an executor.
///
/// Tool trouble is never an `ExecError`; it is reported inside the payload.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("no plugin named '{0}'")]
    PluginNotFound(String),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ExecError> for DispatchError {
    fn from(e: ExecError) -> Self {
        match e {
            ExecError::Validation(e) => DispatchError::Validation(e),
            ExecError::Internal(reason) => DispatchError::Internal(reason),
        }
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("plugin '{0}' is registered twice")]
    Duplicate(String),
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),
    #[error("malformed metadata in {origin}: {source}")]
    Metadata {
        origin: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("cannot read metadata from {origin}: {source}")]
    Io {
        origin: String,
        #[source]
        source: std::io::Error,
    },
    #[error("no metadata for plugin '{0}'")]
    MissingMetadata(String),
}

#[async_trait]
pub trait PluginExecutor: Send + Sync {
    async fn execute(&self, ctx: &ExecutionContext, params: &ParameterValues) -> Result<Payload, ExecError>;
}

struct Entry {
    descriptor: Arc<PluginDescriptor>,
    executor: Arc<dyn PluginExecutor>,
}

pub struct Registry {
    context: ExecutionContext,
    plugins: BTreeMap<String, Entry>,
}

impl Registry {
    pub fn new(context: ExecutionContext) -> Self {
        Self {
            context,
            plugins: BTreeMap::new(),
        }
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    /// Adds a plugin after checking its descriptor for internal consistency.
    pub fn register(
        &mut self,
        descriptor: PluginDescriptor,
        executor: Arc<dyn PluginExecutor>,
    ) -> Result<(), RegistryError> {
        if self.plugins.contains_key(&descriptor.id) {
            return Err(RegistryError::Duplicate(descriptor.id));
        }
        descriptor.validate()?;

        self.plugins.insert(
            descriptor.id.clone(),
            Entry {
                descriptor: Arc::new(descriptor),
                executor,
            },
        );
        Ok(())
    }

    pub fn descriptor(&self, id: &str) -> Option<Arc<PluginDescriptor>> {
        self.plugins.get(id).map(|entry| entry.descriptor.clone())
    }

    /// All descriptors, ordered by id.
    pub fn descriptors(&self) -> Vec<Arc<PluginDescriptor>> {
        self.plugins.values().map(|entry| entry.descriptor.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    pub async fn dispatch(&self, id: &str, raw: &RawParams) -> Result<Payload, DispatchError> {
        let entry: &Entry = self
            .plugins
            .get(id)
            .ok_or_else(|| DispatchError::PluginNotFound(id.to_string()))?;

        let params: ParameterValues = coerce(&entry.descriptor, raw).inspect_err(|e| {
            warn!(plugin = id, "rejected parameters: {e}");
        })?;

        info!(plugin = id, "running {}", entry.descriptor.name);
        let mut payload: Payload = entry.executor.execute(&self.context, &params).await?;

        payload
            .entry("timestamp")
            .or_insert_with(|| Value::String(chrono::Utc::now().to_rfc3339()));
        payload.entry("simulated").or_insert(Value::Bool(false));

        let simulated: bool = payload.get("simulated").and_then(Value::as_bool).unwrap_or(false);
        info!(plugin = id, simulated, "finished {}", entry.descriptor.name);

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

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Echo {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PluginExecutor for Echo {
        async fn execute(&self, _ctx: &ExecutionContext, params: &ParameterValues) -> Result<Payload, ExecError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut payload = Payload::new();
            payload.insert("count".into(), json!(params.integer("count")));
            Ok(payload)
        }
    }

    fn descriptor(id: &str) -> PluginDescriptor {
        serde_json::from_value(json!({
            "id": id,
            "name": "Echo",
            "parameters": [
                { "id": "count", "name": "Count", "type": "number", "required": true,
                  "min": 1, "max": 10, "step": 1 }
            ]
        }))
        .unwrap()
    }

    fn registry() -> (Registry, Arc<Echo>) {
        let context = ExecutionContext::new(Config::default(), Catalog::builtin().unwrap());
        let mut registry = Registry::new(context);
        let echo = Arc::new(Echo { calls: AtomicUsize::new(0) });
        registry.register(descriptor("echo"), echo.clone()).unwrap();
        (registry, echo)
    }

    fn raw(value: Value) -> RawParams {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn dispatch_coerces_and_stamps_payload() {
        let (registry, echo) = registry();
        let payload = registry.dispatch("echo", &raw(json!({ "count": "3" }))).await.unwrap();

        assert_eq!(payload["count"], json!(3));
        assert_eq!(payload["simulated"], json!(false));
        assert!(payload["timestamp"].is_string());
        assert_eq!(echo.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_plugin_is_not_found() {
        let (registry, _) = registry();
        let err = registry.dispatch("nope", &RawParams::new()).await.unwrap_err();
        assert!(matches!(err, DispatchError::PluginNotFound(id) if id == "nope"));
    }

    #[tokio::test]
    async fn invalid_parameters_never_reach_executor() {
        let (registry, echo) = registry();
        let err = registry.dispatch("echo", &raw(json!({ "count": 99 }))).await.unwrap_err();
        assert!(matches!(err, DispatchError::Validation(ref e) if e.param == "count"));
        assert_eq!(echo.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn duplicate_registration_fails() {
        let (mut registry, echo) = registry();
        let err = registry.register(descriptor("echo"), echo).unwrap_err();
        assert!(matches!(err, RegistryError::Duplicate(id) if id == "echo"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn inconsistent_descriptor_fails() {
        let (mut registry, echo) = registry();
        let mut bad = descriptor("bad");
        bad.parameters[0].default = Some(json!(50));
        assert!(matches!(registry.register(bad, echo), Err(RegistryError::Descriptor(_))));
    }

    #[test]
    fn registry_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Registry>();
    }
}
