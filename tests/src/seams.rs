use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use netprobe_common::catalog::Catalog;
use netprobe_common::config::Config;
use netprobe_common::{InvocationOutcome, PluginDescriptor, RawParams};
use netprobe_core::{ExecutionContext, Invocation, PluginExecutor, Registry, Runner};
use netprobe_plugins::dns_propagation::{DnsPropagation, RecordLookup};
use netprobe_plugins::mtu_tester::MtuTester;
use netprobe_plugins::ping::Ping;
use netprobe_protocols::dns::{DnsAnswer, DnsError, RecordType};
use serde_json::{Value, json};

const CATALOG: &str = r#"{
  "dns_servers": [
    { "name": "Alpha", "address": "10.0.0.1", "country": "USA", "provider": "Alpha" },
    { "name": "Beta", "address": "10.0.0.2", "country": "Germany", "provider": "Beta" },
    { "name": "Gamma", "address": "10.0.0.3", "country": "Japan", "provider": "Gamma" },
    { "name": "Delta", "address": "10.0.0.4", "country": "Brazil", "provider": "Delta" }
  ]
}"#;

fn descriptor(id: &str) -> PluginDescriptor {
    netprobe_plugins::builtin_descriptors()
        .unwrap()
        .into_iter()
        .find(|descriptor| descriptor.id == id)
        .unwrap()
}

/// A registry holding just `id`, backed by `executor`.
fn registry_with(id: &str, executor: Arc<dyn PluginExecutor>) -> Registry {
    let context = ExecutionContext::new(Config::default(), Catalog::from_json(CATALOG).unwrap());
    let mut registry = Registry::new(context);
    registry.register(descriptor(id), executor).unwrap();
    registry
}

fn raw(value: Value) -> RawParams {
    match value {
        Value::Object(map) => map,
        _ => panic!("params must be an object"),
    }
}

struct ZoneLookup {
    queried: Mutex<Vec<(IpAddr, String, RecordType)>>,
}

#[async_trait]
impl RecordLookup for ZoneLookup {
    async fn lookup(
        &self,
        server: IpAddr,
        domain: &str,
        record_type: RecordType,
        _wait: Duration,
    ) -> Result<DnsAnswer, DnsError> {
        self.queried.lock().unwrap().push((server, domain.to_string(), record_type));
        let answer = |records: &[&str]| DnsAnswer {
            records: records.iter().map(|r| r.to_string()).collect(),
            ttl: Some(300),
        };
        match server.to_string().as_str() {
            "10.0.0.1" | "10.0.0.2" => Ok(answer(&["93.184.216.34"])),
            "10.0.0.3" => Ok(answer(&[])),
            "10.0.0.4" => Err(DnsError::Rcode("SERVFAIL".into())),
            _ => Ok(answer(&["198.51.100.7"])),
        }
    }
}

#[tokio::test]
async fn propagation_counts_every_server() {
    let lookup = Arc::new(ZoneLookup { queried: Mutex::new(Vec::new()) });
    let registry = registry_with("dns_propagation", Arc::new(DnsPropagation::new(lookup.clone())));

    let params = raw(json!({
        "domain": "example.com.",
        "record_type": "A",
        "custom_dns_servers": "10.0.0.5, 10.0.0.1",
    }));
    let payload = registry.dispatch("dns_propagation", &params).await.unwrap();

    assert_eq!(payload["server_count"], json!(5));
    assert_eq!(payload["propagated_count"], json!(3));
    assert_eq!(payload["not_propagated_count"], json!(1));
    assert_eq!(payload["error_count"], json!(1));
    assert_eq!(payload["propagation_percentage"], json!(60.0));
    assert_eq!(payload["most_common_record"], json!("93.184.216.34"));
    assert_eq!(payload["most_common_record_count"], json!(2));
    assert_eq!(payload["status"], json!("partially_propagated"));

    let queried = lookup.queried.lock().unwrap();
    assert_eq!(queried.len(), 5);
    assert!(queried.iter().all(|(_, domain, rt)| domain == "example.com" && *rt == RecordType::A));
}

#[tokio::test]
async fn propagation_rejects_bad_custom_server() {
    let lookup = Arc::new(ZoneLookup { queried: Mutex::new(Vec::new()) });
    let registry = registry_with("dns_propagation", Arc::new(DnsPropagation::new(lookup.clone())));

    let params = raw(json!({ "domain": "example.com", "custom_dns_servers": "10.0.0.9, resolver" }));
    assert!(registry.dispatch("dns_propagation", &params).await.is_err());
    assert!(lookup.queried.lock().unwrap().is_empty());
}

/// A path that carries frames up to `mtu` bytes, with ping installed.
struct Path {
    mtu: u32,
}

#[async_trait]
impl Runner for Path {
    async fn run(&self, invocation: Invocation) -> InvocationOutcome {
        let args = invocation.arguments();
        let payload: Option<u32> = args
            .iter()
            .position(|arg| arg == "-s")
            .and_then(|i| args.get(i + 1))
            .and_then(|size| size.parse().ok());

        match payload {
            Some(size) if size + 28 > self.mtu => InvocationOutcome::ProcessError {
                cause: "ping exited with status 1: message too long".into(),
                stdout: String::new(),
                stderr: String::new(),
            },
            _ => InvocationOutcome::Success {
                stdout: "1 packets transmitted, 1 received".into(),
                stderr: String::new(),
                exit_code: 0,
            },
        }
    }
}

#[tokio::test]
async fn mtu_search_finds_off_grid_path_mtu() {
    let registry = registry_with("mtu_tester", Arc::new(MtuTester::new(Arc::new(Path { mtu: 1433 }))));
    let params = raw(json!({
        "target": "192.0.2.1",
        "min_mtu": 1200,
        "max_mtu": 1500,
        "step_size": 8,
        "timeout": 1,
    }));

    let payload = registry.dispatch("mtu_tester", &params).await.unwrap();
    assert_eq!(payload["optimum_mtu"], json!(1433));
    assert_eq!(payload["simulated"], json!(false));
}

#[tokio::test]
async fn wider_bounds_never_lower_the_optimum() {
    let mut previous: u64 = 0;
    for max in [1300, 1400, 1500, 9000] {
        let registry = registry_with("mtu_tester", Arc::new(MtuTester::new(Arc::new(Path { mtu: 1450 }))));
        let params = raw(json!({ "target": "192.0.2.1", "min_mtu": 576, "max_mtu": max, "timeout": 1 }));
        let optimum = registry.dispatch("mtu_tester", &params).await.unwrap()["optimum_mtu"]
            .as_u64()
            .unwrap();

        assert!(optimum >= previous, "max {max} gave {optimum}, below {previous}");
        assert!(optimum <= 1450);
        previous = optimum;
    }
    assert_eq!(previous, 1450);
}

struct NothingInstalled;

#[async_trait]
impl Runner for NothingInstalled {
    async fn run(&self, invocation: Invocation) -> InvocationOutcome {
        InvocationOutcome::ToolMissing {
            program: invocation.program().to_string(),
        }
    }
}

#[tokio::test]
async fn missing_tool_yields_flagged_simulation() {
    let registry = registry_with("ping", Arc::new(Ping::new(Arc::new(NothingInstalled))));
    let params = raw(json!({ "host": "127.0.0.1", "count": 3 }));

    let payload = registry.dispatch("ping", &params).await.unwrap();
    assert_eq!(payload["simulated"], json!(true));
    assert!(payload["note"].as_str().unwrap().contains("ping"));
    assert_eq!(payload["host"], json!("127.0.0.1"));
    assert!(payload["timestamp"].is_string());
}
