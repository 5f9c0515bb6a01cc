use std::collections::BTreeMap;

use netprobe_common::catalog::Catalog;
use netprobe_common::config::Config;
use netprobe_common::{RawParams, ValidationReason};
use netprobe_core::{DispatchError, ExecutionContext, Registry};
use serde_json::{Value, json};
use tokio::net::TcpListener;

fn registry() -> Registry {
    let context = ExecutionContext::new(Config::default(), Catalog::builtin().unwrap());
    netprobe_plugins::builtin_registry(context, &BTreeMap::new()).unwrap()
}

fn raw(value: Value) -> RawParams {
    match value {
        Value::Object(map) => map,
        _ => panic!("params must be an object"),
    }
}

#[test]
fn every_builtin_plugin_is_registered() {
    let ids: Vec<String> = registry().descriptors().iter().map(|d| d.id.clone()).collect();
    assert_eq!(
        ids,
        vec![
            "bandwidth_test",
            "dns_propagation",
            "mtu_tester",
            "packet_capture",
            "ping",
            "port_scanner",
            "tc_controller",
            "traceroute",
            "wifi_scanner",
        ]
    );
}

#[tokio::test]
async fn unknown_plugin_is_not_found() {
    let err = registry().dispatch("teleport", &RawParams::new()).await.unwrap_err();
    assert!(matches!(err, DispatchError::PluginNotFound(id) if id == "teleport"));
}

#[tokio::test]
async fn missing_required_parameter_names_it() {
    let err = registry().dispatch("port_scanner", &raw(json!({ "portRange": "80" }))).await.unwrap_err();
    match err {
        DispatchError::Validation(e) => {
            assert_eq!(e.param, "host");
            assert_eq!(e.reason, ValidationReason::Missing);
        }
        other => panic!("expected a validation error, got {other:?}"),
    }
}

#[tokio::test]
async fn out_of_range_value_is_rejected_before_running() {
    let params = raw(json!({ "host": "127.0.0.1", "portRange": "80", "concurrency": 5000 }));
    let err = registry().dispatch("port_scanner", &params).await.unwrap_err();
    assert!(matches!(
        err,
        DispatchError::Validation(ref e) if e.param == "concurrency"
            && matches!(e.reason, ValidationReason::OutOfRange { .. })
    ));
}

#[tokio::test]
async fn flag_like_host_never_reaches_a_tool() {
    let err = registry().dispatch("ping", &raw(json!({ "host": "-f" }))).await.unwrap_err();
    assert!(matches!(err, DispatchError::Validation(ref e) if e.param == "host"));
}

#[tokio::test]
async fn port_scan_finds_local_listeners() {
    let first = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let second = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let ports = [first.local_addr().unwrap().port(), second.local_addr().unwrap().port()];
    let range = format!("{},{}", ports[0], ports[1]);

    let params = raw(json!({ "host": "127.0.0.1", "portRange": range, "timeout": 1, "concurrency": 2 }));
    let payload = registry().dispatch("port_scanner", &params).await.unwrap();

    let mut open: Vec<u64> = payload["openPorts"]
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| entry["port"].as_u64().unwrap())
        .collect();
    open.sort();
    let mut expected: Vec<u64> = ports.iter().map(|&port| u64::from(port)).collect();
    expected.sort();

    assert_eq!(open, expected);
    assert_eq!(payload["totalPorts"], json!(2));
    assert_eq!(payload["closedPorts"], json!(0));
    assert_eq!(payload["simulated"], json!(false));
    assert!(payload["timestamp"].is_string());
}

#[tokio::test]
async fn unresolvable_host_is_reported_in_payload() {
    let params = raw(json!({ "host": "no-such-host.invalid", "portRange": "1-3" }));
    let payload = registry().dispatch("port_scanner", &params).await.unwrap();

    assert_eq!(payload["closedPorts"], json!(3));
    assert!(payload["error"].as_str().unwrap().contains("no-such-host.invalid"));
}
