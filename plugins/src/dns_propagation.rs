//! # DNS Propagation
//!
//! Asks every catalogue resolver (plus any custom ones) for the same record and
//! compares the answers. Each resolver is one fan-out target; a resolver that
//! times out or answers with an error only affects its own entry.
//!
//! Summary statistics are computed once, after every resolver has reported.

use std::net::IpAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use netprobe_common::catalog::DnsServer;
use netprobe_common::network::target::parse_server_list;
use netprobe_common::{ParameterValues, Payload, ValidationError};
use netprobe_core::fanout::{Slot, most_common, percentage};
use netprobe_core::{ExecError, ExecutionContext, FanOut, PluginExecutor};
use netprobe_protocols::dns::{self, DnsAnswer, DnsError, RecordType};
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::support::{object, round2, seconds};

/// Resolution of one record at one server. Swapped out in tests.
#[async_trait]
pub trait RecordLookup: Send + Sync + 'static {
    async fn lookup(
        &self,
        server: IpAddr,
        domain: &str,
        record_type: RecordType,
        wait: Duration,
    ) -> Result<DnsAnswer, DnsError>;
}

/// Real queries over UDP port 53.
#[derive(Debug, Clone, Copy, Default)]
pub struct UdpLookup;

#[async_trait]
impl RecordLookup for UdpLookup {
    async fn lookup(
        &self,
        server: IpAddr,
        domain: &str,
        record_type: RecordType,
        wait: Duration,
    ) -> Result<DnsAnswer, DnsError> {
        dns::query(server, domain, record_type, wait).await
    }
}

pub struct DnsPropagation {
    lookup: Arc<dyn RecordLookup>,
}

impl DnsPropagation {
    pub fn new(lookup: Arc<dyn RecordLookup>) -> Self {
        Self { lookup }
    }
}

impl Default for DnsPropagation {
    fn default() -> Self {
        Self::new(Arc::new(UdpLookup))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Propagated,
    NotPropagated,
    Error,
}

impl Status {
    fn as_str(&self) -> &'static str {
        match self {
            Status::Propagated => "propagated",
            Status::NotPropagated => "not_propagated",
            Status::Error => "error",
        }
    }
}

struct ServerReport {
    status: Status,
    records: Vec<String>,
    ttl: Option<u32>,
    elapsed: Duration,
    error: Option<String>,
}

impl ServerReport {
    fn from_lookup(result: Result<DnsAnswer, DnsError>, elapsed: Duration) -> Self {
        match result {
            Ok(answer) if answer.is_empty() => Self {
                status: Status::NotPropagated,
                records: Vec::new(),
                ttl: None,
                elapsed,
                error: None,
            },
            Ok(answer) => Self {
                status: Status::Propagated,
                records: answer.records,
                ttl: answer.ttl,
                elapsed,
                error: None,
            },
            Err(e) => Self {
                status: Status::Error,
                records: Vec::new(),
                ttl: None,
                elapsed,
                error: Some(e.to_string()),
            },
        }
    }

    fn aborted(reason: String) -> Self {
        Self {
            status: Status::Error,
            records: Vec::new(),
            ttl: None,
            elapsed: Duration::ZERO,
            error: Some(reason),
        }
    }
}

/// Catalogue resolvers followed by custom ones not already listed.
fn server_list(catalogue: &[DnsServer], custom: Option<&str>) -> Result<Vec<DnsServer>, ValidationError> {
    let mut servers: Vec<DnsServer> = catalogue.to_vec();

    if let Some(list) = custom.filter(|list| !list.trim().is_empty()) {
        let addresses: Vec<IpAddr> =
            parse_server_list(list).map_err(|e| ValidationError::invalid("custom_dns_servers", e))?;
        for address in addresses {
            if servers.iter().any(|server| server.address == address) {
                debug!(%address, "custom resolver already in catalogue");
                continue;
            }
            servers.push(DnsServer::custom(address));
        }
    }

    Ok(servers)
}

#[async_trait]
impl PluginExecutor for DnsPropagation {
    async fn execute(&self, ctx: &ExecutionContext, params: &ParameterValues) -> Result<Payload, ExecError> {
        let domain: String = params.require_text("domain")?.trim_end_matches('.').to_string();
        let record_type: RecordType = RecordType::from_str(params.text("record_type").unwrap_or("A"))
            .map_err(|e| ValidationError::invalid("record_type", e))?;
        dns::build_query(0, &domain, record_type).map_err(|e| ValidationError::invalid("domain", e.to_string()))?;

        let wait: Duration = seconds(params, "timeout", 5.0);
        let servers: Vec<DnsServer> = server_list(&ctx.catalog.dns_servers, params.text("custom_dns_servers"))?;
        let requested: usize = params.integer("concurrency").unwrap_or(16).max(1) as usize;
        let ceiling: usize = ctx.config.ceiling(requested);

        info!(%domain, %record_type, servers = servers.len(), ceiling, "checking propagation");

        let lookup = self.lookup.clone();
        let query_domain: Arc<str> = Arc::from(domain.as_str());
        let aggregate = FanOut::new(ceiling)
            .run(servers, move |server: DnsServer| {
                let lookup = lookup.clone();
                let domain = query_domain.clone();
                async move {
                    let started = Instant::now();
                    let result = lookup.lookup(server.address, &domain, record_type, wait).await;
                    (result, started.elapsed())
                }
            })
            .await
            .map_err(|e| ExecError::Internal(e.to_string()))?;

        let total: usize = aggregate.len();
        let reports: Vec<(DnsServer, ServerReport)> = aggregate
            .into_entries()
            .into_iter()
            .map(|(server, slot): (DnsServer, Slot<_>)| {
                let report = match slot {
                    Ok((result, elapsed)) => ServerReport::from_lookup(result, elapsed),
                    Err(failure) => ServerReport::aborted(failure.to_string()),
                };
                (server, report)
            })
            .collect();

        let count = |status: Status| reports.iter().filter(|(_, report)| report.status == status).count();
        let propagated: usize = count(Status::Propagated);
        let not_propagated: usize = count(Status::NotPropagated);
        let errors: usize = count(Status::Error);

        let (common_record, common_count) = most_common(
            reports
                .iter()
                .filter(|(_, report)| report.status == Status::Propagated)
                .flat_map(|(_, report)| report.records.iter().cloned()),
        )
        .unwrap_or_default();

        let status: &str = if total > 0 && propagated == total {
            "fully_propagated"
        } else if propagated > 0 {
            "partially_propagated"
        } else {
            "not_propagated"
        };

        let results: Vec<Value> = reports
            .iter()
            .map(|(server, report)| {
                json!({
                    "server": server.address.to_string(),
                    "name": server.name,
                    "country": server.country,
                    "provider": server.provider,
                    "status": report.status.as_str(),
                    "records": report.records,
                    "ttl": report.ttl,
                    "timeMs": round2(report.elapsed.as_secs_f64() * 1000.0),
                    "error": report.error,
                })
            })
            .collect();

        Ok(object(json!({
            "domain": domain,
            "record_type": record_type.as_str(),
            "timeout": wait.as_secs_f64(),
            "server_count": total,
            "concurrency": ceiling,
            "results": results,
            "propagated_count": propagated,
            "not_propagated_count": not_propagated,
            "error_count": errors,
            "propagation_percentage": round2(percentage(propagated, total)),
            "most_common_record": common_record,
            "most_common_record_count": common_count,
            "status": status,
        })))
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
    use crate::support::testing::context;
    use netprobe_common::ParameterValue;
    use std::collections::HashMap;

    /// Answers from a fixed table; unlisted servers time out.
    struct TableLookup {
        answers: HashMap<IpAddr, Vec<&'static str>>,
        default: Option<Vec<&'static str>>,
    }

    #[async_trait]
    impl RecordLookup for TableLookup {
        async fn lookup(
            &self,
            server: IpAddr,
            _domain: &str,
            _record_type: RecordType,
            wait: Duration,
        ) -> Result<DnsAnswer, DnsError> {
            let records = self
                .answers
                .get(&server)
                .or(self.default.as_ref())
                .ok_or(DnsError::Timeout(wait))?;
            Ok(DnsAnswer {
                records: records.iter().map(|r| r.to_string()).collect(),
                ttl: Some(300),
            })
        }
    }

    fn params(domain: &str) -> ParameterValues {
        ParameterValues::new()
            .with("domain", ParameterValue::Text(domain.into()))
            .with("record_type", ParameterValue::Text("A".into()))
            .with("timeout", ParameterValue::Integer(1))
    }

    async fn check(lookup: TableLookup, params: ParameterValues) -> Result<Payload, ExecError> {
        DnsPropagation::new(Arc::new(lookup)).execute(&context(), &params).await
    }

    fn ip(text: &str) -> IpAddr {
        text.parse().unwrap()
    }

    #[tokio::test]
    async fn unanimous_answers_are_fully_propagated() {
        let lookup = TableLookup { answers: HashMap::new(), default: Some(vec!["93.184.216.34"]) };
        let payload = check(lookup, params("example.com")).await.unwrap();

        let total = context().catalog.dns_servers.len();
        assert_eq!(payload["status"], json!("fully_propagated"));
        assert_eq!(payload["propagation_percentage"], json!(100.0));
        assert_eq!(payload["server_count"], json!(total));
        assert_eq!(payload["most_common_record"], json!("93.184.216.34"));
        assert_eq!(payload["most_common_record_count"], json!(total));
    }

    #[tokio::test]
    async fn silence_everywhere_is_not_propagated() {
        let lookup = TableLookup { answers: HashMap::new(), default: None };
        let payload = check(lookup, params("example.com")).await.unwrap();

        assert_eq!(payload["status"], json!("not_propagated"));
        assert_eq!(payload["most_common_record"], json!(""));
        assert_eq!(payload["propagated_count"], json!(0));
        assert_eq!(payload["error_count"], payload["server_count"]);
    }

    #[tokio::test]
    async fn mixed_answers_are_partial_and_counted_per_server() {
        let lookup = TableLookup {
            answers: HashMap::from([
                (ip("8.8.8.8"), vec!["1.2.3.4"]),
                (ip("1.1.1.1"), vec!["1.2.3.4"]),
                (ip("9.9.9.9"), vec!["5.6.7.8"]),
                (ip("8.8.4.4"), vec![]),
            ]),
            default: None,
        };
        let payload = check(lookup, params("example.com")).await.unwrap();

        assert_eq!(payload["status"], json!("partially_propagated"));
        assert_eq!(payload["propagated_count"], json!(3));
        assert_eq!(payload["not_propagated_count"], json!(1));
        assert_eq!(payload["most_common_record"], json!("1.2.3.4"));
        assert_eq!(payload["most_common_record_count"], json!(2));

        let results = payload["results"].as_array().unwrap();
        assert_eq!(results[0]["server"], json!("8.8.8.8"));
        assert_eq!(results[0]["name"], json!("Google DNS"));
        assert_eq!(results[1]["status"], json!("not_propagated"));
    }

    #[tokio::test]
    async fn custom_servers_are_appended_once() {
        let lookup = TableLookup { answers: HashMap::new(), default: Some(vec!["1.2.3.4"]) };
        let params = params("example.com")
            .with("custom_dns_servers", ParameterValue::Text("10.0.0.53, 8.8.8.8, 10.0.0.53".into()));
        let payload = check(lookup, params).await.unwrap();

        let total = context().catalog.dns_servers.len();
        assert_eq!(payload["server_count"], json!(total + 1));
        let last = payload["results"].as_array().unwrap().last().unwrap().clone();
        assert_eq!(last["name"], json!("Custom DNS (10.0.0.53)"));
    }

    #[tokio::test]
    async fn invalid_input_never_queries() {
        let lookup = || TableLookup { answers: HashMap::new(), default: None };

        let bad_server = params("example.com").with("custom_dns_servers", ParameterValue::Text("not-an-ip".into()));
        let err = check(lookup(), bad_server).await.unwrap_err();
        assert!(matches!(err, ExecError::Validation(ref e) if e.param == "custom_dns_servers"));

        let long_label = format!("{}.com", "a".repeat(70));
        let err = check(lookup(), params(&long_label)).await.unwrap_err();
        assert!(matches!(err, ExecError::Validation(ref e) if e.param == "domain"));
    }
}
