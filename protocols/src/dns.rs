//! # DNS Queries
//!
//! Builds standard recursive queries, sends them to one resolver over UDP and
//! decodes the answer section into printable record strings.
//!
//! Only records of the requested type are returned. A CNAME chain in front of
//! an `A` answer therefore yields just the addresses.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use dns_parser::{Builder, Packet, QueryClass, QueryType, RData, ResponseCode};
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::time::{Instant, timeout_at};
use tracing::debug;

pub const DNS_PORT: u16 = 53;
const MAX_DATAGRAM: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordType {
    A,
    Aaaa,
    Cname,
    Mx,
    Txt,
    Ns,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::Aaaa => "AAAA",
            RecordType::Cname => "CNAME",
            RecordType::Mx => "MX",
            RecordType::Txt => "TXT",
            RecordType::Ns => "NS",
        }
    }

    fn query_type(&self) -> QueryType {
        match self {
            RecordType::A => QueryType::A,
            RecordType::Aaaa => QueryType::AAAA,
            RecordType::Cname => QueryType::CNAME,
            RecordType::Mx => QueryType::MX,
            RecordType::Txt => QueryType::TXT,
            RecordType::Ns => QueryType::NS,
        }
    }
}

impl FromStr for RecordType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A" => Ok(RecordType::A),
            "AAAA" => Ok(RecordType::Aaaa),
            "CNAME" => Ok(RecordType::Cname),
            "MX" => Ok(RecordType::Mx),
            "TXT" => Ok(RecordType::Txt),
            "NS" => Ok(RecordType::Ns),
            other => Err(format!("unsupported record type: {other}")),
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum DnsError {
    #[error("no response within {0:?}")]
    Timeout(Duration),
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot encode a query for '{0}'")]
    Encode(String),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("response id {got:#06x} does not match query id {expected:#06x}")]
    IdMismatch { expected: u16, got: u16 },
    #[error("server answered {0}")]
    Rcode(String),
}

/// Decoded answer section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DnsAnswer {
    pub records: Vec<String>,
    /// Lowest TTL among the returned records.
    pub ttl: Option<u32>,
}

impl DnsAnswer {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

pub fn build_query(id: u16, domain: &str, record_type: RecordType) -> Result<Vec<u8>, DnsError> {
    let name: &str = domain.trim().trim_end_matches('.');
    if name.is_empty() || name.split('.').any(|label| label.is_empty() || label.len() > 63) {
        return Err(DnsError::Encode(domain.to_string()));
    }

    let mut builder: Builder = Builder::new_query(id, true);
    builder.add_question(name, false, record_type.query_type(), QueryClass::IN);
    builder.build().map_err(|_truncated| DnsError::Encode(domain.to_string()))
}

pub fn parse_response(
    expected_id: u16,
    record_type: RecordType,
    payload: &[u8],
) -> Result<DnsAnswer, DnsError> {
    let packet: Packet = Packet::parse(payload).map_err(|e| DnsError::Malformed(e.to_string()))?;

    if packet.header.id != expected_id {
        return Err(DnsError::IdMismatch {
            expected: expected_id,
            got: packet.header.id,
        });
    }

    if packet.header.response_code != ResponseCode::NoError {
        return Err(DnsError::Rcode(format!("{:?}", packet.header.response_code)));
    }

    let mut answer: DnsAnswer = DnsAnswer::default();
    for record in &packet.answers {
        let Some(text) = record_text(&record.data, record_type) else {
            continue;
        };
        answer.records.push(text);
        answer.ttl = Some(answer.ttl.map_or(record.ttl, |ttl| ttl.min(record.ttl)));
    }

    Ok(answer)
}

fn record_text(data: &RData, wanted: RecordType) -> Option<String> {
    match (data, wanted) {
        (RData::A(record), RecordType::A) => Some(record.0.to_string()),
        (RData::AAAA(record), RecordType::Aaaa) => Some(record.0.to_string()),
        (RData::CNAME(record), RecordType::Cname) => Some(record.0.to_string()),
        (RData::NS(record), RecordType::Ns) => Some(record.0.to_string()),
        (RData::MX(record), RecordType::Mx) => {
            Some(format!("{} {}", record.preference, record.exchange))
        }
        (RData::TXT(record), RecordType::Txt) => Some(
            record
                .iter()
                .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
                .collect::<Vec<String>>()
                .join(" "),
        ),
        _ => None,
    }
}

/// Queries `server` on the standard DNS port.
pub async fn query(
    server: IpAddr,
    domain: &str,
    record_type: RecordType,
    wait: Duration,
) -> Result<DnsAnswer, DnsError> {
    query_at(SocketAddr::new(server, DNS_PORT), domain, record_type, wait).await
}

/// Sends one query and waits for the matching response.
///
/// Datagrams carrying a different transaction id are discarded while the
/// deadline lasts.
pub async fn query_at(
    server: SocketAddr,
    domain: &str,
    record_type: RecordType,
    wait: Duration,
) -> Result<DnsAnswer, DnsError> {
    let id: u16 = rand::random();
    let query: Vec<u8> = build_query(id, domain, record_type)?;

    let bind_addr: SocketAddr = match server {
        SocketAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
        SocketAddr::V6(_) => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
    };
    let socket: UdpSocket = UdpSocket::bind(bind_addr).await?;
    socket.connect(server).await?;
    socket.send(&query).await?;

    let deadline: Instant = Instant::now() + wait;
    let mut buffer: Vec<u8> = vec![0u8; MAX_DATAGRAM];

    loop {
        let len: usize = timeout_at(deadline, socket.recv(&mut buffer))
            .await
            .map_err(|_elapsed| DnsError::Timeout(wait))??;

        match parse_response(id, record_type, &buffer[..len]) {
            Err(DnsError::IdMismatch { got, .. }) => {
                debug!(%server, got, "discarding response for another query");
            }
            other => return other,
        }
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
