use std::io::ErrorKind;
use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};

use tokio::net::TcpStream;
use tokio::time::timeout;

/// What a single connect attempt revealed about a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortState {
    /// The handshake completed.
    Open { latency: Duration },
    /// The host answered with a reset or the connect failed outright.
    Closed,
    /// No answer before the probe timeout.
    Filtered,
}

impl PortState {
    pub fn is_open(&self) -> bool {
        matches!(self, PortState::Open { .. })
    }
}

pub async fn connect_probe(addr: SocketAddr, probe_timeout: Duration) -> PortState {
    let started: Instant = Instant::now();

    match timeout(probe_timeout, TcpStream::connect(addr)).await {
        Ok(Ok(_stream)) => PortState::Open {
            latency: started.elapsed(),
        },
        Ok(Err(_)) => PortState::Closed,
        Err(_elapsed) => PortState::Filtered,
    }
}

/// Round-trip time of a TCP handshake to `addr`.
///
/// A refused connection still measures one round trip, so it counts.
pub async fn handshake_rtt(addr: SocketAddr, probe_timeout: Duration) -> Option<Duration> {
    let started: Instant = Instant::now();

    match timeout(probe_timeout, TcpStream::connect(addr)).await {
        Ok(Ok(_stream)) => Some(started.elapsed()),
        Ok(Err(e)) if e.kind() == ErrorKind::ConnectionRefused => Some(started.elapsed()),
        _ => None,
    }
}

/// Resolves a host name or address literal to its first address.
pub async fn resolve(host: &str) -> Option<IpAddr> {
    if let Ok(addr) = host.parse::<IpAddr>() {
        return Some(addr);
    }

    tokio::net::lookup_host((host, 0))
        .await
        .ok()?
        .map(|socket| socket.ip())
        .next()
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
    use std::net::Ipv4Addr;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn connect_probe_finds_listening_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let state = connect_probe(addr, Duration::from_secs(1)).await;
        assert!(state.is_open());
    }

    #[tokio::test]
    async fn connect_probe_reports_closed_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let state = connect_probe(addr, Duration::from_secs(1)).await;
        assert_eq!(state, PortState::Closed);
    }

    #[tokio::test]
    async fn refused_connection_still_measures_rtt() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        assert!(handshake_rtt(addr, Duration::from_secs(1)).await.is_some());
    }

    #[tokio::test]
    async fn resolve_accepts_literals() {
        assert_eq!(resolve("127.0.0.1").await, Some(IpAddr::V4(Ipv4Addr::LOCALHOST)));
    }

    #[tokio::test]
    #[ignore]
    async fn connect_probe_should_time_out_on_unroutable_address() {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(203, 0, 113, 1)), 443);
        let state = connect_probe(addr, Duration::from_millis(200)).await;
        assert_eq!(state, PortState::Filtered);
    }
}
