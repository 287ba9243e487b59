//! Reachability Prober (C2): decides up/down for a host and collects its
//! open TCP ports plus the mDNS UDP liveness probe.

use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::trace;

use crate::arp;

/// Standard reachability ports, probed concurrently at 750ms each.
pub const STANDARD_PORTS: [u16; 10] = [22, 80, 135, 139, 443, 445, 3389, 5900, 8006, 8080];
const STANDARD_TIMEOUT: Duration = Duration::from_millis(750);

/// Apple-signal ports, each with its own longer timeout.
pub const APPLE_PORTS: [(u16, Duration); 4] = [
    (548, Duration::from_secs(3)),
    (5000, Duration::from_secs(1)),
    (7000, Duration::from_secs(1)),
    (3689, Duration::from_secs(1)),
];

const MDNS_PORT: u16 = 5353;
const MDNS_TIMEOUT: Duration = Duration::from_secs(2);
/// 12-byte zeroed DNS header with QDCOUNT=1.
const MDNS_PROBE_PAYLOAD: [u8; 12] = [0, 0, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0];

/// Outcome of the reachability probe for one host.
pub struct Reachability {
    pub reachable: bool,
    /// Ascending, de-duplicated.
    pub open_ports: Vec<u16>,
}

async fn probe_tcp_port(ip: Ipv4Addr, port: u16, to: Duration) -> Option<u16> {
    let addr = SocketAddrV4::new(ip, port);
    match timeout(to, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => {
            drop(stream);
            Some(port)
        }
        Ok(Err(e)) => {
            trace!(%ip, port, error = %e, "tcp connect failed, treating port as closed");
            None
        }
        Err(_) => {
            trace!(%ip, port, timeout_ms = to.as_millis() as u64, "tcp connect timed out");
            None
        }
    }
}

async fn probe_mdns_liveness(ip: Ipv4Addr) -> Option<u16> {
    let sock = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await.ok()?;
    sock.send_to(&MDNS_PROBE_PAYLOAD, (ip, MDNS_PORT)).await.ok()?;
    let mut buf = [0u8; 512];
    match timeout(MDNS_TIMEOUT, sock.recv_from(&mut buf)).await {
        Ok(Ok((n, _))) if n > 0 => Some(MDNS_PORT),
        Ok(Ok(_)) | Ok(Err(_)) | Err(_) => {
            trace!(%ip, "mdns liveness probe produced no reply");
            None
        }
    }
}

/// Runs every probe in the contract concurrently and assembles the sorted,
/// de-duplicated open-port list plus the overall reachability verdict.
pub async fn probe_reachability(ip: Ipv4Addr) -> Reachability {
    let sem = Arc::new(Semaphore::new(STANDARD_PORTS.len() + APPLE_PORTS.len() + 1));

    let mut handles = Vec::new();
    for &port in STANDARD_PORTS.iter() {
        let permit = sem.clone().acquire_owned().await.unwrap();
        handles.push(tokio::spawn(async move {
            let _p = permit;
            probe_tcp_port(ip, port, STANDARD_TIMEOUT).await
        }));
    }
    for &(port, to) in APPLE_PORTS.iter() {
        let permit = sem.clone().acquire_owned().await.unwrap();
        handles.push(tokio::spawn(async move {
            let _p = permit;
            probe_tcp_port(ip, port, to).await
        }));
    }
    let mdns_handle = tokio::spawn(async move { probe_mdns_liveness(ip).await });
    let mac_side_channel = tokio::spawn(async move { arp::resolve_mac(ip).await });

    let mut open_ports = Vec::new();
    for h in handles {
        if let Ok(Some(port)) = h.await {
            open_ports.push(port);
        }
    }
    if let Ok(Some(port)) = mdns_handle.await {
        open_ports.push(port);
    }
    let mac_found = mac_side_channel.await.map(|m| !m.is_empty()).unwrap_or(false);

    open_ports.sort_unstable();
    open_ports.dedup();

    Reachability {
        reachable: mac_found || !open_ports.is_empty(),
        open_ports,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    #[tokio::test]
    async fn unreachable_ip_reports_down_with_no_ports() {
        // TEST-NET-3, documented as non-routable: no listeners, no ARP entry.
        let ip: Ipv4Addr = "203.0.113.250".parse().unwrap();
        let result = probe_reachability(ip).await;
        assert!(!result.reachable);
        assert!(result.open_ports.is_empty());
    }

    #[tokio::test]
    async fn local_listener_on_standard_port_is_detected() {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 8080)).expect("bind 8080");
        let handle = thread::spawn(move || {
            let _ = listener.accept();
        });

        let result = probe_reachability(Ipv4Addr::LOCALHOST).await;
        assert!(result.reachable);
        assert!(result.open_ports.contains(&8080));
        assert!(result.open_ports.windows(2).all(|w| w[0] < w[1]));

        handle.join().ok();
    }
}
