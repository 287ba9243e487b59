//! ARP/MAC Resolver (C3): stimulates, then reads, the kernel ARP cache for an
//! IPv4 address, and maps an OUI prefix to a vendor string.

use once_cell::sync::Lazy;
use regex::Regex;
use std::net::Ipv4Addr;
use std::process::Command;
use std::time::Duration;
use thiserror::Error;
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::timeout;
use tracing::debug;

/// Ports touched purely to provoke the kernel into resolving an ARP entry.
/// None of these connections are expected to succeed.
const STIMULUS_TCP_PORTS: [u16; 9] = [80, 443, 22, 445, 139, 135, 8080, 3389, 5900];
const STIMULUS_TIMEOUT: Duration = Duration::from_millis(100);
const SETTLE_DELAY: Duration = Duration::from_millis(100);

static MAC_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:[0-9A-Fa-f]{1,2}[:-]){5}[0-9A-Fa-f]{1,2}").unwrap());

#[derive(Debug, Error)]
pub enum ArpError {
    #[error("I/O error querying ARP table: {0}")]
    Io(#[from] std::io::Error),
    #[error("required arp tool not available")]
    ToolUnavailable,
}

/// Fires the TCP/UDP stimulus described in the resolver contract, then sleeps
/// for the cache to settle. All failures are ignored: the goal is solely to
/// provoke the kernel into an ARP exchange, not to learn anything from the
/// attempts themselves.
async fn stimulate(ip: Ipv4Addr) {
    for &port in STIMULUS_TCP_PORTS.iter() {
        let _ = timeout(STIMULUS_TIMEOUT, TcpStream::connect((ip, port))).await;
    }
    if let Ok(sock) = UdpSocket::bind(("0.0.0.0", 0)).await {
        let _ = sock.send_to(&[0u8], (ip, 137)).await;
    }
    tokio::time::sleep(SETTLE_DELAY).await;
}

/// Queries the host OS's ARP table for `ip` using its standard CLI tool and
/// extracts the first MAC-shaped token in the output.
fn query_os_arp_table(ip: Ipv4Addr) -> Result<Option<String>, ArpError> {
    let output = if cfg!(target_os = "windows") {
        Command::new("arp").arg("-a").arg(ip.to_string()).output()
    } else {
        Command::new("arp").arg("-n").arg(ip.to_string()).output()
    };

    let output = match output {
        Ok(o) => o,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(%ip, "arp tool not available on this host");
            return Err(ArpError::ToolUnavailable);
        }
        Err(e) => {
            debug!(%ip, error = %e, "failed to invoke arp tool");
            return Err(ArpError::Io(e));
        }
    };

    if !output.status.success() {
        return Ok(None);
    }
    let text = String::from_utf8_lossy(&output.stdout);
    Ok(MAC_RE.find(&text).map(|m| m.as_str().to_string()))
}

/// Uppercases, strips `:`, `-`, `.` separators, then re-inserts `:` every two
/// hex digits. Idempotent: re-normalizing an already-canonical MAC is a no-op.
pub fn normalize_mac(raw: &str) -> String {
    let hex: String = raw
        .chars()
        .filter(|c| *c != ':' && *c != '-' && *c != '.')
        .collect::<String>()
        .to_uppercase();
    if hex.len() != 12 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return String::new();
    }
    hex.as_bytes()
        .chunks(2)
        .map(|c| std::str::from_utf8(c).unwrap())
        .collect::<Vec<_>>()
        .join(":")
}

/// Performs one full resolution attempt: stimulus, settle, OS ARP table
/// lookup, normalization. Returns an empty string, never an error, when the
/// host does not answer — per the error taxonomy, ARP failures are swallowed
/// and the caller is expected to retry.
pub async fn resolve_mac(ip: Ipv4Addr) -> String {
    stimulate(ip).await;
    match query_os_arp_table(ip) {
        Ok(Some(raw)) => normalize_mac(&raw),
        Ok(None) => {
            debug!(%ip, "no ARP entry found for host");
            String::new()
        }
        Err(e) => {
            debug!(%ip, error = %e, "ARP resolution failed, treating as unresolved");
            String::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_mac_handles_mixed_separators_and_case() {
        assert_eq!(normalize_mac("aa:bb:cc:dd:ee:ff"), "AA:BB:CC:DD:EE:FF");
        assert_eq!(normalize_mac("aa-bb-cc-dd-ee-ff"), "AA:BB:CC:DD:EE:FF");
        assert_eq!(normalize_mac("aabb.ccdd.eeff"), "AA:BB:CC:DD:EE:FF");
    }

    #[test]
    fn normalize_mac_is_idempotent() {
        let once = normalize_mac("aa:bb:cc:dd:ee:ff");
        let twice = normalize_mac(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn normalize_mac_rejects_malformed_input() {
        assert_eq!(normalize_mac("not a mac"), "");
        assert_eq!(normalize_mac("aa:bb:cc"), "");
    }

    #[test]
    fn mac_regex_extracts_from_arp_n_style_output() {
        let sample = "? (192.168.1.10) at 00:1a:2b:3c:4d:5e [ether] on eth0\n";
        let m = MAC_RE.find(sample).unwrap();
        assert_eq!(m.as_str(), "00:1a:2b:3c:4d:5e");
    }

    #[test]
    fn mac_regex_accepts_dash_separated_windows_style() {
        let sample = "Internet Address      Physical Address      Type\n192.168.1.10          00-1A-2B-3C-4D-5E     dynamic\n";
        let m = MAC_RE.find(sample).unwrap();
        assert_eq!(m.as_str(), "00-1A-2B-3C-4D-5E");
    }
}
