//! Step 3: NetBIOS Name Service (NBNS) status query, triggered when port 445
//! is open (see the design ledger for the 445-vs-137 trigger decision this
//! mirrors from the documented source-side quirk).

use std::net::Ipv4Addr;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time::timeout;
use tracing::debug;

use super::is_valid_hostname;

const QUERY_TIMEOUT: Duration = Duration::from_secs(2);
const NAME_TABLE_OFFSET: usize = 57;
const RECORD_LEN: usize = 18;

/// 50-byte NBSTAT query for the wildcard name `CK` + 30 * `A`.
fn build_query() -> [u8; 50] {
    let mut buf = [0u8; 50];
    buf[0] = 0x80;
    buf[1] = 0x94; // transaction id
    // flags 00 00, already zero
    buf[4] = 0x00;
    buf[5] = 0x01; // qdcount = 1
    // ancount/nscount/arcount already zero
    buf[12] = 0x20; // name label length = 32
    buf[13] = b'C';
    buf[14] = b'K';
    for slot in buf.iter_mut().skip(15).take(30) {
        *slot = b'A';
    }
    buf[45] = 0x00; // name terminator
    buf[46] = 0x00;
    buf[47] = 0x21; // type NBSTAT
    buf[48] = 0x00;
    buf[49] = 0x01; // class IN
    buf
}

struct NameRecord {
    name: String,
    kind: u8,
    flags: u16,
}

fn parse_records(response: &[u8]) -> Vec<NameRecord> {
    if response.len() <= 56 {
        return Vec::new();
    }
    let num_names = response[56] as usize;
    let mut out = Vec::with_capacity(num_names);
    for i in 0..num_names {
        let start = NAME_TABLE_OFFSET + RECORD_LEN * i;
        if start + RECORD_LEN > response.len() {
            break;
        }
        let name_bytes = &response[start..start + 15];
        let kind = response[start + 15];
        let flags = u16::from_be_bytes([response[start + 16], response[start + 17]]);
        let name = String::from_utf8_lossy(name_bytes)
            .trim_matches(|c: char| c == ' ' || c == '\0')
            .to_string();
        out.push(NameRecord { name, kind, flags });
    }
    out
}

/// Selects the preferred machine name from a parsed NBSTAT response: first
/// a unique, registered `{0x00, 0x20}` name with flags exactly `0x0400`,
/// otherwise the first non-group `{0x00, 0x20}` name.
fn select_name(records: &[NameRecord]) -> Option<String> {
    records
        .iter()
        .find(|r| matches!(r.kind, 0x00 | 0x20) && r.flags == 0x0400)
        .or_else(|| {
            records
                .iter()
                .find(|r| matches!(r.kind, 0x00 | 0x20) && r.flags & 0x8000 == 0)
        })
        .map(|r| r.name.clone())
        .filter(|name| is_valid_hostname(name))
}

pub async fn query(ip: Ipv4Addr) -> Option<String> {
    let sock = UdpSocket::bind(("0.0.0.0", 0)).await.ok()?;
    if let Err(e) = sock.send_to(&build_query(), (ip, 137)).await {
        debug!(%ip, error = %e, "failed to send NBNS query");
        return None;
    }
    let mut buf = vec![0u8; 1024];
    let n = match timeout(QUERY_TIMEOUT, sock.recv_from(&mut buf)).await {
        Ok(Ok((n, _))) => n,
        Ok(Err(e)) => {
            debug!(%ip, error = %e, "NBNS response read failed");
            return None;
        }
        Err(_) => {
            debug!(%ip, "NBNS query timed out");
            return None;
        }
    };
    let name = select_name(&parse_records(&buf[..n]));
    if name.is_none() {
        debug!(%ip, "NBNS response carried no usable registered name");
    }
    name
}
