//! Step 6: mDNS/Bonjour unicast-response service discovery. Hand-rolled DNS
//! message codec rather than a general mDNS client crate: the contract only
//! ever needs unicast-response PTR/SRV/A/TXT queries against one fixed
//! target IP, which a small codec expresses more directly than pulling in a
//! full multicast-aware client.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

use tokio::net::UdpSocket;
use tokio::time::timeout;
use tracing::trace;

const PER_QUERY_TIMEOUT: Duration = Duration::from_millis(250);
const PER_SERVICE_TIMEOUT: Duration = Duration::from_millis(300);
const QU_BIT: u16 = 0x8000;
const TYPE_PTR: u16 = 12;
const TYPE_TXT: u16 = 16;
const TYPE_A: u16 = 1;
const TYPE_SRV: u16 = 33;

pub struct ServiceEntry {
    pub host: String,
    pub info: String,
}

fn encode_name(name: &str, buf: &mut Vec<u8>) {
    for label in name.split('.') {
        if label.is_empty() {
            continue;
        }
        buf.push(label.len() as u8);
        buf.extend_from_slice(label.as_bytes());
    }
    buf.push(0);
}

fn build_query(service_type: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(32);
    buf.extend_from_slice(&[0, 0]); // transaction id, unused for unicast mDNS
    buf.extend_from_slice(&[0, 0]); // flags
    buf.extend_from_slice(&[0, 1]); // qdcount
    buf.extend_from_slice(&[0, 0, 0, 0, 0, 0]); // an/ns/arcount
    encode_name(&format!("{}.local", service_type), &mut buf);
    buf.extend_from_slice(&TYPE_PTR.to_be_bytes());
    buf.extend_from_slice(&(1u16 | QU_BIT).to_be_bytes()); // class IN, QU bit set
    buf
}

/// Reads a (possibly compressed) DNS name starting at `offset`. Bounded by
/// the buffer length so malformed/truncated input can never loop forever or
/// index out of range.
fn read_name(buf: &[u8], start: usize) -> Option<(String, usize)> {
    let mut labels: Vec<String> = Vec::new();
    let mut offset = start;
    let mut jumped = false;
    let mut end_offset = start;
    let mut hops = 0;

    loop {
        hops += 1;
        if hops > 128 || offset >= buf.len() {
            return None;
        }
        let len = buf[offset] as usize;
        if len == 0 {
            if !jumped {
                end_offset = offset + 1;
            }
            break;
        }
        if len & 0xc0 == 0xc0 {
            if offset + 1 >= buf.len() {
                return None;
            }
            let pointer = (((len & 0x3f) as usize) << 8) | buf[offset + 1] as usize;
            if !jumped {
                end_offset = offset + 2;
            }
            jumped = true;
            offset = pointer;
            continue;
        }
        let start_label = offset + 1;
        let end_label = start_label + len;
        if end_label > buf.len() {
            return None;
        }
        labels.push(String::from_utf8_lossy(&buf[start_label..end_label]).to_string());
        offset = end_label;
    }
    Some((labels.join("."), end_offset))
}

struct ResourceRecord {
    name: String,
    rtype: u16,
    rdata: Vec<u8>,
}

fn parse_records(buf: &[u8]) -> Vec<ResourceRecord> {
    if buf.len() < 12 {
        return Vec::new();
    }
    let qdcount = u16::from_be_bytes([buf[4], buf[5]]) as usize;
    let ancount = u16::from_be_bytes([buf[6], buf[7]]) as usize;
    let nscount = u16::from_be_bytes([buf[8], buf[9]]) as usize;
    let arcount = u16::from_be_bytes([buf[10], buf[11]]) as usize;

    let mut offset = 12;
    for _ in 0..qdcount {
        let Some((_, next)) = read_name(buf, offset) else {
            return Vec::new();
        };
        offset = next + 4; // qtype + qclass
        if offset > buf.len() {
            return Vec::new();
        }
    }

    let mut records = Vec::new();
    for _ in 0..(ancount + nscount + arcount) {
        let Some((name, next)) = read_name(buf, offset) else {
            break;
        };
        offset = next;
        if offset + 10 > buf.len() {
            break;
        }
        let rtype = u16::from_be_bytes([buf[offset], buf[offset + 1]]);
        let rdlength = u16::from_be_bytes([buf[offset + 8], buf[offset + 9]]) as usize;
        offset += 10;
        if offset + rdlength > buf.len() {
            break;
        }
        let rdata = buf[offset..offset + rdlength].to_vec();
        offset += rdlength;
        records.push(ResourceRecord { name, rtype, rdata });
    }
    records
}

fn parse_srv_target(rdata: &[u8], full_message: &[u8], rdata_offset: usize) -> Option<String> {
    if rdata.len() < 6 {
        return None;
    }
    read_name(full_message, rdata_offset + 6).map(|(name, _)| name)
}

fn parse_a_record(rdata: &[u8]) -> Option<Ipv4Addr> {
    if rdata.len() != 4 {
        return None;
    }
    Some(Ipv4Addr::new(rdata[0], rdata[1], rdata[2], rdata[3]))
}

fn parse_txt_info(rdata: &[u8]) -> String {
    let mut parts = Vec::new();
    let mut offset = 0;
    while offset < rdata.len() {
        let len = rdata[offset] as usize;
        offset += 1;
        if offset + len > rdata.len() {
            break;
        }
        parts.push(String::from_utf8_lossy(&rdata[offset..offset + len]).to_string());
        offset += len;
    }
    parts.join(";")
}

/// Derives the preferred entry for one service's response set: prefers the
/// SRV target host, falls back to a cleaned-up instance name.
fn select_entry(target_ip: Ipv4Addr, raw: &[u8], records: &[ResourceRecord]) -> Option<ServiceEntry> {
    let has_matching_a = records
        .iter()
        .filter(|r| r.rtype == TYPE_A)
        .filter_map(|r| parse_a_record(&r.rdata))
        .any(|addr| addr == target_ip);
    if !has_matching_a {
        return None;
    }

    let mut host = None;
    for r in records.iter().filter(|r| r.rtype == TYPE_SRV) {
        let rdata_offset = find_rdata_offset(raw, r);
        if let Some(off) = rdata_offset {
            host = parse_srv_target(&r.rdata, raw, off);
        }
        if host.is_some() {
            break;
        }
    }

    let info = records
        .iter()
        .find(|r| r.rtype == TYPE_TXT)
        .map(|r| parse_txt_info(&r.rdata))
        .unwrap_or_default();

    let host = host
        .map(|h| h.trim_end_matches('.').to_string())
        .or_else(|| {
            records
                .iter()
                .find(|r| r.rtype == TYPE_PTR)
                .map(|r| clean_instance_name(&r.name))
        })?;

    Some(ServiceEntry { host, info })
}

fn find_rdata_offset(raw: &[u8], record: &ResourceRecord) -> Option<usize> {
    // rdata is a verbatim slice of raw; locating its offset lets SRV target
    // name decompression follow pointers back into the full message.
    raw.windows(record.rdata.len().max(1))
        .position(|w| w == record.rdata.as_slice())
}

/// Strips a leading `instance@`, strips a trailing `._service._proto`,
/// appends `.local` if the result has no domain suffix.
fn clean_instance_name(instance: &str) -> String {
    let without_prefix = instance.split('@').next_back().unwrap_or(instance);
    let base = without_prefix.split("._").next().unwrap_or(without_prefix);
    if base.contains('.') {
        base.to_string()
    } else {
        format!("{}.local", base)
    }
}

pub async fn query_services(
    ip: Ipv4Addr,
    service_types: &[&str],
) -> BTreeMap<String, ServiceEntry> {
    let mut out = BTreeMap::new();
    for &service in service_types {
        let deadline = Instant::now() + PER_SERVICE_TIMEOUT;
        let Some(entry) = query_one_service(ip, service, deadline).await else {
            continue;
        };
        out.insert(service.to_string(), entry);
    }
    out
}

async fn query_one_service(
    ip: Ipv4Addr,
    service_type: &str,
    deadline: Instant,
) -> Option<ServiceEntry> {
    let sock = match UdpSocket::bind(("0.0.0.0", 0)).await {
        Ok(s) => s,
        Err(e) => {
            trace!(%ip, service_type, error = %e, "mdns socket bind failed");
            return None;
        }
    };
    if let Err(e) = sock.send_to(&build_query(service_type), (ip, 5353)).await {
        trace!(%ip, service_type, error = %e, "mdns query send failed");
        return None;
    }

    let mut buf = vec![0u8; 2048];
    while Instant::now() < deadline {
        let remaining = deadline.saturating_duration_since(Instant::now()).min(PER_QUERY_TIMEOUT);
        match timeout(remaining, sock.recv_from(&mut buf)).await {
            Ok(Ok((n, _))) => {
                let records = parse_records(&buf[..n]);
                if let Some(entry) = select_entry(ip, &buf[..n], &records) {
                    return Some(entry);
                }
            }
            Ok(Err(e)) => {
                trace!(%ip, service_type, error = %e, "mdns response read failed");
                break;
            }
            Err(_) => break,
        }
    }
    trace!(%ip, service_type, "mdns query produced no matching service");
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_query_sets_qu_bit_and_ptr_type() {
        let q = build_query("_airplay._tcp");
        // qdcount = 1
        assert_eq!(&q[4..6], &[0, 1]);
        let qtype_offset = q.len() - 4;
        assert_eq!(&q[qtype_offset..qtype_offset + 2], &TYPE_PTR.to_be_bytes());
        let qclass = u16::from_be_bytes([q[q.len() - 2], q[q.len() - 1]]);
        assert_eq!(qclass & QU_BIT, QU_BIT);
        assert_eq!(qclass & 0x7fff, 1);
    }

    #[test]
    fn read_name_follows_a_single_compression_pointer() {
        let mut buf = Vec::new();
        encode_name("_airplay._tcp.local", &mut buf);
        let base_offset = buf.len();
        buf.push(0xc0);
        buf.push(0x00);
        let (name, next) = read_name(&buf, base_offset).unwrap();
        assert_eq!(name, "_airplay._tcp.local");
        assert_eq!(next, base_offset + 2);
    }

    #[test]
    fn read_name_rejects_self_referential_pointer_without_looping_forever() {
        let buf = [0xc0, 0x00];
        assert!(read_name(&buf, 0).is_none());
    }

    #[test]
    fn parse_records_never_panics_on_truncated_input() {
        for len in 0..20 {
            let buf = vec![0u8; len];
            let _ = parse_records(&buf);
        }
    }

    #[test]
    fn clean_instance_name_strips_prefix_suffix_and_adds_local() {
        assert_eq!(
            clean_instance_name("MyDevice@living-room._airplay._tcp"),
            "living-room.local"
        );
    }

    #[test]
    fn parse_a_record_rejects_wrong_length() {
        assert_eq!(parse_a_record(&[1, 2, 3]), None);
        assert_eq!(parse_a_record(&[1, 2, 3, 4]), Some(Ipv4Addr::new(1, 2, 3, 4)));
    }
}
