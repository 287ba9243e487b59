//! Hostname Resolver (C4): ordered, protocol-specific hostname discovery
//! plus the device-type classifier that rides alongside it.

mod afp;
mod dns;
mod mdns_proto;
mod netbios;
mod rdp;
mod smb;
mod ssh;

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use formats::DeviceType;

/// mDNS service types queried in step 6 of the priority order.
pub const MDNS_SERVICE_TYPES: [&str; 10] = [
    "_device-info._tcp",
    "_airplay._tcp",
    "_raop._tcp",
    "_companion-link._tcp",
    "_apple-mobdev._tcp",
    "_apple-mobdev2._tcp",
    "_apple-pairable._tcp",
    "_homekit._tcp",
    "_touch-able._tcp",
    "_http._tcp",
];

/// Everything C4 learned about one host, independent of the device-type
/// classification (which also needs the vendor string from C3).
#[derive(Debug, Clone, Default)]
pub struct HostnameResult {
    pub hostnames: Vec<String>,
    pub mdns_name: String,
    pub mdns_services: BTreeMap<String, String>,
    pub afp_seen: bool,
}

/// Runs the priority chain for one host, stopping at the first method that
/// yields a validated hostname. mDNS service discovery (step 6) and its
/// device-type signal always run, independent of whether a hostname was
/// already found by an earlier step.
pub async fn resolve(ip: Ipv4Addr, open_ports: &[u16]) -> HostnameResult {
    let mut result = HostnameResult::default();
    let has_port = |p: u16| open_ports.binary_search(&p).is_ok();

    let mut found = false;

    if let Some(name) = dns::ptr_lookup(ip).await {
        if let Some(clean) = clean_and_validate(&name) {
            result.hostnames.push(clean);
            found = true;
        }
    }

    if !found && has_port(22) {
        if let Some(name) = ssh::banner_hostname(ip).await {
            if let Some(clean) = clean_and_validate(&name) {
                result.hostnames.push(clean);
                found = true;
            }
        }
    }

    if has_port(548) {
        if let Some(name) = afp::banner_hostname(ip).await {
            result.afp_seen = true;
            if !found {
                if let Some(clean) = clean_and_validate(&name) {
                    result.hostnames.push(clean);
                    found = true;
                }
            }
        }
    }

    let mut nbns_hit = false;
    if !found && has_port(445) {
        if let Some(name) = netbios::query(ip).await {
            if let Some(clean) = clean_and_validate(&name) {
                result.hostnames.push(clean);
                found = true;
                nbns_hit = true;
            }
        }
    }

    if !found && has_port(445) && !nbns_hit {
        if let Some(name) = smb::resolve_hostname(ip).await {
            if let Some(clean) = clean_and_validate(&name) {
                result.hostnames.push(clean);
                found = true;
            }
        }
    }

    if !found && has_port(3389) {
        if let Some(name) = rdp::resolve_hostname(ip).await {
            if let Some(clean) = clean_and_validate(&name) {
                result.hostnames.push(clean);
                found = true;
            }
        }
    }

    let apple_signal_port = has_port(5353) || has_port(5000) || has_port(7000);
    if apple_signal_port || result.afp_seen {
        let services = mdns_proto::query_services(ip, &MDNS_SERVICE_TYPES).await;
        for (service, entry) in services {
            result.mdns_services.insert(service, entry.info);
            if result.mdns_name.is_empty() {
                if let Some(clean) = clean_and_validate(&entry.host) {
                    result.mdns_name = clean;
                }
            }
        }
        if !found && !result.mdns_name.is_empty() {
            result.hostnames.push(result.mdns_name.clone());
        }
    }

    result
}

fn clean_and_validate(raw: &str) -> Option<String> {
    let cleaned = clean_hostname(raw);
    if is_valid_hostname(&cleaned) {
        Some(cleaned)
    } else {
        None
    }
}

/// Strips a trailing `:port`, keeps only the label before the first `.`,
/// then drops every character outside `[A-Za-z0-9-]`.
pub fn clean_hostname(raw: &str) -> String {
    let without_port = match raw.rsplit_once(':') {
        Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) && !port.is_empty() => host,
        _ => raw,
    };
    let label = without_port.split('.').next().unwrap_or("");
    label
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
        .collect()
}

/// Length 2-63; first char a letter; last char alphanumeric; no characters
/// from the reserved set `\/:*?"<>|@` (already excluded by `clean_hostname`,
/// but this predicate is also applied to names that did not pass through it,
/// e.g. a raw NBNS-parsed name).
pub fn is_valid_hostname(s: &str) -> bool {
    if s.len() < 2 || s.len() > 63 {
        return false;
    }
    let mut chars = s.chars();
    let first = chars.next().unwrap();
    if !first.is_ascii_alphabetic() {
        return false;
    }
    let last = s.chars().last().unwrap();
    if !last.is_ascii_alphanumeric() {
        return false;
    }
    const RESERVED: &str = "\\/:*?\"<>|@";
    !s.chars().any(|c| RESERVED.contains(c))
}

/// Device-type classifier: vendor/port/mDNS signals, independent of whether
/// a hostname was ever resolved.
pub fn classify_device_type(
    vendor: &str,
    mdns_services: &BTreeMap<String, String>,
    afp_seen: bool,
    open_ports: &[u16],
) -> Option<DeviceType> {
    if vendor.to_ascii_lowercase().contains("apple") {
        return Some(DeviceType::Apple);
    }
    let apple_service = mdns_services.keys().any(|svc| {
        let s = svc.to_ascii_lowercase();
        s.contains("apple") || s.contains("airport") || s.contains("airplay") || s.contains("homekit")
    });
    if apple_service {
        return Some(DeviceType::Apple);
    }
    if afp_seen {
        return Some(DeviceType::Apple);
    }
    const APPLE_SIGNAL_PORTS: [u16; 5] = [548, 5353, 5000, 7000, 3689];
    if open_ports.iter().any(|p| APPLE_SIGNAL_PORTS.contains(p)) {
        return Some(DeviceType::PossibleApple);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_hostname_strips_port_and_domain() {
        assert_eq!(clean_hostname("MyHost.example.com:445"), "MyHost");
    }

    #[test]
    fn clean_hostname_is_idempotent() {
        let once = clean_hostname("MyHost.example.com:445");
        let twice = clean_hostname(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn clean_hostname_drops_disallowed_characters() {
        assert_eq!(clean_hostname("my_host!name"), "myhostname");
    }

    #[test]
    fn is_valid_hostname_accepts_simple_names() {
        assert!(is_valid_hostname("MyHost"));
    }

    #[test]
    fn is_valid_hostname_rejects_leading_digit() {
        assert!(!is_valid_hostname("1host"));
    }

    #[test]
    fn is_valid_hostname_rejects_leading_hyphen() {
        assert!(!is_valid_hostname("-host"));
    }

    #[test]
    fn is_valid_hostname_rejects_too_short() {
        assert!(!is_valid_hostname("a"));
    }

    #[test]
    fn classify_prefers_vendor_signal_over_possible_apple_ports() {
        let services = BTreeMap::new();
        let dt = classify_device_type("Apple, Inc.", &services, false, &[3689]);
        assert_eq!(dt, Some(DeviceType::Apple));
    }

    #[test]
    fn classify_falls_back_to_possible_apple_on_signal_ports_only() {
        let services = BTreeMap::new();
        let dt = classify_device_type("Unknown Vendor", &services, false, &[5353]);
        assert_eq!(dt, Some(DeviceType::PossibleApple));
    }

    #[test]
    fn classify_returns_none_without_any_signal() {
        let services = BTreeMap::new();
        let dt = classify_device_type("Unknown Vendor", &services, false, &[22, 80]);
        assert_eq!(dt, None);
    }
}
