//! Address Enumerator: expands a CIDR string into the ordered list of host
//! addresses a scan will walk.

use ipnetwork::Ipv4Network;
use std::net::Ipv4Addr;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CidrError {
    #[error("invalid cidr '{0}': {1}")]
    InvalidCidr(String, String),
}

/// Parse and expand a CIDR string into network-ordered host addresses.
///
/// Blocks of 4 or more addresses have the network and broadcast address
/// stripped; `/31` and `/32` blocks are returned in full, since there is no
/// broadcast address to exclude at those prefix lengths.
pub fn expand_cidr(cidr: &str) -> Result<Vec<Ipv4Addr>, CidrError> {
    let net: Ipv4Network = cidr
        .parse()
        .map_err(|e: ipnetwork::IpNetworkError| CidrError::InvalidCidr(cidr.to_string(), e.to_string()))?;
    Ok(hosts_from_network(net))
}

fn hosts_from_network(net: Ipv4Network) -> Vec<Ipv4Addr> {
    let prefix = net.prefix();
    let base = u32::from_be_bytes(net.ip().octets());
    let host_count: u64 = 1u64 << (32 - prefix as u32);

    if host_count < 4 {
        return (0..host_count)
            .map(|offset| Ipv4Addr::from(base.wrapping_add(offset as u32)))
            .collect();
    }

    let first = base + 1;
    let last = base + host_count as u32 - 2;
    (first..=last).map(Ipv4Addr::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slash_30_strips_network_and_broadcast() {
        let hosts = expand_cidr("192.168.1.0/30").unwrap();
        assert_eq!(
            hosts,
            vec![Ipv4Addr::new(192, 168, 1, 1), Ipv4Addr::new(192, 168, 1, 2)]
        );
    }

    #[test]
    fn slash_32_expands_to_one_unstripped_address() {
        let hosts = expand_cidr("10.0.0.5/32").unwrap();
        assert_eq!(hosts, vec![Ipv4Addr::new(10, 0, 0, 5)]);
    }

    #[test]
    fn slash_31_expands_to_two_unstripped_addresses() {
        let hosts = expand_cidr("10.0.0.4/31").unwrap();
        assert_eq!(
            hosts,
            vec![Ipv4Addr::new(10, 0, 0, 4), Ipv4Addr::new(10, 0, 0, 5)]
        );
    }

    #[test]
    fn slash_24_strips_network_and_broadcast() {
        let hosts = expand_cidr("192.168.1.0/24").unwrap();
        assert_eq!(hosts.len(), 254);
        assert_eq!(hosts[0], Ipv4Addr::new(192, 168, 1, 1));
        assert_eq!(hosts[253], Ipv4Addr::new(192, 168, 1, 254));
    }

    #[test]
    fn invalid_cidr_is_rejected() {
        assert!(expand_cidr("not-a-cidr").is_err());
    }

    #[test]
    fn hosts_are_in_network_order() {
        let hosts = expand_cidr("172.16.0.0/28").unwrap();
        assert!(hosts.windows(2).all(|w| u32::from(w[0]) < u32::from(w[1])));
    }
}
