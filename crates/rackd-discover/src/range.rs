//! Expansion of a subnet into the host addresses a scan visits.

use std::net::IpAddr;

use ipnet::{IpAddrRange, IpNet, Ipv4AddrRange, Ipv6AddrRange};

use crate::error::{DiscoverError, Result};

/// Every host address of `subnet`, in ascending order.
///
/// Host bits in the input are ignored. For prefixes of length 30 or
/// shorter the network and broadcast addresses are skipped; /31 and /32
/// keep every address. Subnets larger than `max_hosts` are rejected before
/// any address is generated.
pub fn enumerate_hosts(subnet: &str, max_hosts: u64) -> Result<Vec<IpAddr>> {
    let net: IpNet = subnet
        .trim()
        .parse()
        .map_err(|e: ipnet::AddrParseError| DiscoverError::InvalidSubnet {
            subnet: subnet.to_string(),
            reason: e.to_string(),
        })?;
    let net = net.trunc();

    let size = address_count(&net);
    if size > u128::from(max_hosts) {
        return Err(DiscoverError::SubnetTooLarge {
            subnet: subnet.to_string(),
            hosts: size,
            limit: max_hosts,
        });
    }

    let network = net.network();
    let broadcast = net.broadcast();
    let skip_edges = net.prefix_len() <= 30;

    let range = match net {
        IpNet::V4(n) => IpAddrRange::V4(Ipv4AddrRange::new(n.network(), n.broadcast())),
        IpNet::V6(n) => IpAddrRange::V6(Ipv6AddrRange::new(n.network(), n.broadcast())),
    };

    let hosts: Vec<IpAddr> = range
        .filter(|ip| !(skip_edges && (*ip == network || *ip == broadcast)))
        .collect();

    tracing::debug!(subnet = %net, hosts = hosts.len(), "Subnet expanded");
    Ok(hosts)
}

fn address_count(net: &IpNet) -> u128 {
    let host_bits = u32::from(net.max_prefix_len() - net.prefix_len());
    1u128.checked_shl(host_bits).unwrap_or(u128::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ips(hosts: &[IpAddr]) -> Vec<String> {
        hosts.iter().map(|ip| ip.to_string()).collect()
    }

    #[test]
    fn slash_24_skips_network_and_broadcast() {
        let hosts = enumerate_hosts("192.168.1.0/24", 65_536).unwrap();
        assert_eq!(hosts.len(), 254);
        assert_eq!(hosts.first().unwrap().to_string(), "192.168.1.1");
        assert_eq!(hosts.last().unwrap().to_string(), "192.168.1.254");
    }

    #[test]
    fn slash_30_has_two_hosts() {
        let hosts = enumerate_hosts("10.0.0.0/30", 65_536).unwrap();
        assert_eq!(ips(&hosts), vec!["10.0.0.1", "10.0.0.2"]);
    }

    #[test]
    fn point_to_point_and_single_host_keep_every_address() {
        let hosts = enumerate_hosts("10.0.0.0/31", 65_536).unwrap();
        assert_eq!(ips(&hosts), vec!["10.0.0.0", "10.0.0.1"]);

        let hosts = enumerate_hosts("10.0.0.9/32", 65_536).unwrap();
        assert_eq!(ips(&hosts), vec!["10.0.0.9"]);
    }

    #[test]
    fn host_bits_are_masked() {
        let hosts = enumerate_hosts("192.168.1.77/29", 65_536).unwrap();
        assert_eq!(hosts.len(), 6);
        assert_eq!(hosts[0].to_string(), "192.168.1.73");
    }

    #[test]
    fn ipv6_prefixes_keep_edges() {
        let hosts = enumerate_hosts("fd00::/126", 65_536).unwrap();
        assert_eq!(ips(&hosts), vec!["fd00::", "fd00::1", "fd00::2", "fd00::3"]);
    }

    #[test]
    fn malformed_subnet_is_rejected() {
        for bad in ["not-a-cidr", "10.0.0.1", "10.0.0.0/33", ""] {
            let err = enumerate_hosts(bad, 65_536).unwrap_err();
            assert!(
                matches!(err, DiscoverError::InvalidSubnet { .. }),
                "{bad}: {err}"
            );
        }
    }

    #[test]
    fn oversized_subnet_is_rejected_before_expansion() {
        let err = enumerate_hosts("10.0.0.0/8", 65_536).unwrap_err();
        match err {
            DiscoverError::SubnetTooLarge { hosts, limit, .. } => {
                assert_eq!(hosts, 1 << 24);
                assert_eq!(limit, 65_536);
            }
            other => panic!("unexpected error: {other}"),
        }

        assert!(enumerate_hosts("::/0", u64::MAX).is_err());
        assert_eq!(enumerate_hosts("10.1.0.0/16", 65_536).unwrap().len(), 65_534);
    }
}
