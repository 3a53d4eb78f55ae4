//! Exclusion matching for addresses a rule says to skip.

use std::net::IpAddr;

use ipnet::IpNet;

/// Parsed form of a rule's `exclude_ips` list.
///
/// Entries are literal addresses or CIDR blocks. Entries that parse as
/// neither never match anything.
#[derive(Debug, Clone, Default)]
pub struct ExclusionList {
    addrs: Vec<IpAddr>,
    nets: Vec<IpNet>,
}

impl ExclusionList {
    pub fn new<S: AsRef<str>>(entries: &[S]) -> Self {
        let mut list = Self::default();
        for entry in entries {
            let entry = entry.as_ref().trim();
            if let Ok(net) = entry.parse::<IpNet>() {
                list.nets.push(net);
            } else if let Ok(addr) = entry.parse::<IpAddr>() {
                list.addrs.push(addr);
            } else {
                tracing::debug!(entry, "Ignoring malformed exclusion entry");
            }
        }
        list
    }

    pub fn contains(&self, ip: IpAddr) -> bool {
        self.addrs.contains(&ip) || self.nets.iter().any(|net| net.contains(&ip))
    }
}
