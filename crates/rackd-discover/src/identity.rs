//! Hardware address and hostname lookups for live hosts.
//!
//! Both lookups are best effort: a missing answer is `Ok(None)`, and the
//! caller treats errors the same way after logging them.

use std::net::IpAddr;
use std::path::PathBuf;

use tokio::fs;
use tokio::process::Command;

use crate::error::Result;

const PROC_NET_ARP: &str = "/proc/net/arp";
const ZERO_MAC: &str = "00:00:00:00:00:00";

pub struct IdentityProber {
    neighbor_table: PathBuf,
    neighbor_command: bool,
}

impl IdentityProber {
    pub fn new() -> Self {
        Self {
            neighbor_table: PathBuf::from(PROC_NET_ARP),
            neighbor_command: true,
        }
    }

    /// Read neighbour entries from `path` instead of `/proc/net/arp`, and
    /// don't fall back to the `ip neigh` command.
    pub fn with_neighbor_table(path: impl Into<PathBuf>) -> Self {
        Self {
            neighbor_table: path.into(),
            neighbor_command: false,
        }
    }

    /// Hardware address of `ip` from the local neighbour cache.
    pub async fn resolve_mac(&self, ip: IpAddr) -> Result<Option<String>> {
        match fs::read_to_string(&self.neighbor_table).await {
            Ok(table) => {
                if let Some(mac) = parse_proc_arp(&table, ip) {
                    return Ok(Some(mac));
                }
            }
            Err(e) => {
                tracing::trace!(path = %self.neighbor_table.display(), error = %e, "Neighbour table unreadable");
            }
        }

        if !self.neighbor_command {
            return Ok(None);
        }

        let target = ip.to_string();
        let output = Command::new("ip")
            .args(["neigh", "show", target.as_str()])
            .output()
            .await?;
        if !output.status.success() {
            return Ok(None);
        }
        Ok(parse_ip_neigh(&String::from_utf8_lossy(&output.stdout)))
    }

    /// Reverse DNS name of `ip`, without the trailing dot.
    pub async fn resolve_hostname(&self, ip: IpAddr) -> Result<Option<String>> {
        let name = tokio::task::spawn_blocking(move || dns_lookup::lookup_addr(&ip))
            .await
            .map_err(std::io::Error::other)??;
        Ok(normalize_hostname(&name, ip))
    }
}

impl Default for IdentityProber {
    fn default() -> Self {
        Self::new()
    }
}

/// Find `ip` in the text of `/proc/net/arp`.
///
/// ```text
/// IP address       HW type     Flags       HW address            Mask     Device
/// 192.168.1.1      0x1         0x2         aa:bb:cc:dd:ee:ff     *        eth0
/// ```
/// Incomplete entries (flags `0x0`) and all-zero addresses are skipped.
pub fn parse_proc_arp(table: &str, ip: IpAddr) -> Option<String> {
    let wanted = ip.to_string();
    table.lines().skip(1).find_map(|line| {
        let cols: Vec<&str> = line.split_whitespace().collect();
        if cols.len() < 4 || cols[0] != wanted || cols[2] == "0x0" {
            return None;
        }
        normalize_mac(cols[3])
    })
}

/// Extract the `lladdr` field from `ip neigh show <ip>` output.
pub fn parse_ip_neigh(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let mut words = line.split_whitespace();
        words.find(|w| *w == "lladdr")?;
        words.next().and_then(normalize_mac)
    })
}

fn normalize_mac(raw: &str) -> Option<String> {
    let mac = raw.to_ascii_lowercase();
    let well_formed = mac.len() == 17
        && mac
            .split(':')
            .all(|octet| octet.len() == 2 && octet.chars().all(|c| c.is_ascii_hexdigit()));
    (well_formed && mac != ZERO_MAC).then_some(mac)
}

fn normalize_hostname(name: &str, ip: IpAddr) -> Option<String> {
    let name = name.trim().trim_end_matches('.');
    // getnameinfo hands back the numeric form when no PTR record exists.
    if name.is_empty() || name.parse::<IpAddr>().is_ok_and(|parsed| parsed == ip) {
        return None;
    }
    Some(name.to_string())
}
