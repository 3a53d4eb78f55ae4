//! TCP connect probing.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use rackd_core::{DiscoveryRule, PortScanType};
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Ports probed by the `common` (and `full`) port scan type.
pub const COMMON_PORTS: &[u16] = &[
    21, 22, 23, 25, 53, 80, 110, 111, 135, 139, 143, 443, 445, 993, 995, 1723, 3306, 3389, 5900,
    8080,
];

/// The port list a rule asks for. Empty when port scanning is off.
///
/// A custom rule with no ports falls back to the common list.
pub fn ports_for_rule(rule: &DiscoveryRule) -> Vec<u16> {
    if !rule.scan_ports {
        return Vec::new();
    }
    match rule.port_scan_type {
        PortScanType::Custom if !rule.custom_ports.is_empty() => {
            rule.custom_ports.iter().copied().filter(|p| *p != 0).collect()
        }
        PortScanType::Common | PortScanType::Full | PortScanType::Custom => COMMON_PORTS.to_vec(),
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PortProber;

impl PortProber {
    /// Connect to every port concurrently; return the ones that accepted
    /// within `connect_timeout`, ascending.
    pub async fn scan(&self, ip: IpAddr, ports: &[u16], connect_timeout: Duration) -> Vec<u16> {
        let mut handles = Vec::with_capacity(ports.len());
        for &port in ports {
            handles.push(tokio::spawn(async move {
                let addr = SocketAddr::new(ip, port);
                match timeout(connect_timeout, TcpStream::connect(addr)).await {
                    Ok(Ok(_stream)) => Some(port),
                    _ => None,
                }
            }));
        }

        let mut open = Vec::new();
        for handle in handles {
            match handle.await {
                Ok(Some(port)) => open.push(port),
                Ok(None) => {}
                Err(e) => tracing::warn!(%ip, error = %e, "Port probe task failed"),
            }
        }
        open.sort_unstable();
        open.dedup();

        if !open.is_empty() {
            tracing::debug!(%ip, ports = ?open, "Open ports");
        }
        open
    }
}
