//! Per-host probing pipeline.
//!
//! A host goes through liveness, identity, ports, services and OS stages.
//! Each stage adds to a [`HostEvidence`] which is turned into a
//! [`DiscoveredDevice`] at the end. Stage failures are logged and treated as
//! "no evidence"; they never fail the host or the scan.

use std::net::IpAddr;

use async_trait::async_trait;
use chrono::Utc;
use rackd_core::{
    DeviceId, DeviceStatus, DiscoveredDevice, DiscoveryRule, NetworkId, ScanId, ScanType,
    ServiceInfo,
};
use tokio_util::sync::CancellationToken;

use crate::config::DiscoverConfig;
use crate::error::Result;
use crate::fingerprint::{self, OsGuess};
use crate::identity::IdentityProber;
use crate::ping::{IcmpProber, Reachability};
use crate::ports::{self, PortProber};
use crate::services::ServiceProber;

/// What every host task of one scan shares.
#[derive(Debug, Clone)]
pub struct ScanContext {
    pub scan_id: ScanId,
    pub network_id: NetworkId,
    pub rule: DiscoveryRule,
}

/// Probes one host.
///
/// `Ok(None)` means the host yields no device record.
#[async_trait]
pub trait HostProbe: Send + Sync {
    async fn probe_host(
        &self,
        ip: IpAddr,
        scan: &ScanContext,
        cancel: &CancellationToken,
    ) -> Result<Option<DiscoveredDevice>>;
}

// ── Evidence ──────────────────────────────────────────────────────

/// Facts gathered about a host so far.
#[derive(Debug, Clone)]
pub struct HostEvidence {
    pub ip: IpAddr,
    pub status: DeviceStatus,
    pub mac_address: Option<String>,
    pub hostname: Option<String>,
    pub open_ports: Vec<u16>,
    pub services: Vec<ServiceInfo>,
    pub os: Option<OsGuess>,
}

impl HostEvidence {
    pub fn new(ip: IpAddr) -> Self {
        Self {
            ip,
            status: DeviceStatus::Unknown,
            mac_address: None,
            hostname: None,
            open_ports: Vec::new(),
            services: Vec::new(),
            os: None,
        }
    }

    pub fn mark_online(&mut self) {
        self.status = DeviceStatus::Online;
    }

    /// An open port proves the host is up even when ICMP said nothing.
    pub fn record_open_ports(&mut self, ports: Vec<u16>) {
        if !ports.is_empty() {
            self.mark_online();
        }
        self.open_ports = ports;
    }

    pub fn into_device(self, scan: &ScanContext) -> DiscoveredDevice {
        let confidence = fingerprint::confidence(&self);
        let now = Utc::now();
        DiscoveredDevice {
            id: DeviceId::new(),
            ip: self.ip,
            mac_address: self.mac_address,
            hostname: self.hostname,
            network_id: scan.network_id.clone(),
            status: self.status,
            confidence,
            os_guess: self.os.map(|g| g.os.to_string()),
            os_family: self.os.map(|g| g.family.as_str().to_string()),
            open_ports: self.open_ports,
            services: self.services,
            last_scan_id: scan.scan_id,
            first_seen: now,
            last_seen: now,
        }
    }
}

// ── Pipeline ──────────────────────────────────────────────────────

/// The probe used by real scans.
pub struct HostPipeline {
    icmp: IcmpProber,
    identity: IdentityProber,
    ports: PortProber,
    services: ServiceProber,
}

impl HostPipeline {
    /// Must be called from within a Tokio runtime.
    pub fn new(config: &DiscoverConfig) -> Self {
        Self::with_probers(
            IcmpProber::new(),
            IdentityProber::new(),
            ServiceProber::new(config.service_connect_timeout(), config.banner_read_timeout()),
        )
    }

    pub fn with_probers(
        icmp: IcmpProber,
        identity: IdentityProber,
        services: ServiceProber,
    ) -> Self {
        Self {
            icmp,
            identity,
            ports: PortProber,
            services,
        }
    }

    async fn reachability(&self, ip: IpAddr, rule: &DiscoveryRule) -> Reachability {
        match self.icmp.check(ip, rule.timeout()).await {
            Ok(r) => r,
            Err(e) => {
                tracing::debug!(%ip, error = %e, "ICMP check failed");
                Reachability::Unknown
            }
        }
    }

    async fn identify(&self, evidence: &mut HostEvidence) {
        let ip = evidence.ip;
        match self.identity.resolve_mac(ip).await {
            Ok(mac) => evidence.mac_address = mac,
            Err(e) => tracing::debug!(%ip, error = %e, "MAC lookup failed"),
        }
        match self.identity.resolve_hostname(ip).await {
            Ok(name) => evidence.hostname = name,
            Err(e) => tracing::debug!(%ip, error = %e, "Reverse DNS lookup failed"),
        }
    }
}

#[async_trait]
impl HostProbe for HostPipeline {
    async fn probe_host(
        &self,
        ip: IpAddr,
        scan: &ScanContext,
        cancel: &CancellationToken,
    ) -> Result<Option<DiscoveredDevice>> {
        let rule = &scan.rule;
        let reachability = self.reachability(ip, rule).await;

        if rule.scan_type == ScanType::Quick && !reachability.is_alive() {
            return Ok(None);
        }

        let mut evidence = HostEvidence::new(ip);
        if reachability.is_alive() {
            evidence.mark_online();
            if cancel.is_cancelled() {
                return Ok(None);
            }
            self.identify(&mut evidence).await;
        }

        if rule.scan_type != ScanType::Quick {
            let wanted = ports::ports_for_rule(rule);
            if !wanted.is_empty() {
                if cancel.is_cancelled() {
                    return Ok(None);
                }
                let open = self.ports.scan(ip, &wanted, rule.timeout()).await;
                evidence.record_open_ports(open);
            }
        }

        if rule.service_detection && !evidence.open_ports.is_empty() {
            if cancel.is_cancelled() {
                return Ok(None);
            }
            evidence.services = self.services.detect(ip, &evidence.open_ports).await;
        }

        if rule.os_detection {
            evidence.os = Some(fingerprint::guess_os(
                &evidence.open_ports,
                &evidence.services,
            ));
        }

        tracing::debug!(
            %ip,
            status = ?evidence.status,
            open_ports = evidence.open_ports.len(),
            "Host probed"
        );
        Ok(Some(evidence.into_device(scan)))
    }
}
