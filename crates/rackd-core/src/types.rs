//! Core domain types for rackd network discovery.
//!
//! A `Network` owns a subnet; a `DiscoveryRule` says how to scan it; each
//! run is tracked as a `DiscoveryScan`; every responsive host becomes a
//! `DiscoveredDevice` keyed by its IP address.

use std::collections::BTreeSet;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ModelError;

// ── Identifiers ───────────────────────────────────────────────────

/// Identifier of a network record owned by the inventory store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct NetworkId(pub String);

impl NetworkId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unique identifier for a scan run. Time-ordered (UUIDv7).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct ScanId(pub Uuid);

impl ScanId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ScanId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ScanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a discovered device record. Time-ordered (UUIDv7).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct DeviceId(pub Uuid);

impl DeviceId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for DeviceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Network ───────────────────────────────────────────────────────

/// A network subnet in a data center.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Network {
    pub id: NetworkId,
    pub name: String,
    /// CIDR notation, e.g. "192.168.1.0/24".
    pub subnet: String,
    pub datacenter_id: Option<String>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Network {
    pub fn new(id: NetworkId, name: impl Into<String>, subnet: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            name: name.into(),
            subnet: subnet.into(),
            datacenter_id: None,
            description: None,
            created_at: now,
            updated_at: now,
        }
    }
}

// ── Discovery rule ────────────────────────────────────────────────

/// How thoroughly a network is probed.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ScanType {
    /// ICMP liveness only.
    Quick,
    /// Liveness, identity, ports, services, OS guess.
    #[default]
    Full,
    /// Same stages as full; recorded with a higher depth.
    Deep,
}

impl ScanType {
    /// Numeric depth recorded on the scan run.
    pub fn depth(&self) -> u8 {
        match self {
            Self::Quick => 1,
            Self::Full => 3,
            Self::Deep => 5,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Quick => "quick",
            Self::Full => "full",
            Self::Deep => "deep",
        }
    }
}

impl fmt::Display for ScanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScanType {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "quick" => Ok(Self::Quick),
            "full" => Ok(Self::Full),
            "deep" => Ok(Self::Deep),
            _ => Err(ModelError::invalid("scan type", s)),
        }
    }
}

/// Which port list the port prober uses.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PortScanType {
    #[default]
    Common,
    /// Accepted for compatibility; probes the common list.
    Full,
    Custom,
}

impl PortScanType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Common => "common",
            Self::Full => "full",
            Self::Custom => "custom",
        }
    }
}

impl fmt::Display for PortScanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PortScanType {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "common" => Ok(Self::Common),
            "full" => Ok(Self::Full),
            "custom" => Ok(Self::Custom),
            _ => Err(ModelError::invalid("port scan type", s)),
        }
    }
}

/// Per-network discovery configuration. Immutable for the duration of a scan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiscoveryRule {
    #[serde(default)]
    pub scan_type: ScanType,

    #[serde(default = "default_true")]
    pub scan_ports: bool,

    #[serde(default)]
    pub port_scan_type: PortScanType,

    #[serde(default)]
    pub custom_ports: BTreeSet<u16>,

    #[serde(default = "default_true")]
    pub service_detection: bool,

    #[serde(default = "default_true")]
    pub os_detection: bool,

    /// Literal addresses or CIDR blocks to skip.
    #[serde(default)]
    pub exclude_ips: Vec<String>,

    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl DiscoveryRule {
    /// Per-probe timeout. A zero setting is raised to one second.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds.max(1))
    }
}

impl Default for DiscoveryRule {
    fn default() -> Self {
        Self {
            scan_type: ScanType::default(),
            scan_ports: true,
            port_scan_type: PortScanType::default(),
            custom_ports: BTreeSet::new(),
            service_detection: true,
            os_detection: true,
            exclude_ips: Vec::new(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_timeout_seconds() -> u64 {
    5
}

// ── Scan run ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

impl ScanStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScanStatus {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(ModelError::invalid("scan status", s)),
        }
    }
}

/// The record of one discovery run over a network.
///
/// Mutated only by the orchestrator that created it; terminal once the
/// status is `Completed` or `Failed`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiscoveryScan {
    pub id: ScanId,
    pub network_id: NetworkId,
    pub status: ScanStatus,
    pub scan_type: ScanType,
    pub scan_depth: u8,
    pub total_hosts: u64,
    pub scanned_hosts: u64,
    pub found_hosts: u64,
    pub progress_percent: f64,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_seconds: i64,
    pub error_message: Option<String>,
}

impl DiscoveryScan {
    /// A pending scan of `network_id`.
    pub fn new(network_id: NetworkId, scan_type: ScanType) -> Self {
        Self {
            id: ScanId::new(),
            network_id,
            status: ScanStatus::Pending,
            scan_type,
            scan_depth: scan_type.depth(),
            total_hosts: 0,
            scanned_hosts: 0,
            found_hosts: 0,
            progress_percent: 0.0,
            started_at: None,
            completed_at: None,
            duration_seconds: 0,
            error_message: None,
        }
    }

    pub fn start(&mut self) {
        self.status = ScanStatus::Running;
        self.started_at = Some(Utc::now());
    }

    /// Account for one finished host and recompute the progress percentage.
    pub fn record_host(&mut self, found: bool) {
        self.scanned_hosts += 1;
        if found {
            self.found_hosts += 1;
        }
        if self.total_hosts > 0 {
            self.progress_percent = self.scanned_hosts as f64 / self.total_hosts as f64 * 100.0;
        }
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.status = ScanStatus::Failed;
        self.error_message = Some(message.into());
        self.finish();
    }

    pub fn complete(&mut self) {
        self.status = ScanStatus::Completed;
        if self.total_hosts == 0 {
            self.progress_percent = 100.0;
        }
        self.finish();
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn finish(&mut self) {
        let now = Utc::now();
        self.completed_at = Some(now);
        if let Some(started) = self.started_at {
            self.duration_seconds = (now - started).num_seconds();
        }
    }
}

// ── Discovered devices ────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    #[default]
    Unknown,
    Online,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Tcp,
}

/// A service identified on an open port.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceInfo {
    pub port: u16,
    pub protocol: Protocol,
    pub banner: Option<String>,
    pub service: String,
    pub version: Option<String>,
}

/// A host-level discovery result, keyed by IP address.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiscoveredDevice {
    pub id: DeviceId,
    pub ip: IpAddr,
    pub mac_address: Option<String>,
    pub hostname: Option<String>,
    pub network_id: NetworkId,
    pub status: DeviceStatus,
    /// 0–100.
    pub confidence: u8,
    pub os_guess: Option<String>,
    pub os_family: Option<String>,
    pub open_ports: Vec<u16>,
    pub services: Vec<ServiceInfo>,
    pub last_scan_id: ScanId,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}
