//! rackd-core: Shared model types for rackd network discovery.
//!
//! This crate provides the types exchanged between the discovery scanner
//! and the inventory store:
//! - Networks and the per-network discovery rule
//! - Scan run records and their lifecycle
//! - Discovered devices and the services found on them
//! - Model parse errors

pub mod error;
pub mod types;

pub use error::ModelError;
pub use types::{
    DeviceId, DeviceStatus, DiscoveredDevice, DiscoveryRule, DiscoveryScan, Network, NetworkId,
    PortScanType, Protocol, ScanId, ScanStatus, ScanType, ServiceInfo,
};
