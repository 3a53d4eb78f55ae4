//! rackd-store: the inventory store boundary used by network discovery.
//!
//! The scanner never talks to a database directly. It resolves networks,
//! upserts discovered devices and persists scan progress through the
//! [`DiscoveryStore`] trait. Two backends ship with the crate:
//! - [`MemoryStore`]: process-local maps, for tests and embedding
//! - [`JsonFileStore`]: one JSON document per record under a directory

pub mod error;
pub mod file;
pub mod memory;

use std::net::IpAddr;

use async_trait::async_trait;
use rackd_core::{DiscoveredDevice, DiscoveryScan, Network, NetworkId, ScanId};

pub use error::{Result, StoreError};
pub use file::JsonFileStore;
pub use memory::MemoryStore;

/// Persistence operations consumed by the discovery scanner.
#[async_trait]
pub trait DiscoveryStore: Send + Sync {
    /// Resolve a network. Fails with [`StoreError::NetworkNotFound`] if absent.
    async fn get_network(&self, id: &NetworkId) -> Result<Network>;

    /// Idempotent upsert keyed by IP address.
    ///
    /// An existing record for the same IP keeps its `id` and `first_seen`;
    /// every other field is replaced by the incoming record.
    async fn create_or_update_discovered_device(&self, device: &DiscoveredDevice) -> Result<()>;

    /// Persist the current aggregate of a scan run.
    async fn update_discovery_scan(&self, scan: &DiscoveryScan) -> Result<()>;

    async fn get_discovered_device(&self, ip: IpAddr) -> Result<Option<DiscoveredDevice>>;

    /// Devices belonging to a network, ordered by IP.
    async fn list_discovered_devices(&self, network_id: &NetworkId)
        -> Result<Vec<DiscoveredDevice>>;

    async fn get_discovery_scan(&self, id: &ScanId) -> Result<Option<DiscoveryScan>>;
}

/// Apply last-write-wins upsert semantics against an existing record.
pub(crate) fn upserted(
    existing: Option<&DiscoveredDevice>,
    incoming: &DiscoveredDevice,
) -> DiscoveredDevice {
    let mut device = incoming.clone();
    if let Some(prev) = existing {
        device.id = prev.id;
        device.first_seen = prev.first_seen;
    }
    device
}
