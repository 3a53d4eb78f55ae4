//! In-process store backed by hash maps.

use std::collections::HashMap;
use std::net::IpAddr;

use async_trait::async_trait;
use rackd_core::{DiscoveredDevice, DiscoveryScan, Network, NetworkId, ScanId};
use tokio::sync::RwLock;

use crate::error::{Result, StoreError};
use crate::{upserted, DiscoveryStore};

/// Thread-safe store holding every record in memory.
#[derive(Default)]
pub struct MemoryStore {
    networks: RwLock<HashMap<NetworkId, Network>>,
    devices: RwLock<HashMap<IpAddr, DiscoveredDevice>>,
    scans: RwLock<HashMap<ScanId, DiscoveryScan>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a network record.
    pub async fn put_network(&self, network: Network) {
        self.networks
            .write()
            .await
            .insert(network.id.clone(), network);
    }

    pub async fn device_count(&self) -> usize {
        self.devices.read().await.len()
    }
}

#[async_trait]
impl DiscoveryStore for MemoryStore {
    async fn get_network(&self, id: &NetworkId) -> Result<Network> {
        self.networks
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NetworkNotFound(id.clone()))
    }

    async fn create_or_update_discovered_device(&self, device: &DiscoveredDevice) -> Result<()> {
        let mut devices = self.devices.write().await;
        let record = upserted(devices.get(&device.ip), device);
        devices.insert(record.ip, record);
        Ok(())
    }

    async fn update_discovery_scan(&self, scan: &DiscoveryScan) -> Result<()> {
        self.scans.write().await.insert(scan.id, scan.clone());
        Ok(())
    }

    async fn get_discovered_device(&self, ip: IpAddr) -> Result<Option<DiscoveredDevice>> {
        Ok(self.devices.read().await.get(&ip).cloned())
    }

    async fn list_discovered_devices(
        &self,
        network_id: &NetworkId,
    ) -> Result<Vec<DiscoveredDevice>> {
        let mut devices: Vec<DiscoveredDevice> = self
            .devices
            .read()
            .await
            .values()
            .filter(|d| &d.network_id == network_id)
            .cloned()
            .collect();
        devices.sort_by_key(|d| d.ip);
        Ok(devices)
    }

    async fn get_discovery_scan(&self, id: &ScanId) -> Result<Option<DiscoveryScan>> {
        Ok(self.scans.read().await.get(id).cloned())
    }
}
