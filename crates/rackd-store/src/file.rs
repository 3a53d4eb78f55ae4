//! File-system backed store.
//!
//! Records are kept as pretty-printed JSON documents:
//! ```text
//! {root}/
//!   networks/{network_id}.json
//!   devices/{ip}.json
//!   scans/{scan_id}.json
//! ```
//! Writes go to a temporary file first and are renamed into place, so a
//! reader never observes a half-written document.

use std::io::ErrorKind;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rackd_core::{DiscoveredDevice, DiscoveryScan, Network, NetworkId, ScanId};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::fs;
use tokio::sync::Mutex;

use crate::error::{Result, StoreError};
use crate::{upserted, DiscoveryStore};

const NETWORKS: &str = "networks";
const DEVICES: &str = "devices";
const SCANS: &str = "scans";

pub struct JsonFileStore {
    root: PathBuf,
    // Serialises read-modify-write cycles on device and scan documents.
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    /// Create a store rooted at the given directory.
    /// Creates the directory tree if it doesn't exist.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        for dir in [NETWORKS, DEVICES, SCANS] {
            std::fs::create_dir_all(root.join(dir))?;
        }
        tracing::info!(root = %root.display(), "JSON store initialised");
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Insert or replace a network record.
    pub async fn put_network(&self, network: &Network) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        write_json(&self.network_path(&network.id), network).await
    }

    fn network_path(&self, id: &NetworkId) -> PathBuf {
        self.root
            .join(NETWORKS)
            .join(format!("{}.json", file_stem(id.as_str())))
    }

    fn device_path(&self, ip: IpAddr) -> PathBuf {
        self.root
            .join(DEVICES)
            .join(format!("{}.json", file_stem(&ip.to_string())))
    }

    fn scan_path(&self, id: &ScanId) -> PathBuf {
        self.root.join(SCANS).join(format!("{id}.json"))
    }
}

#[async_trait]
impl DiscoveryStore for JsonFileStore {
    async fn get_network(&self, id: &NetworkId) -> Result<Network> {
        read_json(&self.network_path(id))
            .await?
            .ok_or_else(|| StoreError::NetworkNotFound(id.clone()))
    }

    async fn create_or_update_discovered_device(&self, device: &DiscoveredDevice) -> Result<()> {
        let path = self.device_path(device.ip);
        let _guard = self.write_lock.lock().await;
        let existing: Option<DiscoveredDevice> = read_json(&path).await?;
        let record = upserted(existing.as_ref(), device);
        write_json(&path, &record).await?;

        tracing::debug!(ip = %record.ip, device_id = %record.id, "Discovered device saved");
        Ok(())
    }

    async fn update_discovery_scan(&self, scan: &DiscoveryScan) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        write_json(&self.scan_path(&scan.id), scan).await
    }

    async fn get_discovered_device(&self, ip: IpAddr) -> Result<Option<DiscoveredDevice>> {
        read_json(&self.device_path(ip)).await
    }

    async fn list_discovered_devices(
        &self,
        network_id: &NetworkId,
    ) -> Result<Vec<DiscoveredDevice>> {
        let mut devices = Vec::new();
        let mut entries = fs::read_dir(self.root.join(DEVICES)).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(device) = read_json::<DiscoveredDevice>(&path).await? {
                if &device.network_id == network_id {
                    devices.push(device);
                }
            }
        }
        devices.sort_by_key(|d| d.ip);
        Ok(devices)
    }

    async fn get_discovery_scan(&self, id: &ScanId) -> Result<Option<DiscoveryScan>> {
        read_json(&self.scan_path(id)).await
    }
}

/// Map an identifier onto a safe file name.
fn file_stem(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match fs::read_to_string(path).await {
        Ok(json) => Ok(Some(serde_json::from_str(&json)?)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}
