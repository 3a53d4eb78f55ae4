//! Scan record persistence.

use std::sync::Arc;

use async_trait::async_trait;
use rackd_core::DiscoveryScan;
use rackd_store::DiscoveryStore;

use crate::scanner::ScanObserver;

/// Writes every scan snapshot it receives to the store.
pub struct StoreObserver {
    store: Arc<dyn DiscoveryStore>,
}

impl StoreObserver {
    pub fn new(store: Arc<dyn DiscoveryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ScanObserver for StoreObserver {
    async fn on_update(&self, scan: &DiscoveryScan) {
        if let Err(e) = self.store.update_discovery_scan(scan).await {
            tracing::warn!(
                scan_id = %scan.id,
                status = %scan.status,
                error = %e,
                "Failed to persist scan progress"
            );
        }
    }
}
