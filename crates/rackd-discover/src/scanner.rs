//! Scan orchestration.
//!
//! A scan expands the network's subnet into host addresses, runs one task
//! per host with at most `max_concurrent_hosts` probing at once, persists
//! every discovered device and keeps the scan record's counters current.

use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use rackd_core::{DiscoveryRule, DiscoveryScan, NetworkId};
use rackd_store::DiscoveryStore;
use tokio::sync::{Mutex, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::config::DiscoverConfig;
use crate::error::Result;
use crate::exclude::ExclusionList;
use crate::pipeline::{HostPipeline, HostProbe, ScanContext};
use crate::range::enumerate_hosts;

/// Receives snapshots of a scan record as it changes.
///
/// Implementations must absorb their own failures.
#[async_trait]
pub trait ScanObserver: Send + Sync {
    async fn on_update(&self, scan: &DiscoveryScan);
}

/// A pluggable network scanner.
#[async_trait]
pub trait Scanner: Send + Sync {
    fn name(&self) -> &str;

    /// Scan every host of `network_id` under `rule`.
    ///
    /// Returns the terminal scan record. When the network can't be loaded
    /// or its subnet can't be expanded, the record is reported as failed
    /// and the cause is returned as the error.
    async fn scan_network(
        &self,
        cancel: CancellationToken,
        network_id: &NetworkId,
        rule: &DiscoveryRule,
        observer: Option<Arc<dyn ScanObserver>>,
    ) -> Result<DiscoveryScan>;
}

/// The built-in scanner.
pub struct DiscoveryScanner {
    store: Arc<dyn DiscoveryStore>,
    probe: Arc<dyn HostProbe>,
    max_concurrent_hosts: usize,
    progress_interval: u64,
    max_hosts: u64,
}

impl DiscoveryScanner {
    /// Scanner using the real host pipeline.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(store: Arc<dyn DiscoveryStore>, config: &DiscoverConfig) -> Self {
        Self::with_probe(store, Arc::new(HostPipeline::new(config)), config)
    }

    pub fn with_probe(
        store: Arc<dyn DiscoveryStore>,
        probe: Arc<dyn HostProbe>,
        config: &DiscoverConfig,
    ) -> Self {
        Self {
            store,
            probe,
            max_concurrent_hosts: config.max_concurrent_hosts.max(1),
            progress_interval: config.progress_interval.max(1),
            max_hosts: config.max_hosts,
        }
    }
}

#[async_trait]
impl Scanner for DiscoveryScanner {
    fn name(&self) -> &str {
        crate::registry::BUILTIN_SCANNER
    }

    async fn scan_network(
        &self,
        cancel: CancellationToken,
        network_id: &NetworkId,
        rule: &DiscoveryRule,
        observer: Option<Arc<dyn ScanObserver>>,
    ) -> Result<DiscoveryScan> {
        let mut scan = DiscoveryScan::new(network_id.clone(), rule.scan_type);
        scan.start();
        report(observer.as_deref(), &scan).await;

        let network = match self.store.get_network(network_id).await {
            Ok(network) => network,
            Err(e) => {
                fail(&mut scan, format!("getting network: {e}"), observer.as_deref()).await;
                return Err(e.into());
            }
        };

        let hosts = match enumerate_hosts(&network.subnet, self.max_hosts) {
            Ok(hosts) => hosts,
            Err(e) => {
                fail(&mut scan, format!("generating IP list: {e}"), observer.as_deref()).await;
                return Err(e);
            }
        };

        scan.total_hosts = hosts.len() as u64;
        report(observer.as_deref(), &scan).await;

        tracing::info!(
            scan_id = %scan.id,
            network_id = %network_id,
            subnet = %network.subnet,
            hosts = hosts.len(),
            "Starting network scan"
        );
        tracing::debug!(
            scan_type = %rule.scan_type,
            scan_ports = rule.scan_ports,
            port_scan_type = %rule.port_scan_type,
            service_detection = rule.service_detection,
            os_detection = rule.os_detection,
            timeout_secs = rule.timeout().as_secs(),
            "Scan configuration"
        );

        let shared = Arc::new(HostTaskShared {
            ctx: ScanContext {
                scan_id: scan.id,
                network_id: network_id.clone(),
                rule: rule.clone(),
            },
            exclusions: ExclusionList::new(&rule.exclude_ips),
            store: self.store.clone(),
            probe: self.probe.clone(),
            progress: Mutex::new(ScanProgress::new(scan, self.progress_interval)),
            published: Mutex::new(0),
            observer,
            semaphore: Semaphore::new(self.max_concurrent_hosts),
            cancel,
        });

        let mut handles = Vec::with_capacity(hosts.len());
        for ip in hosts {
            let shared = shared.clone();
            handles.push(tokio::spawn(async move { shared.run(ip).await }));
        }

        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Host scan task panicked");
                shared.record(false).await;
            }
        }

        let mut scan = shared.progress.lock().await.scan.clone();
        if shared.cancel.is_cancelled() {
            tracing::warn!(scan_id = %scan.id, scanned = scan.scanned_hosts, "Scan cancelled");
        }
        scan.complete();
        report(shared.observer.as_deref(), &scan).await;

        tracing::info!(
            scan_id = %scan.id,
            found = scan.found_hosts,
            scanned = scan.scanned_hosts,
            duration_secs = scan.duration_seconds,
            "Network scan completed"
        );
        Ok(scan)
    }
}

// ── Host tasks ────────────────────────────────────────────────────

struct HostTaskShared {
    ctx: ScanContext,
    exclusions: ExclusionList,
    store: Arc<dyn DiscoveryStore>,
    probe: Arc<dyn HostProbe>,
    progress: Mutex<ScanProgress>,
    /// Highest `scanned_hosts` handed to the observer so far.
    published: Mutex<u64>,
    observer: Option<Arc<dyn ScanObserver>>,
    semaphore: Semaphore,
    cancel: CancellationToken,
}

impl HostTaskShared {
    async fn run(&self, ip: IpAddr) {
        let found = match self.semaphore.acquire().await {
            Ok(_permit) => self.scan_host(ip).await,
            Err(e) => {
                tracing::warn!(%ip, error = %e, "Host admission failed");
                false
            }
        };
        self.record(found).await;
    }

    /// Probe and persist one host. `true` when a device record was produced.
    async fn scan_host(&self, ip: IpAddr) -> bool {
        if self.exclusions.contains(ip) {
            tracing::debug!(%ip, "Host excluded");
            return false;
        }
        if self.cancel.is_cancelled() {
            return false;
        }

        let device = match self.probe.probe_host(ip, &self.ctx, &self.cancel).await {
            Ok(Some(device)) => device,
            Ok(None) => return false,
            Err(e) => {
                tracing::debug!(%ip, error = %e, "Host probe failed");
                return false;
            }
        };

        tracing::debug!(
            %ip,
            status = ?device.status,
            confidence = device.confidence,
            "Device discovered"
        );
        if let Err(e) = self.store.create_or_update_discovered_device(&device).await {
            tracing::warn!(%ip, error = %e, "Failed to save discovered device");
        }
        true
    }

    async fn record(&self, found: bool) {
        let Some(scan) = self.progress.lock().await.record(found) else {
            return;
        };

        // Publication has its own lock; the counter lock stays off I/O.
        // A snapshot overtaken by a newer one is dropped.
        let mut published = self.published.lock().await;
        if scan.scanned_hosts <= *published {
            return;
        }
        *published = scan.scanned_hosts;

        tracing::info!(
            scan_id = %scan.id,
            scanned = scan.scanned_hosts,
            total = scan.total_hosts,
            found = scan.found_hosts,
            "Scan progress"
        );
        report(self.observer.as_deref(), &scan).await;
    }
}

/// The scan record plus the throttle deciding when to publish it.
struct ScanProgress {
    scan: DiscoveryScan,
    interval: u64,
}

impl ScanProgress {
    fn new(scan: DiscoveryScan, interval: u64) -> Self {
        Self {
            scan,
            interval: interval.max(1),
        }
    }

    /// Count one finished host. Returns a snapshot on every `interval`-th
    /// host and on the last one.
    fn record(&mut self, found: bool) -> Option<DiscoveryScan> {
        self.scan.record_host(found);
        let scanned = self.scan.scanned_hosts;
        (scanned % self.interval == 0 || scanned == self.scan.total_hosts)
            .then(|| self.scan.clone())
    }
}

async fn report(observer: Option<&dyn ScanObserver>, scan: &DiscoveryScan) {
    if let Some(observer) = observer {
        observer.on_update(scan).await;
    }
}

async fn fail(scan: &mut DiscoveryScan, message: String, observer: Option<&dyn ScanObserver>) {
    tracing::error!(scan_id = %scan.id, network_id = %scan.network_id, error = %message, "Scan failed");
    scan.fail(message);
    report(observer, scan).await;
}
