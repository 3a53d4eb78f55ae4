//! End-to-end scan tests against the in-memory store.
//!
//! Host probing is replaced by scripted probes so the tests don't depend on
//! the network or on ICMP privileges.

use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rackd_core::{
    DeviceId, DeviceStatus, DiscoveredDevice, DiscoveryRule, DiscoveryScan, Network, NetworkId,
    ScanStatus, ScanType,
};
use rackd_discover::identity::IdentityProber;
use rackd_discover::ping::IcmpProber;
use rackd_discover::services::ServiceProber;
use rackd_discover::{
    DiscoverConfig, DiscoverError, DiscoveryScanner, HostPipeline, HostProbe, ScanContext,
    ScanObserver, Scanner, StoreObserver,
};
use rackd_store::{DiscoveryStore, MemoryStore, StoreError};
use tokio_util::sync::CancellationToken;

// ── Fixtures ──────────────────────────────────────────────────────

/// Reports every host as online, optionally with a hostname.
#[derive(Default)]
struct ScriptedProbe {
    hostname: Option<String>,
    delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedProbe {
    fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }

    fn with_hostname(name: &str) -> Self {
        Self {
            hostname: Some(name.to_string()),
            ..Default::default()
        }
    }
}

#[async_trait]
impl HostProbe for ScriptedProbe {
    async fn probe_host(
        &self,
        ip: IpAddr,
        scan: &ScanContext,
        _cancel: &CancellationToken,
    ) -> rackd_discover::Result<Option<DiscoveredDevice>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let now = Utc::now();
        Ok(Some(DiscoveredDevice {
            id: DeviceId::new(),
            ip,
            mac_address: None,
            hostname: self.hostname.clone(),
            network_id: scan.network_id.clone(),
            status: DeviceStatus::Online,
            confidence: 50,
            os_guess: None,
            os_family: None,
            open_ports: Vec::new(),
            services: Vec::new(),
            last_scan_id: scan.scan_id,
            first_seen: now,
            last_seen: now,
        }))
    }
}

/// Keeps every snapshot it is handed.
#[derive(Default)]
struct RecordingObserver {
    snapshots: Mutex<Vec<DiscoveryScan>>,
}

impl RecordingObserver {
    fn snapshots(&self) -> Vec<DiscoveryScan> {
        self.snapshots.lock().unwrap().clone()
    }
}

#[async_trait]
impl ScanObserver for RecordingObserver {
    async fn on_update(&self, scan: &DiscoveryScan) {
        self.snapshots.lock().unwrap().push(scan.clone());
    }
}

/// Stalls on the first progress milestone before recording it.
struct SlowMilestoneObserver {
    milestone: u64,
    stall: Duration,
    inner: RecordingObserver,
}

#[async_trait]
impl ScanObserver for SlowMilestoneObserver {
    async fn on_update(&self, scan: &DiscoveryScan) {
        if scan.status == ScanStatus::Running && scan.scanned_hosts == self.milestone {
            tokio::time::sleep(self.stall).await;
        }
        self.inner.on_update(scan).await;
    }
}

/// Delegates reads to a memory store but refuses device writes.
struct ReadOnlyDevices(MemoryStore);

#[async_trait]
impl DiscoveryStore for ReadOnlyDevices {
    async fn get_network(&self, id: &NetworkId) -> rackd_store::Result<Network> {
        self.0.get_network(id).await
    }

    async fn create_or_update_discovered_device(
        &self,
        _device: &DiscoveredDevice,
    ) -> rackd_store::Result<()> {
        Err(StoreError::Io(std::io::Error::other("read-only")))
    }

    async fn update_discovery_scan(&self, scan: &DiscoveryScan) -> rackd_store::Result<()> {
        self.0.update_discovery_scan(scan).await
    }

    async fn get_discovered_device(
        &self,
        ip: IpAddr,
    ) -> rackd_store::Result<Option<DiscoveredDevice>> {
        self.0.get_discovered_device(ip).await
    }

    async fn list_discovered_devices(
        &self,
        network_id: &NetworkId,
    ) -> rackd_store::Result<Vec<DiscoveredDevice>> {
        self.0.list_discovered_devices(network_id).await
    }

    async fn get_discovery_scan(
        &self,
        id: &rackd_core::ScanId,
    ) -> rackd_store::Result<Option<DiscoveryScan>> {
        self.0.get_discovery_scan(id).await
    }
}

async fn store_with(id: &str, subnet: &str) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store
        .put_network(Network::new(NetworkId::new(id), id, subnet))
        .await;
    store
}

fn scanner(store: Arc<MemoryStore>, probe: Arc<ScriptedProbe>, config: &DiscoverConfig) -> DiscoveryScanner {
    DiscoveryScanner::with_probe(store, probe, config)
}

// ── Tests ─────────────────────────────────────────────────────────

#[tokio::test]
async fn concurrency_is_bounded_and_counters_complete() {
    let store = store_with("lab", "10.0.0.0/27").await;
    let probe = Arc::new(ScriptedProbe::with_delay(Duration::from_millis(20)));
    let config = DiscoverConfig::default();

    let scan = scanner(store.clone(), probe.clone(), &config)
        .scan_network(
            CancellationToken::new(),
            &NetworkId::new("lab"),
            &DiscoveryRule::default(),
            None,
        )
        .await
        .unwrap();

    assert_eq!(scan.status, ScanStatus::Completed);
    assert_eq!(scan.total_hosts, 30);
    assert_eq!(scan.scanned_hosts, 30);
    assert_eq!(scan.found_hosts, 30);
    assert_eq!(scan.progress_percent, 100.0);
    assert_eq!(scan.scan_depth, 3);
    assert!(scan.completed_at.is_some());

    let peak = probe.max_in_flight.load(Ordering::SeqCst);
    assert!(peak <= 5, "peak concurrency was {peak}");
    assert!(peak >= 2, "hosts were never probed concurrently");
    assert_eq!(store.device_count().await, 30);
}

#[tokio::test]
async fn missing_network_fails_the_scan() {
    let store = Arc::new(MemoryStore::new());
    let observer = Arc::new(RecordingObserver::default());
    let probe = Arc::new(ScriptedProbe::default());

    let err = scanner(store, probe.clone(), &DiscoverConfig::default())
        .scan_network(
            CancellationToken::new(),
            &NetworkId::new("ghost"),
            &DiscoveryRule::default(),
            Some(observer.clone()),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DiscoverError::Store(StoreError::NetworkNotFound(_))
    ));

    let last = observer.snapshots().pop().unwrap();
    assert_eq!(last.status, ScanStatus::Failed);
    assert!(last.error_message.unwrap().starts_with("getting network:"));
    assert_eq!(last.scanned_hosts, 0);
    assert_eq!(probe.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn invalid_subnet_fails_the_scan() {
    let store = store_with("broken", "10.0.0.0/40").await;
    let observer = Arc::new(StoreObserver::new(store.clone()));
    let recorder = Arc::new(RecordingObserver::default());

    let err = scanner(store.clone(), Arc::new(ScriptedProbe::default()), &DiscoverConfig::default())
        .scan_network(
            CancellationToken::new(),
            &NetworkId::new("broken"),
            &DiscoveryRule::default(),
            Some(recorder.clone()),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DiscoverError::InvalidSubnet { .. }));

    let failed = recorder.snapshots().pop().unwrap();
    assert!(failed.error_message.as_deref().unwrap().starts_with("generating IP list:"));

    // The same snapshot persisted through the store observer.
    observer.on_update(&failed).await;
    let stored = store.get_discovery_scan(&failed.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ScanStatus::Failed);
    assert_eq!(stored.total_hosts, 0);
}

#[tokio::test]
async fn excluded_hosts_count_as_scanned_but_are_not_probed() {
    let store = store_with("lab", "10.0.0.0/29").await;
    let probe = Arc::new(ScriptedProbe::default());
    let rule = DiscoveryRule {
        exclude_ips: vec![
            "10.0.0.1".to_string(),
            "10.0.0.4/31".to_string(),
            "not-an-address".to_string(),
        ],
        ..Default::default()
    };

    let scan = scanner(store.clone(), probe.clone(), &DiscoverConfig::default())
        .scan_network(CancellationToken::new(), &NetworkId::new("lab"), &rule, None)
        .await
        .unwrap();

    assert_eq!(scan.total_hosts, 6);
    assert_eq!(scan.scanned_hosts, 6);
    assert_eq!(scan.found_hosts, 3);
    assert_eq!(probe.calls.load(Ordering::SeqCst), 3);

    let ips: Vec<String> = store
        .list_discovered_devices(&NetworkId::new("lab"))
        .await
        .unwrap()
        .iter()
        .map(|d| d.ip.to_string())
        .collect();
    assert_eq!(ips, vec!["10.0.0.2", "10.0.0.3", "10.0.0.6"]);
}

#[tokio::test]
async fn progress_is_reported_every_interval() {
    let store = store_with("lab", "10.0.0.0/25").await;
    let observer = Arc::new(RecordingObserver::default());

    let scan = scanner(store, Arc::new(ScriptedProbe::default()), &DiscoverConfig::default())
        .scan_network(
            CancellationToken::new(),
            &NetworkId::new("lab"),
            &DiscoveryRule::default(),
            Some(observer.clone()),
        )
        .await
        .unwrap();

    let snapshots = observer.snapshots();
    assert_eq!(snapshots.len(), 6);

    // Creation, then total known.
    assert_eq!(snapshots[0].status, ScanStatus::Running);
    assert_eq!(snapshots[0].total_hosts, 0);
    assert_eq!(snapshots[1].total_hosts, 126);
    assert_eq!(snapshots[1].scanned_hosts, 0);

    let milestones: Vec<u64> = snapshots[2..5].iter().map(|s| s.scanned_hosts).collect();
    assert_eq!(milestones, vec![50, 100, 126]);

    let last = snapshots.last().unwrap();
    assert_eq!(last.status, ScanStatus::Completed);
    assert_eq!(last, &scan);
    assert!(snapshots.iter().all(|s| s.id == scan.id));
}

#[tokio::test]
async fn slow_observer_still_sees_progress_in_order() {
    let store = store_with("lab", "10.0.0.0/25").await;
    let observer = Arc::new(SlowMilestoneObserver {
        milestone: 50,
        stall: Duration::from_millis(300),
        inner: RecordingObserver::default(),
    });
    scanner(
        store,
        Arc::new(ScriptedProbe::with_delay(Duration::from_millis(1))),
        &DiscoverConfig::default(),
    )
        .scan_network(
            CancellationToken::new(),
            &NetworkId::new("lab"),
            &DiscoveryRule::default(),
            Some(observer.clone()),
        )
        .await
        .unwrap();

    let scanned: Vec<u64> = observer
        .inner
        .snapshots()
        .iter()
        .map(|s| s.scanned_hosts)
        .collect();
    assert!(
        scanned.windows(2).all(|w| w[0] <= w[1]),
        "progress went backwards: {scanned:?}"
    );
    assert!(scanned.contains(&50));

    let last = observer.inner.snapshots().pop().unwrap();
    assert_eq!(last.status, ScanStatus::Completed);
    assert_eq!(last.scanned_hosts, 126);
}

#[tokio::test]
async fn cancelled_scan_completes_without_probing() {
    let store = store_with("lab", "10.0.0.0/28").await;
    let probe = Arc::new(ScriptedProbe::default());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let scan = scanner(store.clone(), probe.clone(), &DiscoverConfig::default())
        .scan_network(cancel, &NetworkId::new("lab"), &DiscoveryRule::default(), None)
        .await
        .unwrap();

    assert_eq!(scan.status, ScanStatus::Completed);
    assert_eq!(scan.scanned_hosts, scan.total_hosts);
    assert_eq!(scan.found_hosts, 0);
    assert_eq!(probe.calls.load(Ordering::SeqCst), 0);
    assert_eq!(store.device_count().await, 0);
}

#[tokio::test]
async fn rescans_overwrite_devices_by_ip() {
    let store = store_with("lab", "10.0.0.8/30").await;
    let network_id = NetworkId::new("lab");
    let config = DiscoverConfig::default();

    let first = scanner(store.clone(), Arc::new(ScriptedProbe::with_hostname("old.lan")), &config)
        .scan_network(CancellationToken::new(), &network_id, &DiscoveryRule::default(), None)
        .await
        .unwrap();
    let ip: IpAddr = "10.0.0.9".parse().unwrap();
    let before = store.get_discovered_device(ip).await.unwrap().unwrap();
    assert_eq!(before.hostname.as_deref(), Some("old.lan"));
    assert_eq!(before.last_scan_id, first.id);

    let second = scanner(store.clone(), Arc::new(ScriptedProbe::default()), &config)
        .scan_network(CancellationToken::new(), &network_id, &DiscoveryRule::default(), None)
        .await
        .unwrap();
    let after = store.get_discovered_device(ip).await.unwrap().unwrap();

    assert_eq!(store.device_count().await, 2);
    assert_eq!(after.id, before.id);
    assert_eq!(after.first_seen, before.first_seen);
    assert_eq!(after.hostname, None);
    assert_eq!(after.last_scan_id, second.id);
}

#[tokio::test]
async fn failed_device_writes_do_not_abort_the_scan() {
    let inner = MemoryStore::new();
    inner
        .put_network(Network::new(NetworkId::new("lab"), "lab", "10.0.0.0/30"))
        .await;
    let store = Arc::new(ReadOnlyDevices(inner));

    let scan = DiscoveryScanner::with_probe(
        store.clone(),
        Arc::new(ScriptedProbe::default()),
        &DiscoverConfig::default(),
    )
    .scan_network(
        CancellationToken::new(),
        &NetworkId::new("lab"),
        &DiscoveryRule::default(),
        None,
    )
    .await
    .unwrap();

    assert_eq!(scan.status, ScanStatus::Completed);
    assert_eq!(scan.found_hosts, 2);
    assert!(store
        .list_discovered_devices(&NetworkId::new("lab"))
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn quick_scan_without_icmp_finds_nothing() {
    let store = store_with("loop", "127.0.0.0/30").await;
    let pipeline = HostPipeline::with_probers(
        IcmpProber::unprivileged(),
        IdentityProber::with_neighbor_table("/nonexistent/arp"),
        ServiceProber::new(Duration::from_secs(1), Duration::from_millis(200)),
    );
    let rule = DiscoveryRule {
        scan_type: ScanType::Quick,
        ..Default::default()
    };

    let scan = DiscoveryScanner::with_probe(store.clone(), Arc::new(pipeline), &DiscoverConfig::default())
        .scan_network(CancellationToken::new(), &NetworkId::new("loop"), &rule, None)
        .await
        .unwrap();

    assert_eq!(scan.scan_depth, 1);
    assert_eq!(scan.scanned_hosts, 2);
    assert_eq!(scan.found_hosts, 0);
    assert_eq!(store.device_count().await, 0);
}
