//! CLI entry point for the rackd-discover network scanner.

use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, EnvFilter};

use rackd_core::{DiscoveryRule, Network, NetworkId, PortScanType, ScanType};
use rackd_store::{DiscoveryStore, JsonFileStore};

use rackd_discover::{DiscoverConfig, ScanObserver, ScannerRegistry, StoreObserver};

#[derive(Parser)]
#[command(name = "rackd-discover")]
#[command(about = "Network discovery scanner for the rackd inventory")]
struct Cli {
    /// Network to scan, as stored under the data directory.
    #[arg(short, long)]
    network_id: Option<String>,

    /// Scan an ad-hoc subnet (CIDR) instead; it is saved as a network first.
    #[arg(short, long)]
    subnet: Option<String>,

    /// Scan type: quick, full, deep.
    #[arg(long)]
    scan_type: Option<ScanType>,

    /// Port list: common, full, custom.
    #[arg(long)]
    port_scan_type: Option<PortScanType>,

    /// Custom port (repeatable); implies --port-scan-type custom.
    #[arg(short, long = "port")]
    ports: Vec<u16>,

    /// Address or CIDR block to skip (repeatable).
    #[arg(short, long = "exclude")]
    exclude: Vec<String>,

    /// Per-probe timeout in seconds.
    #[arg(short, long)]
    timeout: Option<u64>,

    #[arg(long)]
    no_ports: bool,

    #[arg(long)]
    no_services: bool,

    #[arg(long)]
    no_os: bool,

    /// Scanner implementation to run.
    #[arg(long, default_value = rackd_discover::BUILTIN_SCANNER)]
    scanner: String,

    /// Store directory (overrides discover.data_dir).
    #[arg(long)]
    data_dir: Option<String>,

    /// Config file prefix (default: rackd).
    #[arg(short, long, default_value = "rackd")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).json().init();

    let cli = Cli::parse();
    let config = DiscoverConfig::load(&cli.config)?;

    let data_dir = cli.data_dir.clone().unwrap_or_else(|| config.data_dir.clone());
    let store = Arc::new(JsonFileStore::new(&data_dir)?);
    let network_id = resolve_network(&cli, &store).await?;
    let rule = build_rule(&cli, config.rule.clone());

    let store: Arc<dyn DiscoveryStore> = store;
    let registry = ScannerRegistry::with_builtin(store.clone(), &config);
    let scanner = registry.get(&cli.scanner).ok_or_else(|| {
        anyhow::anyhow!(
            "Unknown scanner: {}. Available: {}",
            cli.scanner,
            registry.names().join(", ")
        )
    })?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping scan");
            on_signal.cancel();
        }
    });

    let observer: Arc<dyn ScanObserver> = Arc::new(StoreObserver::new(store.clone()));
    let scan = scanner
        .scan_network(cancel, &network_id, &rule, Some(observer))
        .await?;

    let devices = store.list_discovered_devices(&network_id).await?;
    for device in &devices {
        tracing::info!(
            ip = %device.ip,
            hostname = device.hostname.as_deref().unwrap_or("-"),
            mac = device.mac_address.as_deref().unwrap_or("-"),
            os = device.os_guess.as_deref().unwrap_or("-"),
            ports = ?device.open_ports,
            confidence = device.confidence,
            "Device"
        );
    }
    tracing::info!(
        scan_id = %scan.id,
        status = %scan.status,
        scanned = scan.scanned_hosts,
        found = scan.found_hosts,
        known_devices = devices.len(),
        "Scan finished"
    );

    Ok(())
}

async fn resolve_network(cli: &Cli, store: &JsonFileStore) -> anyhow::Result<NetworkId> {
    match (&cli.network_id, &cli.subnet) {
        (Some(id), None) => Ok(NetworkId::new(id.as_str())),
        (id, Some(subnet)) => {
            let id = id.clone().unwrap_or_else(|| subnet.replace(['/', ':'], "_"));
            let network = Network::new(NetworkId::new(id), subnet.as_str(), subnet.as_str());
            store.put_network(&network).await?;
            tracing::info!(network_id = %network.id, subnet = %subnet, "Ad-hoc network saved");
            Ok(network.id)
        }
        (None, None) => anyhow::bail!("Specify --network-id or --subnet"),
    }
}

fn build_rule(cli: &Cli, mut rule: DiscoveryRule) -> DiscoveryRule {
    if let Some(scan_type) = cli.scan_type {
        rule.scan_type = scan_type;
    }
    if let Some(port_scan_type) = cli.port_scan_type {
        rule.port_scan_type = port_scan_type;
    }
    if !cli.ports.is_empty() {
        rule.port_scan_type = PortScanType::Custom;
        rule.custom_ports = cli.ports.iter().copied().collect();
    }
    rule.exclude_ips.extend(cli.exclude.iter().cloned());
    if let Some(timeout) = cli.timeout {
        rule.timeout_seconds = timeout;
    }
    rule.scan_ports &= !cli.no_ports;
    rule.service_detection &= !cli.no_services;
    rule.os_detection &= !cli.no_os;
    rule
}
