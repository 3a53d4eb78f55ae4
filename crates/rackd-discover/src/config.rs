//! Configuration for the rackd-discover scanner.

use std::time::Duration;

use rackd_core::DiscoveryRule;
use serde::Deserialize;

use crate::error::{DiscoverError, Result};

/// Top-level discover configuration.
///
/// Loaded from the `[discover]` section of `rackd.toml` or from
/// `RACKD_DISCOVER__` environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoverConfig {
    /// Hosts probed at the same time within one scan.
    #[serde(default = "default_max_concurrent_hosts")]
    pub max_concurrent_hosts: usize,

    /// Publish a progress snapshot every this many finished hosts.
    #[serde(default = "default_progress_interval")]
    pub progress_interval: u64,

    /// Refuse to enumerate subnets holding more addresses than this.
    #[serde(default = "default_max_hosts")]
    pub max_hosts: u64,

    #[serde(default = "default_service_connect_timeout")]
    pub service_connect_timeout_secs: u64,

    #[serde(default = "default_banner_read_timeout")]
    pub banner_read_timeout_ms: u64,

    /// Root directory of the JSON store used by the CLI.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Rule applied when the command line doesn't override it.
    #[serde(default)]
    pub rule: DiscoveryRule,
}

impl DiscoverConfig {
    /// Load `[discover]` from `{file_prefix}.toml` (optional) layered under
    /// `RACKD_DISCOVER__*` environment variables.
    pub fn load(file_prefix: &str) -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::File::with_name(file_prefix).required(false))
            .add_source(
                config::Environment::with_prefix("RACKD")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| DiscoverError::Config(e.to_string()))?;

        match cfg.get::<DiscoverConfig>("discover") {
            Ok(c) => Ok(c),
            Err(config::ConfigError::NotFound(_)) => Ok(DiscoverConfig::default()),
            Err(e) => Err(DiscoverError::Config(e.to_string())),
        }
    }

    pub fn service_connect_timeout(&self) -> Duration {
        Duration::from_secs(self.service_connect_timeout_secs)
    }

    pub fn banner_read_timeout(&self) -> Duration {
        Duration::from_millis(self.banner_read_timeout_ms)
    }
}

fn default_max_concurrent_hosts() -> usize {
    5
}

fn default_progress_interval() -> u64 {
    50
}

fn default_max_hosts() -> u64 {
    65_536
}

fn default_service_connect_timeout() -> u64 {
    3
}

fn default_banner_read_timeout() -> u64 {
    2_000
}

fn default_data_dir() -> String {
    "./data".to_string()
}

impl Default for DiscoverConfig {
    fn default() -> Self {
        Self {
            max_concurrent_hosts: default_max_concurrent_hosts(),
            progress_interval: default_progress_interval(),
            max_hosts: default_max_hosts(),
            service_connect_timeout_secs: default_service_connect_timeout(),
            banner_read_timeout_ms: default_banner_read_timeout(),
            data_dir: default_data_dir(),
            rule: DiscoveryRule::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rackd_core::{PortScanType, ScanType};

    #[test]
    fn test_default_config() {
        let config = DiscoverConfig::default();
        assert_eq!(config.max_concurrent_hosts, 5);
        assert_eq!(config.progress_interval, 50);
        assert_eq!(config.service_connect_timeout(), Duration::from_secs(3));
        assert_eq!(config.banner_read_timeout(), Duration::from_secs(2));
        assert_eq!(config.rule, DiscoveryRule::default());
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("absent");
        let config = DiscoverConfig::load(prefix.to_str().unwrap()).unwrap();
        assert_eq!(config.max_hosts, 65_536);
        assert_eq!(config.data_dir, "./data");
    }

    #[test]
    fn test_discover_section_is_read() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("rackd.toml"),
            r#"
[discover]
max_concurrent_hosts = 16
data_dir = "/var/lib/rackd"

[discover.rule]
scan_type = "quick"
port_scan_type = "custom"
custom_ports = [22, 8443]
exclude_ips = ["10.0.0.0/30"]
"#,
        )
        .unwrap();

        let prefix = dir.path().join("rackd");
        let config = DiscoverConfig::load(prefix.to_str().unwrap()).unwrap();
        assert_eq!(config.max_concurrent_hosts, 16);
        assert_eq!(config.progress_interval, 50);
        assert_eq!(config.data_dir, "/var/lib/rackd");
        assert_eq!(config.rule.scan_type, ScanType::Quick);
        assert_eq!(config.rule.port_scan_type, PortScanType::Custom);
        assert_eq!(config.rule.custom_ports.len(), 2);
        assert_eq!(config.rule.exclude_ips, vec!["10.0.0.0/30"]);
        assert!(config.rule.os_detection);
    }
}
