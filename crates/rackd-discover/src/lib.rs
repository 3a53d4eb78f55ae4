//! rackd-discover: active network discovery for the rackd inventory.
//!
//! Sweeps a network's subnet with ICMP and TCP probes, identifies hosts,
//! their open ports and services, and records each responsive host as a
//! discovered device.

pub mod config;
pub mod error;
pub mod exclude;
pub mod fingerprint;
pub mod identity;
pub mod persist;
pub mod pipeline;
pub mod ping;
pub mod ports;
pub mod range;
pub mod registry;
pub mod scanner;
pub mod services;

pub use config::DiscoverConfig;
pub use error::{DiscoverError, Result};
pub use persist::StoreObserver;
pub use pipeline::{HostPipeline, HostProbe, ScanContext};
pub use registry::{ScannerRegistry, BUILTIN_SCANNER};
pub use scanner::{DiscoveryScanner, ScanObserver, Scanner};
