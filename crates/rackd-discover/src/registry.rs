//! Named scanner implementations.

use std::collections::HashMap;
use std::sync::Arc;

use rackd_store::DiscoveryStore;

use crate::config::DiscoverConfig;
use crate::scanner::{DiscoveryScanner, Scanner};

/// Name the built-in scanner registers under.
pub const BUILTIN_SCANNER: &str = "builtin";

#[derive(Clone, Default)]
pub struct ScannerRegistry {
    scanners: HashMap<String, Arc<dyn Scanner>>,
}

impl ScannerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in scanner.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn with_builtin(store: Arc<dyn DiscoveryStore>, config: &DiscoverConfig) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(DiscoveryScanner::new(store, config)));
        registry
    }

    /// Register `scanner` under its own name, replacing any previous entry.
    pub fn register(&mut self, scanner: Arc<dyn Scanner>) -> Option<Arc<dyn Scanner>> {
        let name = scanner.name().to_string();
        tracing::debug!(scanner = %name, "Scanner registered");
        self.scanners.insert(name, scanner)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Scanner>> {
        self.scanners.get(name).cloned()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.scanners.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
