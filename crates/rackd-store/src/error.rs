//! Error types for the rackd-store crate.

use rackd_core::NetworkId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Network not found: {0}")]
    NetworkNotFound(NetworkId),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;
