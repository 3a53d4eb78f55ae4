//! Error types for the rackd-discover crate.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DiscoverError {
    #[error("Store error: {0}")]
    Store(#[from] rackd_store::StoreError),

    #[error("Invalid subnet {subnet}: {reason}")]
    InvalidSubnet { subnet: String, reason: String },

    #[error("Subnet {subnet} holds {hosts} addresses, limit is {limit}")]
    SubnetTooLarge {
        subnet: String,
        hosts: u128,
        limit: u64,
    },

    #[error("ICMP error: {0}")]
    Icmp(#[from] surge_ping::SurgeError),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DiscoverError>;
