//! ICMP liveness checks.
//!
//! Raw ICMP sockets need elevated privileges. Availability is probed once
//! when the prober is built; without privileges every check reports
//! [`Reachability::Unknown`] rather than failing the host.

use std::net::IpAddr;
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};
use surge_ping::{Client, Config, PingIdentifier, PingSequence, SurgeError, ICMP};

use crate::error::Result;

const PAYLOAD: [u8; 32] = [0; 32];

/// Outcome of one echo request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reachability {
    /// An echo reply arrived within the timeout.
    Alive,
    /// The request was sent but nothing came back.
    NoReply,
    /// No check was possible.
    Unknown,
}

impl Reachability {
    pub fn is_alive(&self) -> bool {
        matches!(self, Self::Alive)
    }
}

pub struct IcmpProber {
    v4: Option<Client>,
    v6: Option<Client>,
}

impl IcmpProber {
    /// Build a prober, opening raw ICMP clients when the process may.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new() -> Self {
        if !raw_icmp_available() {
            tracing::warn!("Raw ICMP sockets unavailable; liveness checks disabled");
            return Self::unprivileged();
        }

        let v4 = open_client(ICMP::V4, "ipv4");
        let v6 = open_client(ICMP::V6, "ipv6");
        tracing::info!(
            ipv4 = v4.is_some(),
            ipv6 = v6.is_some(),
            "ICMP prober ready"
        );
        Self { v4, v6 }
    }

    /// A prober that never sends anything.
    pub fn unprivileged() -> Self {
        Self { v4: None, v6: None }
    }

    /// Send one echo request to `ip` and wait up to `timeout` for the reply.
    pub async fn check(&self, ip: IpAddr, timeout: Duration) -> Result<Reachability> {
        let client = match ip {
            IpAddr::V4(_) => self.v4.as_ref(),
            IpAddr::V6(_) => self.v6.as_ref(),
        };
        let Some(client) = client else {
            return Ok(Reachability::Unknown);
        };

        let mut pinger = client.pinger(ip, PingIdentifier(rand::random())).await;
        pinger.timeout(timeout);

        match pinger.ping(PingSequence(0), &PAYLOAD).await {
            Ok((_, rtt)) => {
                tracing::trace!(%ip, rtt_ms = rtt.as_millis() as u64, "Echo reply");
                Ok(Reachability::Alive)
            }
            Err(SurgeError::Timeout { .. }) => Ok(Reachability::NoReply),
            Err(e) => Err(e.into()),
        }
    }
}

impl Default for IcmpProber {
    fn default() -> Self {
        Self::new()
    }
}

fn raw_icmp_available() -> bool {
    Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::ICMPV4)).is_ok()
}

fn open_client(kind: ICMP, family: &str) -> Option<Client> {
    let config = Config::builder().kind(kind).build();
    match Client::new(&config) {
        Ok(client) => Some(client),
        Err(e) => {
            tracing::warn!(family, error = %e, "Failed to open ICMP client");
            None
        }
    }
}
