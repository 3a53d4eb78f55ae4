//! OS heuristics and the confidence score attached to each device.

use rackd_core::ServiceInfo;

use crate::pipeline::HostEvidence;

const WINDOWS_PORTS: &[u16] = &[135, 139, 445, 3389];
const LINUX_PORTS: &[u16] = &[22, 111, 2049];
const UNIX_PORTS: &[u16] = &[22, 111];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsFamily {
    Windows,
    Unix,
    Unknown,
}

impl OsFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Windows => "Windows",
            Self::Unix => "Unix",
            Self::Unknown => "Unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OsGuess {
    pub os: &'static str,
    pub family: OsFamily,
}

impl OsGuess {
    pub const UNKNOWN: OsGuess = OsGuess {
        os: "Unknown",
        family: OsFamily::Unknown,
    };

    pub fn is_known(&self) -> bool {
        self.family != OsFamily::Unknown
    }
}

/// Guess the operating system from open ports, then from service names.
pub fn guess_os(open_ports: &[u16], services: &[ServiceInfo]) -> OsGuess {
    let any_of = |set: &[u16]| open_ports.iter().any(|p| set.contains(p));
    let windows = any_of(WINDOWS_PORTS);
    let linux = any_of(LINUX_PORTS);
    let unix = any_of(UNIX_PORTS);

    let by_ports = if windows && !linux {
        OsGuess {
            os: "Windows",
            family: OsFamily::Windows,
        }
    } else if linux && !windows {
        OsGuess {
            os: "Linux",
            family: OsFamily::Unix,
        }
    } else if unix {
        OsGuess {
            os: "Unix-like",
            family: OsFamily::Unix,
        }
    } else {
        OsGuess::UNKNOWN
    };

    if by_ports.is_known() {
        return by_ports;
    }

    if services.iter().any(|s| s.service == "SSH") {
        return OsGuess {
            os: "Linux/Unix",
            family: OsFamily::Unix,
        };
    }
    OsGuess::UNKNOWN
}

/// 50 for being seen at all, plus 20 for a MAC, 15 for a hostname, 10 for
/// open ports and 5 for an OS guess. Capped at 100.
pub fn confidence(evidence: &HostEvidence) -> u8 {
    let mut score: u8 = 50;
    if evidence.mac_address.is_some() {
        score += 20;
    }
    if evidence.hostname.is_some() {
        score += 15;
    }
    if !evidence.open_ports.is_empty() {
        score += 10;
    }
    if evidence.os.is_some() {
        score += 5;
    }
    score.min(100)
}
