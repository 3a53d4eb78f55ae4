//! Banner grabbing and service classification for open ports.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use rackd_core::{Protocol, ServiceInfo};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Ports that only talk after a request; they get a bare HTTP GET.
pub const HTTP_PORTS: &[u16] = &[80, 8000, 8008, 8080, 8888];

const HTTP_TRIGGER: &[u8] = b"GET / HTTP/1.0\r\n\r\n";
const MAX_BANNER_BYTES: u64 = 1024;

// Checked in order against the upper-cased banner.
const BANNER_TOKENS: &[(&str, &str)] = &[
    ("SSH", "SSH"),
    ("FTP", "FTP"),
    ("HTTP", "HTTP"),
    ("SMTP", "SMTP"),
    ("MYSQL", "MySQL"),
    ("POSTGRESQL", "PostgreSQL"),
];

const UNKNOWN_SERVICE: &str = "unknown";

/// Well-known service name for a port.
pub fn service_for_port(port: u16) -> Option<&'static str> {
    let name = match port {
        21 => "FTP",
        22 => "SSH",
        23 => "Telnet",
        25 => "SMTP",
        53 => "DNS",
        80 => "HTTP",
        110 => "POP3",
        143 => "IMAP",
        443 => "HTTPS",
        3306 => "MySQL",
        3389 => "RDP",
        5432 => "PostgreSQL",
        5900 => "VNC",
        6379 => "Redis",
        8080 => "HTTP-Alt",
        27017 => "MongoDB",
        _ => return None,
    };
    Some(name)
}

/// Service name from a banner, falling back to the port table.
pub fn classify(banner: Option<&str>, port: u16) -> String {
    if let Some(banner) = banner {
        let upper = banner.to_uppercase();
        if let Some((_, name)) = BANNER_TOKENS.iter().find(|(token, _)| upper.contains(token)) {
            return (*name).to_string();
        }
    }
    service_for_port(port)
        .unwrap_or(UNKNOWN_SERVICE)
        .to_string()
}

/// The word following the first version marker, if any.
///
/// A marker is a word containing `version` or starting with `v`, ignoring
/// case and leading punctuation: `"220 (vsFTPd 3.0.3)"` yields `3.0.3`.
pub fn parse_version(banner: &str) -> Option<String> {
    let words: Vec<&str> = banner.split_whitespace().collect();
    words.windows(2).find_map(|pair| {
        if !is_version_marker(pair[0]) {
            return None;
        }
        let version = trim_punctuation(pair[1]);
        (!version.is_empty()).then(|| version.to_string())
    })
}

fn is_version_marker(word: &str) -> bool {
    let word = trim_punctuation(word).to_lowercase();
    word.starts_with('v') || word.contains("version")
}

fn trim_punctuation(word: &str) -> &str {
    word.trim_matches(|c: char| !c.is_alphanumeric())
}

pub struct ServiceProber {
    connect_timeout: Duration,
    read_timeout: Duration,
}

impl ServiceProber {
    pub fn new(connect_timeout: Duration, read_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            read_timeout,
        }
    }

    /// Probe each open port in turn.
    pub async fn detect(&self, ip: IpAddr, ports: &[u16]) -> Vec<ServiceInfo> {
        let mut services = Vec::with_capacity(ports.len());
        for &port in ports {
            if let Some(info) = self.probe(ip, port).await {
                services.push(info);
            }
        }
        services
    }

    /// Connect to one port and classify whatever it says.
    ///
    /// `None` when the port can no longer be reached.
    pub async fn probe(&self, ip: IpAddr, port: u16) -> Option<ServiceInfo> {
        let addr = SocketAddr::new(ip, port);
        let stream = match timeout(self.connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                tracing::trace!(%addr, error = %e, "Service connect refused");
                return None;
            }
            Err(_) => {
                tracing::trace!(%addr, "Service connect timed out");
                return None;
            }
        };

        let banner = self.grab_banner(stream, port).await;
        let service = classify(banner.as_deref(), port);
        let version = banner.as_deref().and_then(parse_version);
        tracing::debug!(%addr, service = %service, ?version, "Service identified");

        Some(ServiceInfo {
            port,
            protocol: Protocol::Tcp,
            banner,
            service,
            version,
        })
    }

    async fn grab_banner(&self, mut stream: TcpStream, port: u16) -> Option<String> {
        if HTTP_PORTS.contains(&port) {
            if let Err(e) = stream.write_all(HTTP_TRIGGER).await {
                tracing::trace!(port, error = %e, "HTTP trigger write failed");
                return None;
            }
        }

        let mut reader = BufReader::new(stream).take(MAX_BANNER_BYTES);
        let mut buf = Vec::new();
        match timeout(self.read_timeout, reader.read_until(b'\n', &mut buf)).await {
            Ok(Ok(n)) if n > 0 => clean_banner(&buf),
            _ => None,
        }
    }
}

fn clean_banner(raw: &[u8]) -> Option<String> {
    let text: String = String::from_utf8_lossy(raw)
        .chars()
        .filter(|c| !c.is_control())
        .collect();
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}
