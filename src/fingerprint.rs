//! Device fingerprinting and client classification.

use std::net::{IpAddr, SocketAddr};

use ipnet::IpNet;
use sha2::{Digest, Sha256};

use crate::hex;

/// Returned when no geo source resolved a country for the client.
pub const UNKNOWN_COUNTRY: &str = "UNKNOWN";

/// User-agent substrings that indicate automation rather than a real device.
const SUSPICIOUS_USER_AGENTS: &[&str] = &[
    "bot",
    "crawler",
    "spider",
    "scraper",
    "curl",
    "wget",
    "python",
    "go-http-client",
    "axios",
    "postman",
    "insomnia",
];

/// CIDR ranges treated as anonymized (Tor/VPN/proxy) when no external
/// reputation source is configured.
const DEFAULT_ANONYMIZED_CIDRS: &[&str] = &["10.0.0.0/8", "172.16.0.0/12", "192.168.0.0/16"];

/// Normalized request attributes and their stable hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceFingerprint {
    pub ip: String,
    pub user_agent: String,
    pub accept_language: String,
    pub accept_encoding: String,
    pub screen_resolution: String,
    pub timezone: String,

    /// Lowercase hex SHA-256 over the `|`-joined normalized fields.
    pub hash: String,
}

/// Builds [`DeviceFingerprint`]s and classifies clients.
#[derive(Debug, Clone)]
pub struct FingerprintGenerator {
    anonymized_ranges: Vec<IpNet>,
}

impl Default for FingerprintGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl FingerprintGenerator {
    #[must_use]
    pub fn new() -> Self {
        Self {
            anonymized_ranges: DEFAULT_ANONYMIZED_CIDRS
                .iter()
                .map(|cidr| cidr.parse().expect("static CIDR literals parse"))
                .collect(),
        }
    }

    /// Use an operator-provided CIDR list instead of the built-in ranges.
    #[must_use]
    pub fn with_anonymized_ranges(anonymized_ranges: Vec<IpNet>) -> Self {
        Self { anonymized_ranges }
    }

    /// Build a fingerprint from normalized request attributes.
    #[must_use]
    pub fn generate(
        &self,
        ip: &str,
        user_agent: &str,
        accept_language: &str,
        accept_encoding: &str,
        screen_resolution: &str,
        timezone: &str,
    ) -> DeviceFingerprint {
        let ip = normalize_ip(ip);
        let user_agent = user_agent.trim().to_owned();
        let accept_language = accept_language.trim().to_owned();
        let accept_encoding = accept_encoding.trim().to_owned();
        let screen_resolution = screen_resolution.trim().to_owned();
        let timezone = timezone.trim().to_owned();

        let canonical = format!(
            "{ip}|{user_agent}|{accept_language}|{accept_encoding}|{screen_resolution}|{timezone}"
        );

        let hash = hex::encode(&Sha256::digest(canonical.as_bytes()));

        DeviceFingerprint {
            ip,
            user_agent,
            accept_language,
            accept_encoding,
            screen_resolution,
            timezone,
            hash,
        }
    }

    /// Case-insensitive match against the automation dictionary.
    #[must_use]
    pub fn is_suspicious_user_agent(&self, user_agent: &str) -> bool {
        let user_agent = user_agent.to_lowercase();

        SUSPICIOUS_USER_AGENTS
            .iter()
            .any(|pattern| user_agent.contains(pattern))
    }

    /// Membership check against the configured anonymized CIDR list.
    #[must_use]
    pub fn is_tor_or_vpn(&self, ip: &str) -> bool {
        let Ok(parsed) = normalize_ip(ip).parse::<IpAddr>() else {
            return false;
        };

        self.anonymized_ranges
            .iter()
            .any(|range| range.contains(&parsed))
    }
}

/// Strip an optional port and canonicalize the address form. Unparseable
/// input is returned trimmed rather than rejected.
fn normalize_ip(ip: &str) -> String {
    let ip = ip.trim();

    if let Ok(addr) = ip.parse::<SocketAddr>() {
        return addr.ip().to_string();
    }

    if let Ok(addr) = ip.parse::<IpAddr>() {
        return addr.to_string();
    }

    ip.to_owned()
}
