//! An address-with-metadata type used by the crawler.
//!
//! [Bitcoin reference](https://en.bitcoin.it/wiki/Protocol_documentation#Network_address)

use std::{fmt, hash::Hash, hash::Hasher, str::FromStr};

use thiserror::Error;

use crate::network_type::NetworkType;

/// An immutable `(host, port, last_seen)` triple identifying a peer.
///
/// Equality and hashing only consider `(host, port)`: a fresher advertisement
/// for the same endpoint is the same entity, just with updated metadata. The
/// network type is classified once at construction time and cached in the
/// `network_type` field rather than recomputed on every access.
#[derive(Clone, Debug)]
pub struct Address {
    host: String,
    port: u16,
    last_seen: i64,
    network_type: NetworkType,
}

#[derive(Debug, Error)]
pub enum AddressParseError {
    #[error("address string has no port: {0:?}")]
    MissingPort(String),
    #[error("address string has an invalid port: {0:?}")]
    InvalidPort(String),
}

impl Address {
    pub fn new(host: impl Into<String>, port: u16, last_seen: i64) -> Address {
        let host = host.into();
        let network_type = NetworkType::classify(&host);
        Address { host, port, last_seen, network_type }
    }

    /// Construct an address stamped with the current time, as the crawler
    /// does for DNS-seeded and freshly-gossiped addresses.
    pub fn now(host: impl Into<String>, port: u16) -> Address {
        Address::new(host, port, now_unix())
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn last_seen(&self) -> i64 {
        self.last_seen
    }

    pub fn network_type(&self) -> NetworkType {
        self.network_type
    }

    /// A copy of this address with a different `last_seen`. Used when an
    /// address is re-advertised with a fresher timestamp; identity
    /// (`host`/`port`) is unchanged so set membership is unaffected.
    pub fn with_last_seen(&self, last_seen: i64) -> Address {
        Address { last_seen, ..self.clone() }
    }
}

impl PartialEq for Address {
    fn eq(&self, other: &Self) -> bool {
        self.host == other.host && self.port == other.port
    }
}

impl Eq for Address {}

impl Hash for Address {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.host.hash(state);
        self.port.hash(state);
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for Address {
    type Err = AddressParseError;

    /// Parse the `Display` form back into an `Address`, used to read the
    /// reachable-node history file back off disk.
    ///
    /// The reconstructed address carries `last_seen = now`; the history
    /// store tracks `retries_left` itself and does not rely on timestamps.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(rest) = s.strip_prefix('[') {
            let (host, port) = rest
                .split_once("]:")
                .ok_or_else(|| AddressParseError::MissingPort(s.to_owned()))?;
            let port = port
                .parse()
                .map_err(|_| AddressParseError::InvalidPort(s.to_owned()))?;
            Ok(Address::now(host, port))
        } else {
            let (host, port) = s
                .rsplit_once(':')
                .ok_or_else(|| AddressParseError::MissingPort(s.to_owned()))?;
            let port = port
                .parse()
                .map_err(|_| AddressParseError::InvalidPort(s.to_owned()))?;
            Ok(Address::now(host, port))
        }
    }
}

/// Current Unix timestamp, used whenever a fresh [`Address`] or stat needs
/// "now". The one place this crate reaches for a wall clock.
pub fn now_unix() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_ignores_last_seen() {
        let a = Address::new("1.2.3.4", 8333, 100);
        let b = Address::new("1.2.3.4", 8333, 200);
        assert_eq!(a, b);

        let mut hasher_a = std::collections::hash_map::DefaultHasher::new();
        a.hash(&mut hasher_a);
        let mut hasher_b = std::collections::hash_map::DefaultHasher::new();
        b.hash(&mut hasher_b);
        assert_eq!(hasher_a.finish(), hasher_b.finish());
    }

    #[test]
    fn display_wraps_ipv6_in_brackets() {
        let a = Address::new("2001:db8::1", 8333, 0);
        assert_eq!(a.to_string(), "[2001:db8::1]:8333");
        assert_eq!(a.network_type(), NetworkType::Ipv6);
    }

    #[test]
    fn display_plain_for_ipv4() {
        let a = Address::new("1.2.3.4", 8333, 0);
        assert_eq!(a.to_string(), "1.2.3.4:8333");
    }

    #[test]
    fn cjdns_address_types_as_cjdns() {
        let a = Address::new("fc00::1", 8333, 0);
        assert_eq!(a.network_type(), crate::NetworkType::Cjdns);
    }

    #[test]
    fn onion_v3_by_length() {
        let host = format!("{}.onion", "a".repeat(56));
        let a = Address::new(host, 8333, 0);
        assert_eq!(a.network_type(), crate::NetworkType::OnionV3);
    }

    #[test]
    fn round_trips_through_display_and_from_str() {
        let a = Address::new("2001:db8::1", 8333, 42);
        let parsed: Address = a.to_string().parse().unwrap();
        assert_eq!(a, parsed);

        let a = Address::new("1.2.3.4", 8333, 42);
        let parsed: Address = a.to_string().parse().unwrap();
        assert_eq!(a, parsed);
    }
}
