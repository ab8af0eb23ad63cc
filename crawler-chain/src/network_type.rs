//! Network classification for crawler addresses.

use std::fmt;

/// The kind of network a peer [`Address`](crate::Address) lives on.
///
/// Classification is syntactic: it is derived once from the host string at
/// construction time, the same way the original crawler memoizes
/// `Address.type` as a cached property.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
#[cfg_attr(any(test, feature = "proptest-impl"), derive(proptest_derive::Arbitrary))]
pub enum NetworkType {
    Ipv4,
    Ipv6,
    OnionV2,
    OnionV3,
    I2p,
    Cjdns,
    Unknown,
}

impl NetworkType {
    /// All network types that the addr-data log and crawler statistics break
    /// advertised addresses down by, in BIP-155-ish `net_id` order.
    ///
    /// `Unknown` is deliberately excluded: it is a classification outcome for
    /// addresses we can't dial, not a wire network id.
    pub const ALL: [NetworkType; 6] = [
        NetworkType::Ipv4,
        NetworkType::Ipv6,
        NetworkType::OnionV2,
        NetworkType::OnionV3,
        NetworkType::I2p,
        NetworkType::Cjdns,
    ];

    /// Classify a host string.
    ///
    /// Mirrors `Address.type` in the original Python crawler: CJDNS is
    /// distinguished from plain IPv6 purely by the `fc` prefix (CJDNS
    /// addresses live in the `fc00::/8` ULA range), so the CJDNS check must
    /// run before the generic "contains a colon" IPv6 check.
    pub fn classify(host: &str) -> NetworkType {
        let lower = host.to_ascii_lowercase();
        if host.contains(':') && lower.starts_with("fc") {
            return NetworkType::Cjdns;
        }
        if host.contains(':') {
            return NetworkType::Ipv6;
        }
        if host.ends_with(".onion") && host.len() == 22 {
            return NetworkType::OnionV2;
        }
        if host.ends_with(".onion") && host.len() == 62 {
            return NetworkType::OnionV3;
        }
        if host.ends_with(".b32.i2p") && host.len() == 60 {
            return NetworkType::I2p;
        }
        if is_dotted_ipv4(host) {
            return NetworkType::Ipv4;
        }
        NetworkType::Unknown
    }

    /// The index used by the addr-data log's `net_id` field (§4.7) and by
    /// BIP-155 address-type decoding (§4.1), where applicable.
    pub fn addr_data_index(self) -> Option<u8> {
        NetworkType::ALL.iter().position(|n| *n == self).map(|i| i as u8)
    }

    pub fn from_addr_data_index(index: u8) -> Option<NetworkType> {
        NetworkType::ALL.get(index as usize).copied()
    }

    /// True for networks dialed as a direct IP connection: IPv4/IPv6/CJDNS
    /// dials are all attempted as plain IP (§7).
    pub fn dials_as_ip(self) -> bool {
        matches!(self, NetworkType::Ipv4 | NetworkType::Ipv6 | NetworkType::Cjdns)
    }

    pub fn is_onion(self) -> bool {
        matches!(self, NetworkType::OnionV2 | NetworkType::OnionV3)
    }

    pub fn is_i2p(self) -> bool {
        matches!(self, NetworkType::I2p)
    }
}

fn is_dotted_ipv4(host: &str) -> bool {
    let octets: Vec<&str> = host.split('.').collect();
    if octets.len() != 4 {
        return false;
    }
    octets.iter().all(|o| matches!(o.parse::<u16>(), Ok(v) if v < 256))
}

impl fmt::Display for NetworkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NetworkType::Ipv4 => "ipv4",
            NetworkType::Ipv6 => "ipv6",
            NetworkType::OnionV2 => "onion_v2",
            NetworkType::OnionV3 => "onion_v3",
            NetworkType::I2p => "i2p",
            NetworkType::Cjdns => "cjdns",
            NetworkType::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_ipv4() {
        assert_eq!(NetworkType::classify("203.0.113.1"), NetworkType::Ipv4);
    }

    #[test]
    fn classifies_ipv6() {
        assert_eq!(NetworkType::classify("2001:db8::1"), NetworkType::Ipv6);
    }

    #[test]
    fn classifies_cjdns_by_fc_prefix() {
        assert_eq!(NetworkType::classify("fc00::1"), NetworkType::Cjdns);
        assert_eq!(NetworkType::classify("FC00::1"), NetworkType::Cjdns);
    }

    #[test]
    fn classifies_onion_by_length() {
        let v2 = "aaaaaaaaaaaaaaaa.onion";
        assert_eq!(v2.len(), 22);
        assert_eq!(NetworkType::classify(v2), NetworkType::OnionV2);

        let v3 = format!("{}.onion", "a".repeat(56));
        assert_eq!(v3.len(), 62);
        assert_eq!(NetworkType::classify(&v3), NetworkType::OnionV3);
    }

    #[test]
    fn classifies_i2p_by_length() {
        let host = format!("{}.b32.i2p", "a".repeat(52));
        assert_eq!(host.len(), 60);
        assert_eq!(NetworkType::classify(&host), NetworkType::I2p);
    }

    #[test]
    fn unknown_for_garbage() {
        assert_eq!(NetworkType::classify("not-an-address"), NetworkType::Unknown);
    }

    #[test]
    fn rejects_out_of_range_octets() {
        assert_eq!(NetworkType::classify("999.0.0.1"), NetworkType::Unknown);
    }
}
