//! BIP-155 `addrv2` network ids and host<->wire-bytes conversion.
//!
//! [BIP-155](https://github.com/bitcoin/bips/blob/master/bip-0155.mediawiki)
//! defines a `(net_id, addr_bytes)` pair per advertised address; this module
//! converts between that wire form and the plain host string `Address`
//! stores, matching `original_source/protocol.py`'s `decode_address` /
//! `encode_address` functions exactly (including the Tor v3 onion checksum
//! and I2P/Tor base32 host encoding).

use data_encoding::{Encoding, Specification};
use sha3::{Digest, Sha3_256};
use std::net::{Ipv4Addr, Ipv6Addr};
use thiserror::Error;

use crate::network_type::NetworkType;

/// BIP-155 `net_id` values, as assigned in the BIP.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum NetId {
    Ipv4 = 1,
    Ipv6 = 2,
    TorV2 = 3,
    TorV3 = 4,
    I2p = 5,
    Cjdns = 6,
}

impl NetId {
    pub fn from_u8(id: u8) -> Option<NetId> {
        match id {
            1 => Some(NetId::Ipv4),
            2 => Some(NetId::Ipv6),
            3 => Some(NetId::TorV2),
            4 => Some(NetId::TorV3),
            5 => Some(NetId::I2p),
            6 => Some(NetId::Cjdns),
            _ => None,
        }
    }

    pub fn expected_len(self) -> usize {
        match self {
            NetId::Ipv4 => 4,
            NetId::Ipv6 => 16,
            NetId::TorV2 => 10,
            NetId::TorV3 => 32,
            NetId::I2p => 32,
            NetId::Cjdns => 16,
        }
    }
}

#[derive(Debug, Error)]
pub enum Bip155Error {
    #[error("unknown BIP-155 net_id: {0}")]
    UnknownNetId(u8),
    #[error("net_id {net_id:?} expects {expected} address bytes, got {actual}")]
    WrongLength { net_id: NetId, expected: usize, actual: usize },
    #[error("host is not addressable under BIP-155: {0:?}")]
    UnsupportedHost(String),
}

fn base32() -> Encoding {
    let mut spec = Specification::new();
    spec.symbols.push_str("abcdefghijklmnopqrstuvwxyz234567");
    spec.encoding().expect("static base32 spec is valid")
}

/// Tor v3 onion checksum: `SHA3-256(".onion checksum" || pubkey || 0x03)[..2]`.
fn torv3_checksum(pubkey: &[u8; 32]) -> [u8; 2] {
    let mut hasher = Sha3_256::new();
    hasher.update(b".onion checksum");
    hasher.update(pubkey);
    hasher.update([0x03]);
    let digest = hasher.finalize();
    [digest[0], digest[1]]
}

/// Decode a `(net_id, addr_bytes)` pair into the host string an `Address`
/// would carry.
pub fn decode_address(net_id: u8, bytes: &[u8]) -> Result<String, Bip155Error> {
    let net_id = NetId::from_u8(net_id).ok_or(Bip155Error::UnknownNetId(net_id))?;
    if bytes.len() != net_id.expected_len() {
        return Err(Bip155Error::WrongLength {
            net_id,
            expected: net_id.expected_len(),
            actual: bytes.len(),
        });
    }
    match net_id {
        NetId::Ipv4 => {
            let octets: [u8; 4] = bytes.try_into().unwrap();
            Ok(Ipv4Addr::from(octets).to_string())
        }
        NetId::Ipv6 => {
            let octets: [u8; 16] = bytes.try_into().unwrap();
            let ip = Ipv6Addr::from(octets);
            match ip.to_ipv4_mapped() {
                Some(v4) => Ok(v4.to_string()),
                None => Ok(ip.to_string()),
            }
        }
        NetId::Cjdns => {
            let octets: [u8; 16] = bytes.try_into().unwrap();
            Ok(Ipv6Addr::from(octets).to_string())
        }
        NetId::TorV2 => {
            let encoded = base32().encode(bytes);
            Ok(format!("{}.onion", encoded))
        }
        NetId::TorV3 => {
            let pubkey: [u8; 32] = bytes.try_into().unwrap();
            let checksum = torv3_checksum(&pubkey);
            let mut payload = Vec::with_capacity(35);
            payload.extend_from_slice(&pubkey);
            payload.extend_from_slice(&checksum);
            payload.push(0x03);
            let encoded = base32().encode(&payload);
            Ok(format!("{}.onion", encoded))
        }
        NetId::I2p => {
            let encoded = base32().encode(bytes);
            Ok(format!("{}.b32.i2p", encoded))
        }
    }
}

/// Encode a host string back to its `(net_id, addr_bytes)` wire form, the
/// inverse of [`decode_address`]. Returns `None` for [`NetworkType::Unknown`]
/// hosts, which BIP-155 has no representation for.
pub fn encode_address(host: &str) -> Result<(u8, Vec<u8>), Bip155Error> {
    match NetworkType::classify(host) {
        NetworkType::Ipv4 => {
            let ip: Ipv4Addr = host.parse().map_err(|_| Bip155Error::UnsupportedHost(host.to_owned()))?;
            Ok((NetId::Ipv4 as u8, ip.octets().to_vec()))
        }
        NetworkType::Ipv6 => {
            let ip: Ipv6Addr = host.parse().map_err(|_| Bip155Error::UnsupportedHost(host.to_owned()))?;
            Ok((NetId::Ipv6 as u8, ip.octets().to_vec()))
        }
        NetworkType::Cjdns => {
            let ip: Ipv6Addr = host.parse().map_err(|_| Bip155Error::UnsupportedHost(host.to_owned()))?;
            Ok((NetId::Cjdns as u8, ip.octets().to_vec()))
        }
        NetworkType::OnionV2 => {
            let label = host.strip_suffix(".onion").unwrap_or(host);
            let bytes = base32()
                .decode(label.to_ascii_lowercase().as_bytes())
                .map_err(|_| Bip155Error::UnsupportedHost(host.to_owned()))?;
            Ok((NetId::TorV2 as u8, bytes))
        }
        NetworkType::OnionV3 => {
            let label = host.strip_suffix(".onion").unwrap_or(host);
            let payload = base32()
                .decode(label.to_ascii_lowercase().as_bytes())
                .map_err(|_| Bip155Error::UnsupportedHost(host.to_owned()))?;
            if payload.len() != 35 {
                return Err(Bip155Error::UnsupportedHost(host.to_owned()));
            }
            Ok((NetId::TorV3 as u8, payload[..32].to_vec()))
        }
        NetworkType::I2p => {
            let label = host.strip_suffix(".b32.i2p").unwrap_or(host);
            let bytes = base32()
                .decode(label.to_ascii_lowercase().as_bytes())
                .map_err(|_| Bip155Error::UnsupportedHost(host.to_owned()))?;
            Ok((NetId::I2p as u8, bytes))
        }
        NetworkType::Unknown => Err(Bip155Error::UnsupportedHost(host.to_owned())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_ipv4() {
        let (net_id, bytes) = encode_address("203.0.113.7").unwrap();
        assert_eq!(net_id, NetId::Ipv4 as u8);
        assert_eq!(decode_address(net_id, &bytes).unwrap(), "203.0.113.7");
    }

    #[test]
    fn round_trips_ipv6() {
        let (net_id, bytes) = encode_address("2001:db8::1").unwrap();
        assert_eq!(net_id, NetId::Ipv6 as u8);
        assert_eq!(decode_address(net_id, &bytes).unwrap(), "2001:db8::1");
    }

    #[test]
    fn round_trips_torv3() {
        let pubkey = [7u8; 32];
        let checksum = torv3_checksum(&pubkey);
        let mut payload = Vec::new();
        payload.extend_from_slice(&pubkey);
        payload.extend_from_slice(&checksum);
        payload.push(0x03);
        let host = format!("{}.onion", base32().encode(&payload));
        assert_eq!(host.len(), 62);

        let (net_id, bytes) = encode_address(&host).unwrap();
        assert_eq!(net_id, NetId::TorV3 as u8);
        assert_eq!(bytes, pubkey.to_vec());
        assert_eq!(decode_address(net_id, &bytes).unwrap(), host);
    }

    #[test]
    fn decode_collapses_ipv4_mapped_ipv6() {
        let mapped = Ipv4Addr::new(203, 0, 113, 7).to_ipv6_mapped();
        let host = decode_address(NetId::Ipv6 as u8, &mapped.octets()).unwrap();
        assert_eq!(host, "203.0.113.7");
    }

    #[test]
    fn rejects_wrong_length() {
        let err = decode_address(NetId::Ipv4 as u8, &[1, 2, 3]).unwrap_err();
        assert!(matches!(err, Bip155Error::WrongLength { .. }));
    }

    #[test]
    fn rejects_unknown_net_id() {
        assert!(matches!(decode_address(99, &[]), Err(Bip155Error::UnknownNetId(99))));
    }
}
