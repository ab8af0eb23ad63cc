//! The mutable per-session record the frontier and engine pass around.
//!
//! Kept in this crate rather than `crawler-network` (which owns the I/O
//! that populates [`NodeStats`]) because identity and equality only ever
//! depend on [`Address`], a pure data type with no transport dependency.

use std::{fmt, hash::Hash, hash::Hasher};

use crate::address::Address;
use crate::network_type::NetworkType;

/// Per-network-type counts of addresses returned by a `get_peer_addrs` call.
///
/// Indexed the same way as [`NetworkType::ALL`] / [`NetworkType::addr_data_index`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AdvertisedAddrCounts([u32; NetworkType::ALL.len()]);

impl AdvertisedAddrCounts {
    pub fn count(&self, network_type: NetworkType) -> u32 {
        network_type.addr_data_index().map(|i| self.0[i as usize]).unwrap_or(0)
    }

    pub fn increment(&mut self, network_type: NetworkType) {
        if let Some(i) = network_type.addr_data_index() {
            self.0[i as usize] += 1;
        }
    }

    pub fn total(&self) -> u32 {
        self.0.iter().sum()
    }
}

/// Statistics accumulated during one node's `connect`/`handshake`/
/// `get_peer_addrs` lifecycle (§4.3), matching the relevant-stats subset
/// `node.py::get_stats` exposes (excluding fields the original calls out as
/// not worth keeping: our own `version` message fields, the handshake
/// nonce, and `handshake_successful`, which is always true for a reachable
/// node).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NodeStats {
    pub time_connect_ms: Option<i64>,
    pub handshake_attempts: u32,
    pub handshake_timestamp: Option<i64>,
    pub handshake_duration_ms: Option<i64>,
    pub version: Option<i32>,
    pub services: Option<u64>,
    pub version_reply_timestamp_remote: Option<i64>,
    pub user_agent: Option<String>,
    pub latest_block: Option<i32>,
    pub relay: Option<bool>,
    pub requested_addrs: bool,
    pub advertised_addrs: AdvertisedAddrCounts,
}

/// A node discovered at some distance from a DNS seed.
///
/// Equality and hashing delegate entirely to [`Address`] (§3: "Equality and
/// hash delegate to `address`"), so a `Node` can sit in the frontier's
/// `HashSet`-based work sets while its `stats` are filled in over the
/// course of a crawl.
#[derive(Clone, Debug)]
pub struct Node {
    pub address: Address,
    pub seed_distance: u32,
    pub stats: NodeStats,
}

impl Node {
    pub fn new(address: Address, seed_distance: u32) -> Node {
        Node { address, seed_distance, stats: NodeStats::default() }
    }

    /// §4.5 `retry_or_terminal`: whether another handshake attempt is
    /// allowed under the given budget.
    pub fn has_handshake_attempts_left(&self, max_attempts: u32) -> bool {
        self.stats.handshake_attempts < max_attempts
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}

impl Eq for Node {}

impl Hash for Node {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.address.hash(state);
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.address, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_and_hash_delegate_to_address() {
        let mut a = Node::new(Address::new("1.2.3.4", 8333, 0), 0);
        let b = Node::new(Address::new("1.2.3.4", 8333, 100), 3);
        a.stats.handshake_attempts = 2;
        assert_eq!(a, b);

        let mut set = std::collections::HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn handshake_attempts_budget() {
        let mut node = Node::new(Address::new("1.2.3.4", 8333, 0), 0);
        assert!(node.has_handshake_attempts_left(3));
        node.stats.handshake_attempts = 3;
        assert!(!node.has_handshake_attempts_left(3));
    }

    #[test]
    fn advertised_addr_counts_track_totals() {
        let mut counts = AdvertisedAddrCounts::default();
        counts.increment(NetworkType::Ipv4);
        counts.increment(NetworkType::Ipv4);
        counts.increment(NetworkType::OnionV3);
        assert_eq!(counts.count(NetworkType::Ipv4), 2);
        assert_eq!(counts.count(NetworkType::OnionV3), 1);
        assert_eq!(counts.total(), 3);
    }
}
