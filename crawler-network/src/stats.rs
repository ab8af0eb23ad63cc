//! Run-level statistics (§3 `AddressStats`, §6 `crawler_stats.json`).
//!
//! Carried in `crawler-network` rather than `crawlerd` because the engine
//! updates both counters as it runs; `crawlerd::output` only reads the
//! finished snapshot.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crawler_chain::Address;

/// Per-advertised-address age/timestamp observations, recorded once per
/// `addr`/`addrv2` entry seen across the whole run (optional, `--record-addr-stats`).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AddressStats {
    /// `now - last_seen` at the moment each observation was recorded.
    pub seen_by_age: Vec<i64>,
    pub seen_by_timestamp: Vec<i64>,
}

/// Run-wide counters, updated concurrently by every worker.
///
/// `num_processed_nodes` is a plain `AtomicU64` (§5: "atomically incremented
/// by workers"); `address_stats` is behind its own mutex since it is only
/// touched when `--record-addr-stats` is set and contention there is
/// immaterial to the hot path.
#[derive(Default)]
pub struct CrawlerStatistics {
    num_processed_nodes: AtomicU64,
    address_stats: Mutex<HashMap<Address, AddressStats>>,
}

impl CrawlerStatistics {
    pub fn new() -> CrawlerStatistics {
        CrawlerStatistics::default()
    }

    pub fn record_processed_node(&self) {
        self.num_processed_nodes.fetch_add(1, Ordering::Relaxed);
        metrics::increment_counter!("crawler_nodes_processed_total");
    }

    pub fn num_processed_nodes(&self) -> u64 {
        self.num_processed_nodes.load(Ordering::Relaxed)
    }

    /// Record one `(age, timestamp)` observation for `addr`, keyed by its
    /// `(host, port)` identity (timestamp-insensitive, per `Address` equality).
    pub fn record_address_observation(&self, addr: Address, now: i64) {
        let mut stats = self.address_stats.lock().expect("address_stats mutex poisoned");
        let entry = stats.entry(addr.clone()).or_default();
        entry.seen_by_age.push(now - addr.last_seen());
        entry.seen_by_timestamp.push(addr.last_seen());
    }

    pub fn address_stats_snapshot(&self) -> HashMap<Address, AddressStats> {
        self.address_stats.lock().expect("address_stats mutex poisoned").clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn processed_count_is_atomic_and_monotonic() {
        let stats = CrawlerStatistics::new();
        for _ in 0..5 {
            stats.record_processed_node();
        }
        assert_eq!(stats.num_processed_nodes(), 5);
    }

    #[test]
    fn address_stats_accumulate_per_address() {
        let stats = CrawlerStatistics::new();
        let addr = Address::new("1.2.3.4", 8333, 900);
        stats.record_address_observation(addr.clone(), 1000);
        stats.record_address_observation(addr.clone(), 1100);

        let snapshot = stats.address_stats_snapshot();
        let entry = &snapshot[&addr];
        assert_eq!(entry.seen_by_age, vec![100, 200]);
        assert_eq!(entry.seen_by_timestamp, vec![900, 900]);
    }
}
