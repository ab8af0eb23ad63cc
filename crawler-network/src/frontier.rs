//! The frontier (§4.5): the shared work-set state machine that hands nodes
//! to workers and tracks wave-by-seed-distance progress.
//!
//! Modeled as one `Mutex`-guarded struct rather than per-set locks, per §9
//! ("avoid per-set locks (invariant spans sets)"). Every operation below
//! takes the lock for its whole duration, so the disjointness invariant
//! (§3, §8) never observes a half-applied transition.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use rand::seq::IteratorRandom;
use tokio::sync::Mutex;
use tokio::time::sleep;

use crawler_chain::{Address, Node};

use crate::constants::FRONTIER_POLL_INTERVAL;

#[derive(Default)]
struct FrontierState {
    nodes_by_seed: HashMap<String, Vec<Node>>,
    pending: HashSet<Node>,
    next: HashSet<Node>,
    processing: HashSet<Node>,
    reachable: HashSet<Node>,
    unreachable: HashSet<Node>,
}

/// The six node sets plus their provenance log, guarded by a single lock.
pub struct Frontier {
    state: Mutex<FrontierState>,
}

/// A point-in-time snapshot of set sizes, used by the monitor loop (§4.6)
/// and the final crawler-statistics artifact (§6).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrontierCounts {
    pub reachable: usize,
    pub unreachable: usize,
    pub pending: usize,
    pub next: usize,
    pub processing: usize,
}

impl Default for Frontier {
    fn default() -> Self {
        Frontier { state: Mutex::new(FrontierState::default()) }
    }
}

impl Frontier {
    pub fn new() -> Frontier {
        Frontier::default()
    }

    /// §4.5 `init`. Populates `nodes_by_seed` and seeds `pending` with the
    /// union of every seed's addresses, each as a wave-0 node.
    pub async fn init(&self, addrs_by_seed: HashMap<String, Vec<Address>>) {
        let mut state = self.state.lock().await;
        for (seed, addrs) in addrs_by_seed {
            let nodes: Vec<Node> = addrs.into_iter().map(|addr| Node::new(addr, 0)).collect();
            state.pending.extend(nodes.iter().cloned());
            state.nodes_by_seed.insert(seed, nodes);
        }
        tracing::debug!(pending = state.pending.len(), "pending nodes initialized from DNS seeds");
    }

    /// Merge historical nodes (§4.8, seed-distance [`crate::constants::HISTORY_SEED_DISTANCE`])
    /// into `pending`, for the engine's optional second pass.
    pub async fn merge_pending(&self, nodes: impl IntoIterator<Item = Node>) {
        let mut state = self.state.lock().await;
        state.pending.extend(nodes);
    }

    /// §4.5 `get_node`. Uniformly-random removal from `pending` into
    /// `processing` (§9: "Random worker fairness").
    pub async fn get_node(&self) -> Option<Node> {
        let mut state = self.state.lock().await;
        let node = {
            let mut rng = rand::thread_rng();
            state.pending.iter().choose(&mut rng).cloned()
        }?;
        state.pending.remove(&node);
        state.processing.insert(node.clone());
        Some(node)
    }

    /// §4.5 `set_reachable`.
    pub async fn set_reachable(&self, node: Node) {
        let mut state = self.state.lock().await;
        state.processing.remove(&node);
        state.reachable.insert(node);
    }

    /// §4.5 `set_unreachable`.
    pub async fn set_unreachable(&self, node: Node) {
        let mut state = self.state.lock().await;
        state.processing.remove(&node);
        state.unreachable.insert(node);
    }

    /// §4.5 `retry_or_terminal`. `retry_exhausted_as_reachable` resolves the
    /// open "retry semantics divergence" (§9) as a caller-supplied policy
    /// flag rather than a hardcoded choice.
    pub async fn retry_or_terminal(
        &self,
        mut node: Node,
        max_handshake_attempts: u32,
        retry_exhausted_as_reachable: bool,
    ) {
        let mut state = self.state.lock().await;
        if node.has_handshake_attempts_left(max_handshake_attempts) {
            state.processing.remove(&node);
            state.pending.insert(node);
            return;
        }
        state.processing.remove(&node);
        if retry_exhausted_as_reachable {
            state.reachable.insert(node);
        } else {
            // Handshake-exhausted nodes are terminal unreachable; stats still
            // carry whatever partial handshake data was gathered.
            node.stats.handshake_attempts = max_handshake_attempts;
            state.unreachable.insert(node);
        }
    }

    /// §4.5 `add_peers`. `source` identifies the advertising node purely for
    /// logging; the staleness filter drops anything older than
    /// `staleness_window` relative to `now`.
    pub async fn add_peers(
        &self,
        source: &Node,
        advertised: HashSet<Address>,
        seed_distance: u32,
        staleness_window: Duration,
        now: i64,
    ) {
        let mut state = self.state.lock().await;
        let known: HashSet<&Address> = state
            .reachable
            .iter()
            .chain(state.unreachable.iter())
            .chain(state.pending.iter())
            .chain(state.next.iter())
            .chain(state.processing.iter())
            .map(|n| &n.address)
            .collect();

        let threshold = now - staleness_window.as_secs() as i64;
        let mut num_new = 0usize;
        let mut num_fresh = 0usize;
        let num_total = advertised.len();
        for addr in advertised {
            if known.contains(&addr) {
                continue;
            }
            num_new += 1;
            if addr.last_seen() > threshold {
                num_fresh += 1;
                state.next.insert(Node::new(addr, seed_distance));
            }
        }
        tracing::info!(
            %source,
            total = num_total,
            new = num_new,
            fresh = num_fresh,
            stale = num_new - num_fresh,
            "added peers advertised by node"
        );
    }

    /// §4.5 "Termination and waves". Returns `true` if there is more work;
    /// promotes `next` to `pending` once a wave fully drains.
    pub async fn nodes_left(&self) -> bool {
        if !self.state.lock().await.pending.is_empty() {
            return true;
        }

        loop {
            let processing_empty = self.state.lock().await.processing.is_empty();
            if processing_empty {
                break;
            }
            sleep(FRONTIER_POLL_INTERVAL).await;
            if !self.state.lock().await.pending.is_empty() {
                return true;
            }
        }

        let mut state = self.state.lock().await;
        if !state.next.is_empty() {
            state.pending = std::mem::take(&mut state.next);
            tracing::info!(count = state.pending.len(), "promoted next wave to pending");
            return true;
        }
        false
    }

    pub async fn counts(&self) -> FrontierCounts {
        let state = self.state.lock().await;
        FrontierCounts {
            reachable: state.reachable.len(),
            unreachable: state.unreachable.len(),
            pending: state.pending.len(),
            next: state.next.len(),
            processing: state.processing.len(),
        }
    }

    pub async fn reachable_nodes(&self) -> Vec<Node> {
        self.state.lock().await.reachable.iter().cloned().collect()
    }

    pub async fn unreachable_nodes(&self) -> Vec<Node> {
        self.state.lock().await.unreachable.iter().cloned().collect()
    }

    pub async fn nodes_by_seed_counts(&self) -> HashMap<String, usize> {
        self.state.lock().await.nodes_by_seed.iter().map(|(seed, nodes)| (seed.clone(), nodes.len())).collect()
    }

    /// The full provenance log (§3 "a provenance log, not a work set"), for
    /// the `num_nodes_from_seed`/`list_nodes_from_seed` breakdown in the
    /// crawler-stats artifact (§6).
    pub async fn nodes_by_seed(&self) -> HashMap<String, Vec<Node>> {
        self.state.lock().await.nodes_by_seed.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(host: &str, last_seen: i64) -> Address {
        Address::new(host, 8333, last_seen)
    }

    #[tokio::test]
    async fn init_populates_pending_and_provenance() {
        let frontier = Frontier::new();
        let mut addrs_by_seed = HashMap::new();
        addrs_by_seed.insert("seed.example".to_owned(), vec![addr("1.2.3.4", 0), addr("1.2.3.4", 0)]);
        frontier.init(addrs_by_seed).await;

        let counts = frontier.counts().await;
        assert_eq!(counts.pending, 1, "duplicate addresses from one seed collapse in the pending set");
        let by_seed = frontier.nodes_by_seed_counts().await;
        assert_eq!(by_seed["seed.example"], 2, "but are preserved verbatim in nodes_by_seed");
    }

    #[tokio::test]
    async fn get_node_moves_pending_to_processing() {
        let frontier = Frontier::new();
        let mut addrs_by_seed = HashMap::new();
        addrs_by_seed.insert("seed".to_owned(), vec![addr("1.2.3.4", 0)]);
        frontier.init(addrs_by_seed).await;

        let node = frontier.get_node().await.unwrap();
        assert_eq!(node.address, addr("1.2.3.4", 0));
        let counts = frontier.counts().await;
        assert_eq!(counts.pending, 0);
        assert_eq!(counts.processing, 1);
    }

    #[tokio::test]
    async fn set_reachable_and_unreachable_clear_processing() {
        let frontier = Frontier::new();
        let mut addrs_by_seed = HashMap::new();
        addrs_by_seed.insert("seed".to_owned(), vec![addr("1.2.3.4", 0), addr("5.6.7.8", 0)]);
        frontier.init(addrs_by_seed).await;

        let a = frontier.get_node().await.unwrap();
        let b = frontier.get_node().await.unwrap();
        frontier.set_reachable(a).await;
        frontier.set_unreachable(b).await;

        let counts = frontier.counts().await;
        assert_eq!(counts.processing, 0);
        assert_eq!(counts.reachable, 1);
        assert_eq!(counts.unreachable, 1);
    }

    #[tokio::test]
    async fn retry_or_terminal_requeues_when_attempts_remain() {
        let frontier = Frontier::new();
        let mut addrs_by_seed = HashMap::new();
        addrs_by_seed.insert("seed".to_owned(), vec![addr("1.2.3.4", 0)]);
        frontier.init(addrs_by_seed).await;

        let mut node = frontier.get_node().await.unwrap();
        node.stats.handshake_attempts = 1;
        frontier.retry_or_terminal(node, 3, false).await;

        let counts = frontier.counts().await;
        assert_eq!(counts.pending, 1);
        assert_eq!(counts.processing, 0);
    }

    #[tokio::test]
    async fn retry_or_terminal_respects_exhausted_policy() {
        let frontier = Frontier::new();
        let mut addrs_by_seed = HashMap::new();
        addrs_by_seed.insert("seed".to_owned(), vec![addr("1.2.3.4", 0)]);
        frontier.init(addrs_by_seed).await;

        let mut node = frontier.get_node().await.unwrap();
        node.stats.handshake_attempts = 3;
        frontier.retry_or_terminal(node.clone(), 3, false).await;
        assert_eq!(frontier.counts().await.unreachable, 1);

        let frontier = Frontier::new();
        let mut addrs_by_seed = HashMap::new();
        addrs_by_seed.insert("seed".to_owned(), vec![addr("5.6.7.8", 0)]);
        frontier.init(addrs_by_seed).await;
        let mut node2 = frontier.get_node().await.unwrap();
        node2.stats.handshake_attempts = 3;
        frontier.retry_or_terminal(node2, 3, true).await;
        assert_eq!(frontier.counts().await.reachable, 1);
    }

    #[tokio::test]
    async fn add_peers_filters_known_and_stale() {
        let frontier = Frontier::new();
        let mut addrs_by_seed = HashMap::new();
        addrs_by_seed.insert("seed".to_owned(), vec![addr("1.2.3.4", 0)]);
        frontier.init(addrs_by_seed).await;
        let source = frontier.get_node().await.unwrap();

        let now = 1_000_000i64;
        let mut advertised = HashSet::new();
        advertised.insert(addr("1.2.3.4", now)); // already known (pending->processing)
        advertised.insert(addr("9.9.9.9", now - 10)); // fresh
        advertised.insert(addr("8.8.8.8", now - 100_000)); // stale

        frontier.add_peers(&source, advertised, 1, Duration::from_secs(3600), now).await;

        let counts = frontier.counts().await;
        assert_eq!(counts.next, 1, "only the fresh, previously-unknown address is enqueued");
    }

    #[tokio::test]
    async fn nodes_left_promotes_next_wave_once_pending_and_processing_drain() {
        let frontier = Frontier::new();
        let mut addrs_by_seed = HashMap::new();
        addrs_by_seed.insert("seed".to_owned(), vec![addr("1.2.3.4", 0)]);
        frontier.init(addrs_by_seed).await;

        let node = frontier.get_node().await.unwrap();
        {
            let mut state = frontier.state.lock().await;
            state.next.insert(Node::new(addr("5.6.7.8", 0), 1));
        }
        frontier.set_reachable(node).await;

        assert!(frontier.nodes_left().await);
        let counts = frontier.counts().await;
        assert_eq!(counts.pending, 1);
        assert_eq!(counts.next, 0);
    }

    #[tokio::test]
    async fn nodes_left_is_false_when_everything_drained() {
        let frontier = Frontier::new();
        assert!(!frontier.nodes_left().await);
    }

    /// §3/§8 disjointness: after any sequence of `get_node`/`set_reachable`/
    /// `set_unreachable`/`retry_or_terminal` calls, no address appears in
    /// more than one of `pending`/`processing`/`reachable`/`unreachable`.
    async fn run_random_ops(seed_hosts: Vec<String>, ops: Vec<u8>) {
        let frontier = Frontier::new();
        let mut addrs_by_seed = HashMap::new();
        addrs_by_seed.insert("seed".to_owned(), seed_hosts.iter().map(|h| addr(h, 0)).collect());
        frontier.init(addrs_by_seed).await;

        for op in ops {
            match op % 3 {
                0 => {
                    if let Some(node) = frontier.get_node().await {
                        frontier.set_reachable(node).await;
                    }
                }
                1 => {
                    if let Some(node) = frontier.get_node().await {
                        frontier.set_unreachable(node).await;
                    }
                }
                _ => {
                    if let Some(node) = frontier.get_node().await {
                        frontier.retry_or_terminal(node, 2, false).await;
                    }
                }
            }

            let state = frontier.state.lock().await;
            let mut seen = HashSet::new();
            for set in [&state.pending, &state.next, &state.processing, &state.reachable, &state.unreachable] {
                for node in set {
                    assert!(seen.insert(node.address.clone()), "address {} present in more than one set", node.address);
                }
            }
        }
    }

    proptest::proptest! {
        #[test]
        fn sets_stay_disjoint_under_random_operation_sequences(
            num_hosts in 1u8..8,
            ops in proptest::collection::vec(proptest::prelude::any::<u8>(), 0..50),
        ) {
            let hosts: Vec<String> = (0..num_hosts).map(|i| format!("10.0.0.{i}")).collect();
            tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(run_random_ops(hosts, ops));
        }
    }
}
