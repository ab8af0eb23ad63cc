//! The crawl engine (§4.6): worker pool, monitor loop, and seed-distance
//! wave coordination glueing DNS seeding, the frontier and node sessions
//! together.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use rand::Rng;
use tokio::time::sleep;

use crawler_chain::{now_unix, Address, Node};

use crate::config::EngineSettings;
use crate::constants::MONITOR_INTERVAL;
use crate::dns;
use crate::frontier::Frontier;
use crate::session::Session;
use crate::stats::CrawlerStatistics;
use crate::transport::i2p::SharedSamSession;

/// A sink for addresses gossiped by a reachable peer, called once per
/// successful `getaddr` round. `crawlerd` implements this to drive the
/// optional addr-data log and per-address statistics (§4.7, §3) without
/// `crawler-network` needing to know about file I/O.
pub trait PeerObserver: Send + Sync {
    fn observe_peers(&self, source: &Node, addrs: &HashSet<Address>);
}

/// The crawl engine: owns the frontier, run-wide statistics and the
/// process-wide I2P SAM session, and drives workers against them.
pub struct Engine {
    settings: EngineSettings,
    frontier: Arc<Frontier>,
    stats: Arc<CrawlerStatistics>,
    i2p_session: Arc<SharedSamSession>,
}

impl Engine {
    pub fn new(settings: EngineSettings) -> Engine {
        Engine {
            settings,
            frontier: Arc::new(Frontier::new()),
            stats: Arc::new(CrawlerStatistics::new()),
            i2p_session: Arc::new(SharedSamSession::new()),
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn frontier(&self) -> &Arc<Frontier> {
        &self.frontier
    }

    pub fn stats(&self) -> &Arc<CrawlerStatistics> {
        &self.stats
    }

    /// §4.6 step 1-2: delay start (to let Tor/I2P sidecars come up), then
    /// resolve DNS seeds and seed the frontier. DNS resolution is blocking,
    /// so it runs on a blocking thread.
    pub async fn seed(&self) {
        if !self.settings.delay_start.is_zero() {
            tracing::info!(delay = ?self.settings.delay_start, "delaying engine start");
            sleep(self.settings.delay_start).await;
        }

        let addrs_by_seed = tokio::task::spawn_blocking(dns::resolve_seeds)
            .await
            .expect("DNS seeding task panicked");
        self.frontier.init(addrs_by_seed).await;
    }

    /// Merge historical reachable nodes into `pending` ahead of a second
    /// pass (§4.6 step 4, §4.8).
    pub async fn merge_historical(&self, nodes: Vec<Node>) {
        self.frontier.merge_pending(nodes).await;
    }

    /// §4.6 steps 3/5: spawn `num_workers` workers plus one monitor, and
    /// wait for all of them to finish. Call this once per pass (the first,
    /// unconditional pass, and again for the optional history-driven pass).
    pub async fn run_pass(&self, observer: Option<Arc<dyn PeerObserver>>) {
        let started_at = now_unix();
        let mut handles = Vec::with_capacity(self.settings.num_workers + 1);

        for worker_id in 0..self.settings.num_workers {
            let frontier = Arc::clone(&self.frontier);
            let stats = Arc::clone(&self.stats);
            let i2p_session = Arc::clone(&self.i2p_session);
            let settings = self.settings.clone();
            let observer = observer.clone();
            handles.push(tokio::spawn(async move {
                worker_loop(worker_id, frontier, stats, i2p_session, settings, observer).await;
            }));
        }

        let monitor_frontier = Arc::clone(&self.frontier);
        handles.push(tokio::spawn(async move {
            monitor_loop(monitor_frontier, started_at).await;
        }));

        for result in join_all(handles).await {
            if let Err(e) = result {
                tracing::error!(error = %e, "engine task panicked");
            }
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    frontier: Arc<Frontier>,
    stats: Arc<CrawlerStatistics>,
    i2p_session: Arc<SharedSamSession>,
    settings: EngineSettings,
    observer: Option<Arc<dyn PeerObserver>>,
) {
    loop {
        if !frontier.nodes_left().await {
            tracing::debug!(worker_id, "no more nodes left; worker exiting");
            return;
        }

        let mut node = match frontier.get_node().await {
            Some(node) => node,
            // Another worker raced us between `nodes_left` and `get_node`.
            None => continue,
        };
        stats.record_processed_node();

        let session = Session::connect(&mut node, &settings.timeouts, &settings.network, &i2p_session).await;
        let mut session = match session {
            Some(session) => session,
            None => {
                frontier.set_unreachable(node).await;
                continue;
            }
        };

        if !session.handshake(&mut node).await {
            session.disconnect().await;
            frontier.retry_or_terminal(node, settings.handshake_attempts, settings.retry_exhausted_as_reachable).await;
            continue;
        }

        if rand::thread_rng().gen::<f64>() < settings.node_share {
            get_and_process_peers(&mut session, &mut node, &frontier, &settings, observer.as_deref()).await;
        }

        session.disconnect().await;
        frontier.set_reachable(node).await;
    }
}

async fn get_and_process_peers(
    session: &mut Session,
    node: &mut Node,
    frontier: &Frontier,
    settings: &EngineSettings,
    observer: Option<&dyn PeerObserver>,
) {
    let class_timeouts = match crate::transport::TransportClass::of(node.address.network_type()) {
        Some(crate::transport::TransportClass::Ip) => settings.timeouts.ip,
        Some(crate::transport::TransportClass::Tor) => settings.timeouts.tor,
        Some(crate::transport::TransportClass::I2p) => settings.timeouts.i2p,
        None => settings.timeouts.ip,
    };

    let mut addrs = HashSet::new();
    for attempt in 0..settings.getaddr_attempts.max(1) {
        addrs = session.get_peer_addrs(node, class_timeouts.getaddr, class_timeouts.message).await;
        if !addrs.is_empty() {
            break;
        }
        tracing::debug!(%node, attempt, "getaddr round returned no addresses");
    }
    if addrs.is_empty() {
        return;
    }

    if let Some(observer) = observer {
        observer.observe_peers(node, &addrs);
    }

    frontier
        .add_peers(node, addrs, node.seed_distance + 1, settings.staleness_window, now_unix())
        .await;
}

/// §4.6 monitor loop: report set sizes every [`MONITOR_INTERVAL`] and exit
/// once `pending ∪ next ∪ processing = ∅`.
async fn monitor_loop(frontier: Arc<Frontier>, started_at: i64) {
    loop {
        let counts = frontier.counts().await;
        let elapsed_hours = (now_unix() - started_at) as f64 / 3600.0;
        tracing::info!(
            elapsed_hours,
            reachable = counts.reachable,
            unreachable = counts.unreachable,
            queued = counts.pending + counts.next,
            processing = counts.processing,
            "crawl status"
        );
        metrics::gauge!("crawler_nodes_reachable", counts.reachable as f64);
        metrics::gauge!("crawler_nodes_unreachable", counts.unreachable as f64);
        metrics::gauge!("crawler_nodes_queued", (counts.pending + counts.next) as f64);
        metrics::gauge!("crawler_nodes_processing", counts.processing as f64);

        if counts.pending == 0 && counts.next == 0 && counts.processing == 0 {
            tracing::info!("no more nodes and no more active workers: monitor exiting");
            return;
        }

        sleep(MONITOR_INTERVAL).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn engine_drains_a_tiny_seeded_frontier_with_unreachable_nodes() {
        // Nodes dialing 127.0.0.1:1 (nothing listening there) fail to
        // connect quickly and become unreachable, exercising the full
        // worker/monitor loop without a real peer.
        let mut settings = EngineSettings::default();
        settings.num_workers = 2;
        settings.timeouts.ip.connect = Duration::from_millis(200);
        let engine = Engine::new(settings);

        let mut addrs_by_seed = std::collections::HashMap::new();
        addrs_by_seed.insert("test-seed".to_owned(), vec![Address::now("127.0.0.1", 1), Address::now("127.0.0.1", 2)]);
        engine.frontier().init(addrs_by_seed).await;

        engine.run_pass(None).await;

        let counts = engine.frontier().counts().await;
        assert_eq!(counts.pending, 0);
        assert_eq!(counts.processing, 0);
        assert_eq!(counts.unreachable, 2);
        assert_eq!(engine.stats().num_processed_nodes(), 2);
    }
}
