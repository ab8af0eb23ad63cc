//! The reachable-node history store (§4.8): a bz2-compressed JSON file that
//! remembers which addresses were reachable across runs, with a bounded
//! retry budget before an address is forgotten.

use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::PathBuf;

use bzip2::read::BzDecoder;
use bzip2::write::BzEncoder;
use bzip2::Compression;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crawler_chain::{Address, AddressParseError, Node};

use crate::HISTORY_SEED_DISTANCE;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("history contains an unparseable address: {0}")]
    Address(#[from] AddressParseError),
}

/// `--reachable-node-history`/`--max-history-retries` (§6).
#[derive(Clone, Debug)]
pub struct HistorySettings {
    pub path: PathBuf,
    pub max_retries: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct ReachableEntry {
    network_type: String,
    retries_left: u32,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct Metadata {
    #[serde(default)]
    last_run: String,
    #[serde(default)]
    version: String,
    #[serde(default)]
    stats: Vec<BTreeMap<String, BTreeMap<String, u32>>>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct HistoryData {
    #[serde(rename = "_metadata", default)]
    metadata: Metadata,
    #[serde(default)]
    reachable_nodes: BTreeMap<String, ReachableEntry>,
}

/// Counts reported after [`History::update_and_persist`], mirroring the
/// logged summary in `history.py::update_and_persist`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UpdateSummary {
    pub added: usize,
    pub retries_reset: usize,
    pub retries_decremented: usize,
    pub removed: usize,
    pub old_size: usize,
    pub new_size: usize,
}

/// The persistent reachable-node set. Constructed once per run via
/// [`History::load`], read from with [`History::get_reachable_nodes`], and
/// written back with [`History::update_and_persist`].
pub struct History {
    settings: HistorySettings,
    data: HistoryData,
}

impl History {
    /// Reads the bz2-compressed JSON file at `settings.path`. A missing file
    /// is not an error (§4.8: a fresh crawler has no history yet); any other
    /// read/parse failure is.
    pub fn load(settings: HistorySettings) -> Result<History, HistoryError> {
        let data = match File::open(&settings.path) {
            Ok(file) => {
                let mut decoder = BzDecoder::new(file);
                let mut json = String::new();
                decoder.read_to_string(&mut json)?;
                serde_json::from_str(&json)?
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::warn!(path = %settings.path.display(), "history file not found, starting fresh");
                HistoryData::default()
            }
            Err(e) => return Err(e.into()),
        };
        Ok(History { settings, data })
    }

    /// §4.8 `get_reachable_nodes`: every historical address, as a [`Node`]
    /// at the synthetic [`HISTORY_SEED_DISTANCE`] so it is only tried after
    /// the ordinary wave process runs dry.
    pub fn get_reachable_nodes(&self) -> Result<Vec<Node>, HistoryError> {
        self.data
            .reachable_nodes
            .keys()
            .map(|addr_str| Ok(Node::new(addr_str.parse::<Address>()?, HISTORY_SEED_DISTANCE)))
            .collect()
    }

    /// §4.8 `update_and_persist`. Computes additions/resets/decrements
    /// against the set this instance was loaded with, applies them, appends
    /// a per-run stats record, and rewrites the file.
    pub fn update_and_persist(
        &mut self,
        reachable_now: &[Node],
        run_timestamp: &str,
        version: &str,
    ) -> Result<UpdateSummary, HistoryError> {
        let old_history: HashSet<String> = self.data.reachable_nodes.keys().cloned().collect();
        let old_size = old_history.len();

        let reachable_now_strs: HashSet<String> = reachable_now.iter().map(|n| n.address.to_string()).collect();
        let reachable_now_by_str: BTreeMap<String, &Node> =
            reachable_now.iter().map(|n| (n.address.to_string(), n)).collect();

        let new_nodes: Vec<&String> = reachable_now_strs.difference(&old_history).collect();
        for addr_str in &new_nodes {
            let node = reachable_now_by_str[*addr_str];
            self.data.reachable_nodes.insert(
                (*addr_str).clone(),
                ReachableEntry {
                    network_type: node.address.network_type().to_string(),
                    retries_left: self.settings.max_retries,
                },
            );
        }

        let unreachable_transition: Vec<String> = old_history.difference(&reachable_now_strs).cloned().collect();
        let mut removed = 0usize;
        for addr_str in &unreachable_transition {
            if let Some(entry) = self.data.reachable_nodes.get_mut(addr_str) {
                entry.retries_left = entry.retries_left.saturating_sub(1);
                if entry.retries_left == 0 {
                    self.data.reachable_nodes.remove(addr_str);
                    removed += 1;
                }
            }
        }

        let nodes_to_reset: Vec<String> =
            old_history.iter().filter(|addr| !unreachable_transition.contains(addr)).cloned().collect();
        for addr_str in &nodes_to_reset {
            if let Some(entry) = self.data.reachable_nodes.get_mut(addr_str) {
                entry.retries_left = self.settings.max_retries;
            }
        }

        self.data.metadata.last_run = run_timestamp.to_owned();
        self.data.metadata.version = version.to_owned();

        let mut per_net_type: BTreeMap<String, u32> = BTreeMap::new();
        for entry in self.data.reachable_nodes.values() {
            *per_net_type.entry(entry.network_type.clone()).or_insert(0) += 1;
        }
        let mut stats_entry = BTreeMap::new();
        stats_entry.insert(run_timestamp.to_owned(), per_net_type);
        self.data.metadata.stats.push(stats_entry);

        self.persist()?;

        Ok(UpdateSummary {
            added: new_nodes.len(),
            retries_reset: nodes_to_reset.len(),
            retries_decremented: unreachable_transition.len(),
            removed,
            old_size,
            new_size: self.data.reachable_nodes.len(),
        })
    }

    fn persist(&self) -> Result<(), HistoryError> {
        let json = serde_json::to_string_pretty(&self.data)?;
        let file = File::create(&self.settings.path)?;
        let mut encoder = BzEncoder::new(file, Compression::best());
        encoder.write_all(json.as_bytes())?;
        encoder.finish()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(path: PathBuf, max_retries: u32) -> HistorySettings {
        HistorySettings { path, max_retries }
    }

    #[test]
    fn missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let history = History::load(settings(dir.path().join("history.json.bz2"), 3)).unwrap();
        assert!(history.get_reachable_nodes().unwrap().is_empty());
    }

    #[test]
    fn new_reachable_node_is_added_with_full_retry_budget() {
        let dir = tempfile::tempdir().unwrap();
        let mut history = History::load(settings(dir.path().join("history.json.bz2"), 3)).unwrap();

        let node = Node::new(Address::new("1.2.3.4", 8333, 0), 0);
        history.update_and_persist(&[node], "2026-07-28", "v1").unwrap();

        let reloaded = History::load(settings(dir.path().join("history.json.bz2"), 3)).unwrap();
        let nodes = reloaded.get_reachable_nodes().unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].seed_distance, HISTORY_SEED_DISTANCE);
    }

    #[test]
    fn unreachable_for_max_retries_runs_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json.bz2");
        let node = Node::new(Address::new("1.2.3.4", 8333, 0), 0);

        let mut history = History::load(settings(path.clone(), 2)).unwrap();
        history.update_and_persist(&[node.clone()], "run1", "v1").unwrap();
        assert_eq!(History::load(settings(path.clone(), 2)).unwrap().get_reachable_nodes().unwrap().len(), 1);

        // run 2: node not reachable -> retries_left 2 -> 1, still present
        let mut history = History::load(settings(path.clone(), 2)).unwrap();
        let summary = history.update_and_persist(&[], "run2", "v1").unwrap();
        assert_eq!(summary.removed, 0);
        assert_eq!(History::load(settings(path.clone(), 2)).unwrap().get_reachable_nodes().unwrap().len(), 1);

        // run 3: node still not reachable -> retries_left 1 -> 0 -> removed
        let mut history = History::load(settings(path.clone(), 2)).unwrap();
        let summary = history.update_and_persist(&[], "run3", "v1").unwrap();
        assert_eq!(summary.removed, 1);
        assert!(History::load(settings(path, 2)).unwrap().get_reachable_nodes().unwrap().is_empty());
    }

    #[test]
    fn reachable_again_resets_retry_budget() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json.bz2");
        let node = Node::new(Address::new("1.2.3.4", 8333, 0), 0);

        let mut history = History::load(settings(path.clone(), 2)).unwrap();
        history.update_and_persist(&[node.clone()], "run1", "v1").unwrap();

        let mut history = History::load(settings(path.clone(), 2)).unwrap();
        history.update_and_persist(&[], "run2", "v1").unwrap(); // retries_left -> 1

        let mut history = History::load(settings(path.clone(), 2)).unwrap();
        let summary = history.update_and_persist(&[node], "run3", "v1").unwrap(); // reachable again
        assert_eq!(summary.retries_reset, 1);

        let mut history = History::load(settings(path.clone(), 2)).unwrap();
        let summary = history.update_and_persist(&[], "run4", "v1").unwrap();
        assert_eq!(summary.removed, 0, "retry budget should have been reset to the full 2 in run3");
    }
}
