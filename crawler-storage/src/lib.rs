//! Persistent artifacts the crawl engine itself does not own: the
//! reachable-node history (§4.8) and the compact addr-data log (§4.7).
//!
//! No block or UTXO database here; this crawler has no equivalent of one,
//! only the optional reachable-node history file.

pub mod addr_log;
pub mod history;

pub use addr_log::{decode as decode_addr_log, AddrLogWriter, DecodedAddrRecord, DecodedEntry};
pub use history::{History, HistoryError, HistorySettings, UpdateSummary};

/// The synthetic seed distance historical nodes are re-queued at (§4.8).
/// Matches `crawler_network::constants::HISTORY_SEED_DISTANCE`, kept as a
/// separate constant here so this crate never depends on `crawler-network`.
pub const HISTORY_SEED_DISTANCE: u32 = 100;
