//! Wire protocol, transport, node session, frontier and crawl engine.
//!
//! This crate owns every piece of the system that touches a socket or a
//! clock, built on top of the pure data types in `crawler-chain`.

pub mod config;
pub mod constants;
pub mod dns;
pub mod engine;
pub mod frontier;
pub mod protocol;
pub mod session;
pub mod stats;
pub mod transport;

pub use config::EngineSettings;
pub use engine::{Engine, PeerObserver};
pub use frontier::{Frontier, FrontierCounts};
pub use stats::{AddressStats, CrawlerStatistics};
