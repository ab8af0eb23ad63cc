//! Address and wire-format primitives shared by the rest of the crawler.
//!
//! This crate has no network or filesystem I/O of its own; it is the pure,
//! synchronous core that `crawler-network` and `crawler-storage` build on.

pub mod address;
pub mod bip155;
pub mod leb128;
pub mod murmur;
pub mod network_type;
pub mod node;
pub mod varint;
pub mod zigzag;

pub use address::{now_unix, Address, AddressParseError};
pub use network_type::NetworkType;
pub use node::{AdvertisedAddrCounts, Node, NodeStats};
