//! Protocol- and engine-wide constants.

use std::time::Duration;

/// Bitcoin mainnet network magic.
pub const MAINNET_MAGIC: [u8; 4] = [0xf9, 0xbe, 0xb4, 0xd9];

/// The protocol version this crawler advertises in its own `version` message.
pub const PROTOCOL_VERSION: i32 = 70015;

/// The first protocol version to carry sender address fields in `version`.
pub const VERSION_WITH_SENDER_FIELDS: i32 = 106;

/// The first protocol version to carry the trailing `relay` byte in `version`.
pub const VERSION_WITH_RELAY: i32 = 70001;

/// User agent this crawler identifies itself with during the handshake.
pub const USER_AGENT: &str = "/Satoshi:23.0.0/";

/// Command strings, NUL-padded to 12 bytes on the wire.
pub const CMD_VERSION: &str = "version";
pub const CMD_VERACK: &str = "verack";
pub const CMD_SENDADDRV2: &str = "sendaddrv2";
pub const CMD_PING: &str = "ping";
pub const CMD_PONG: &str = "pong";
pub const CMD_GETADDR: &str = "getaddr";
pub const CMD_ADDR: &str = "addr";
pub const CMD_ADDRV2: &str = "addrv2";

/// Default Bitcoin mainnet port, used both for DNS-seeded addresses and as
/// the default `Address` port.
pub const DEFAULT_MAINNET_PORT: u16 = 8333;

/// The nine hardcoded Bitcoin mainnet DNS seed hostnames.
pub const DNS_SEEDS: [&str; 9] = [
    "seed.bitcoin.sipa.be",
    "dnsseed.bluematt.me",
    "dnsseed.bitcoin.dashjr.org",
    "seed.bitcoinstats.com",
    "seed.bitcoin.jonasschnelli.ch",
    "seed.btc.petertodd.org",
    "seed.bitcoin.sprovoost.nl",
    "dnsseed.emzy.de",
    "seed.bitcoin.wiz.biz",
];

/// Poll interval used by `Frontier::nodes_left` while `processing` drains.
pub const FRONTIER_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Monitor loop reporting interval.
pub const MONITOR_INTERVAL: Duration = Duration::from_secs(5);

/// Synthetic seed distance assigned to nodes loaded from the history store,
/// so they are only attempted after the ordinary wave process has run dry.
pub const HISTORY_SEED_DISTANCE: u32 = 100;
