//! Typed settings consumed by the transport layer and the engine.
//!
//! These are plain value types with sane defaults; `crawlerd` is responsible
//! for populating them from its `clap` CLI surface (§6). Keeping them here,
//! rather than in the binary crate, lets `crawler-network`'s own tests build
//! an `EngineSettings` without depending on `crawlerd`.

use std::time::Duration;

/// The three timeout values that bound one transport class's operations.
#[derive(Clone, Copy, Debug)]
pub struct TimeoutSettings {
    pub connect: Duration,
    pub message: Duration,
    pub getaddr: Duration,
}

impl TimeoutSettings {
    pub const fn from_secs_f64(connect: f64, message: f64, getaddr: f64) -> TimeoutSettings {
        TimeoutSettings {
            connect: Duration::from_nanos((connect * 1_000_000_000.0) as u64),
            message: Duration::from_nanos((message * 1_000_000_000.0) as u64),
            getaddr: Duration::from_nanos((getaddr * 1_000_000_000.0) as u64),
        }
    }
}

/// Per-transport-class timeout table (§4.3: "Timeouts are per transport
/// class (ip, tor, i2p) with three values each").
#[derive(Clone, Copy, Debug)]
pub struct TimeoutsByTransport {
    pub ip: TimeoutSettings,
    pub tor: TimeoutSettings,
    pub i2p: TimeoutSettings,
}

impl Default for TimeoutsByTransport {
    /// The first of the two presets named in §6 ("Two presets exist in
    /// source; either is acceptable"): the lower bound of each range.
    fn default() -> Self {
        TimeoutsByTransport {
            ip: TimeoutSettings::from_secs_f64(3.0, 5.0, 30.0),
            tor: TimeoutSettings::from_secs_f64(30.0, 40.0, 90.0),
            i2p: TimeoutSettings::from_secs_f64(30.0, 80.0, 170.0),
        }
    }
}

/// Transport dial targets for the two proxied networks.
#[derive(Clone, Debug)]
pub struct NetworkSettings {
    pub tor_proxy_host: String,
    pub tor_proxy_port: u16,
    pub i2p_sam_host: String,
    pub i2p_sam_port: u16,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        NetworkSettings {
            tor_proxy_host: "127.0.0.1".to_owned(),
            tor_proxy_port: 9050,
            i2p_sam_host: "127.0.0.1".to_owned(),
            i2p_sam_port: 7656,
        }
    }
}

/// Worker pool / sampling / policy knobs for the engine.
#[derive(Clone, Debug)]
pub struct EngineSettings {
    pub num_workers: usize,
    /// Probability in `[0.0, 1.0]` that a reachable node is asked for peers.
    pub node_share: f64,
    pub handshake_attempts: u32,
    pub getaddr_attempts: u32,
    pub delay_start: Duration,
    /// §9 "Staleness window divergence (open)" resolved as a CLI-configurable
    /// parameter; default 48h (the fresher of the two divergent values).
    pub staleness_window: Duration,
    /// §9 "Retry semantics divergence (open)" resolved as a CLI-configurable
    /// boolean; default `false` (handshake-exhausted nodes are unreachable).
    pub retry_exhausted_as_reachable: bool,
    pub timeouts: TimeoutsByTransport,
    pub network: NetworkSettings,
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings {
            num_workers: 32,
            node_share: 1.0,
            handshake_attempts: 3,
            getaddr_attempts: 1,
            delay_start: Duration::from_secs(0),
            staleness_window: Duration::from_secs(48 * 3600),
            retry_exhausted_as_reachable: false,
            timeouts: TimeoutsByTransport::default(),
            network: NetworkSettings::default(),
        }
    }
}
