//! Command-line surface (§6): every flag also accepts its upper-cased
//! environment variable as a default, via `clap`'s `env` feature, so a
//! container deployment can be configured purely through its environment.

use std::path::PathBuf;

use clap::{ArgAction, Parser};

fn default_timestamp() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H-%M-%SZ").to_string()
}

/// Bitcoin peer discovery crawler.
#[derive(Parser, Debug)]
#[command(name = "crawlerd", version)]
pub struct Cli {
    // --- Workers / sampling (§6 "Workers/sampling") ---
    #[arg(long, env = "NUM_WORKERS", default_value_t = 32)]
    pub num_workers: usize,

    #[arg(long, env = "NODE_SHARE", default_value_t = 1.0)]
    pub node_share: f64,

    #[arg(long, env = "HANDSHAKE_ATTEMPTS", default_value_t = 3)]
    pub handshake_attempts: u32,

    #[arg(long, env = "GETADDR_ATTEMPTS", default_value_t = 1)]
    pub getaddr_attempts: u32,

    #[arg(long, env = "DELAY_START", default_value_t = 10)]
    pub delay_start: u64,

    // --- Transports (§6 "Transports") ---
    #[arg(long = "tor-proxy-host", env = "TOR_PROXY_HOST", default_value = "127.0.0.1")]
    pub tor_proxy_host: String,

    #[arg(long = "tor-proxy-port", env = "TOR_PROXY_PORT", default_value_t = 9050)]
    pub tor_proxy_port: u16,

    #[arg(long = "i2p-sam-host", env = "I2P_SAM_HOST", default_value = "127.0.0.1")]
    pub i2p_sam_host: String,

    #[arg(long = "i2p-sam-port", env = "I2P_SAM_PORT", default_value_t = 7656)]
    pub i2p_sam_port: u16,

    // --- Timeouts (§6, nine flags, float seconds; lower-bound preset) ---
    #[arg(long = "ip-connect-timeout", env = "IP_CONNECT_TIMEOUT", default_value_t = 3.0)]
    pub ip_connect_timeout: f64,
    #[arg(long = "ip-message-timeout", env = "IP_MESSAGE_TIMEOUT", default_value_t = 5.0)]
    pub ip_message_timeout: f64,
    #[arg(long = "ip-getaddr-timeout", env = "IP_GETADDR_TIMEOUT", default_value_t = 30.0)]
    pub ip_getaddr_timeout: f64,

    #[arg(long = "tor-connect-timeout", env = "TOR_CONNECT_TIMEOUT", default_value_t = 30.0)]
    pub tor_connect_timeout: f64,
    #[arg(long = "tor-message-timeout", env = "TOR_MESSAGE_TIMEOUT", default_value_t = 40.0)]
    pub tor_message_timeout: f64,
    #[arg(long = "tor-getaddr-timeout", env = "TOR_GETADDR_TIMEOUT", default_value_t = 90.0)]
    pub tor_getaddr_timeout: f64,

    #[arg(long = "i2p-connect-timeout", env = "I2P_CONNECT_TIMEOUT", default_value_t = 30.0)]
    pub i2p_connect_timeout: f64,
    #[arg(long = "i2p-message-timeout", env = "I2P_MESSAGE_TIMEOUT", default_value_t = 80.0)]
    pub i2p_message_timeout: f64,
    #[arg(long = "i2p-getaddr-timeout", env = "I2P_GETADDR_TIMEOUT", default_value_t = 170.0)]
    pub i2p_getaddr_timeout: f64,

    // --- Output (§6 "Output") ---
    #[arg(long, env = "RESULT_PATH", default_value = "results")]
    pub result_path: PathBuf,

    #[arg(long, env = "TIMESTAMP", default_value_t = default_timestamp())]
    pub timestamp: String,

    #[arg(long = "store-debug-log", env = "STORE_DEBUG_LOG", default_value_t = true, action = ArgAction::Set)]
    pub store_debug_log: bool,

    #[arg(long = "log-level", env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[arg(long = "record-addr-stats", env = "RECORD_ADDR_STATS", default_value_t = false)]
    pub record_addr_stats: bool,

    #[arg(long = "record-addr-data", env = "RECORD_ADDR_DATA", default_value_t = false)]
    pub record_addr_data: bool,

    /// Extra free-form text recorded in the crawler-stats artifact (e.g. a
    /// build/commit identifier); not parsed, just carried through.
    #[arg(long = "extra-version-info", env = "EXTRA_VERSION_INFO", default_value = "")]
    pub extra_version_info: String,

    // --- Object storage (§6 "Object storage") ---
    #[arg(long = "store-to-gcs", env = "STORE_TO_GCS", default_value_t = false, action = ArgAction::Set)]
    pub store_to_gcs: bool,

    #[arg(long = "gcs-bucket", env = "GCS_BUCKET", default_value = "bitcoin_p2p_crawler")]
    pub gcs_bucket: String,

    #[arg(long = "gcs-location", env = "GCS_LOCATION", default_value = "undefined")]
    pub gcs_location: String,

    /// Path to a GCS service-account JSON key. Falls back to
    /// `GOOGLE_APPLICATION_CREDENTIALS` the way the Python original does,
    /// since that's the ambient credential convention GCS client libraries
    /// use across languages.
    #[arg(long = "gcs-credentials", env = "GOOGLE_APPLICATION_CREDENTIALS")]
    pub gcs_credentials: Option<PathBuf>,

    // --- History store (§3/§4.8) ---
    #[arg(long = "reachable-node-history", env = "REACHABLE_NODE_HISTORY")]
    pub reachable_node_history: Option<PathBuf>,

    #[arg(long = "max-history-retries", env = "MAX_HISTORY_RETRIES", default_value_t = 3)]
    pub max_history_retries: u32,

    // --- Retry/staleness policy knobs (§6, §9) ---
    #[arg(long = "staleness-window-hours", env = "STALENESS_WINDOW_HOURS", default_value_t = 48)]
    pub staleness_window_hours: u64,

    #[arg(
        long = "retry-exhausted-as-reachable",
        env = "RETRY_EXHAUSTED_AS_REACHABLE",
        default_value_t = false,
        action = ArgAction::Set
    )]
    pub retry_exhausted_as_reachable: bool,
}
