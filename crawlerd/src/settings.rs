//! Typed settings tree built once from [`crate::cli::Cli`], mirroring the
//! layered `*Settings` dataclasses in the original's `config.py`
//! (`TimeoutSettings`, `ResultSettings`, `CrawlerSettings`, ...).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;

use crawler_network::config::{EngineSettings, NetworkSettings, TimeoutSettings, TimeoutsByTransport};
use crawler_storage::HistorySettings;

use crate::cli::Cli;

/// Where every artifact this run produces gets written, and under what
/// prefix (`<result_path>/<timestamp>_v<version>_...`), matching
/// `ResultSettings.parse` / `LogSettings.parse` in the original.
#[derive(Clone, Debug)]
pub struct ResultSettings {
    pub dir: PathBuf,
    pub reachable_nodes_csv: PathBuf,
    pub crawler_stats_json: PathBuf,
    pub address_stats_json: PathBuf,
    pub addr_data_bin: PathBuf,
    pub debug_log_txt: PathBuf,
}

impl ResultSettings {
    fn new(result_path: &Path, timestamp: &str) -> ResultSettings {
        let prefix = format!("{}_v{}", timestamp, env!("CARGO_PKG_VERSION"));
        let at = |suffix: &str| result_path.join(format!("{prefix}{suffix}"));
        ResultSettings {
            dir: result_path.to_owned(),
            reachable_nodes_csv: at("_reachable_nodes.csv"),
            crawler_stats_json: at("_crawler_stats.json"),
            address_stats_json: at("_address_stats.json"),
            addr_data_bin: at("_addr_data.bin"),
            debug_log_txt: at("_debug_log.txt"),
        }
    }
}

/// `--store-to-gcs`/`--gcs-*` (§6 "Object storage").
#[derive(Clone, Debug)]
pub struct GcsSettings {
    pub enabled: bool,
    pub bucket: String,
    pub location: String,
    pub credentials: Option<PathBuf>,
}

/// `--log-level`/`--store-debug-log` (§6 "Output").
#[derive(Clone, Debug)]
pub struct LogSettings {
    pub level: String,
    pub store_debug_log: bool,
    pub debug_log_path: PathBuf,
}

/// A JSON-serializable snapshot of the run's settings, embedded verbatim
/// in `<...>_crawler_stats.json` (`crawler_settings` key in the original).
#[derive(Clone, Debug, Serialize)]
pub struct SettingsSnapshot {
    pub num_workers: usize,
    pub node_share: f64,
    pub handshake_attempts: u32,
    pub getaddr_attempts: u32,
    pub delay_start_secs: u64,
    pub staleness_window_hours: u64,
    pub retry_exhausted_as_reachable: bool,
    pub record_addr_stats: bool,
    pub record_addr_data: bool,
    pub extra_version_info: String,
}

/// The whole settings tree for one run.
pub struct Settings {
    pub engine: EngineSettings,
    pub result: ResultSettings,
    pub log: LogSettings,
    pub gcs: GcsSettings,
    pub history: Option<HistorySettings>,
    pub record_addr_stats: bool,
    pub record_addr_data: bool,
    pub timestamp: String,
    pub extra_version_info: String,
    pub snapshot: SettingsSnapshot,
}

impl Settings {
    pub fn from_cli(cli: &Cli) -> Settings {
        let timeouts = TimeoutsByTransport {
            ip: TimeoutSettings::from_secs_f64(cli.ip_connect_timeout, cli.ip_message_timeout, cli.ip_getaddr_timeout),
            tor: TimeoutSettings::from_secs_f64(
                cli.tor_connect_timeout,
                cli.tor_message_timeout,
                cli.tor_getaddr_timeout,
            ),
            i2p: TimeoutSettings::from_secs_f64(
                cli.i2p_connect_timeout,
                cli.i2p_message_timeout,
                cli.i2p_getaddr_timeout,
            ),
        };

        let engine = EngineSettings {
            num_workers: cli.num_workers,
            node_share: cli.node_share,
            handshake_attempts: cli.handshake_attempts,
            getaddr_attempts: cli.getaddr_attempts,
            delay_start: Duration::from_secs(cli.delay_start),
            staleness_window: Duration::from_secs(cli.staleness_window_hours * 3600),
            retry_exhausted_as_reachable: cli.retry_exhausted_as_reachable,
            timeouts,
            network: NetworkSettings {
                tor_proxy_host: cli.tor_proxy_host.clone(),
                tor_proxy_port: cli.tor_proxy_port,
                i2p_sam_host: cli.i2p_sam_host.clone(),
                i2p_sam_port: cli.i2p_sam_port,
            },
        };

        let result = ResultSettings::new(&cli.result_path, &cli.timestamp);
        let log = LogSettings {
            level: cli.log_level.clone(),
            store_debug_log: cli.store_debug_log,
            debug_log_path: result.debug_log_txt.clone(),
        };
        let gcs = GcsSettings {
            enabled: cli.store_to_gcs,
            bucket: cli.gcs_bucket.clone(),
            location: cli.gcs_location.clone(),
            credentials: cli.gcs_credentials.clone(),
        };
        let history = cli
            .reachable_node_history
            .clone()
            .map(|path| HistorySettings { path, max_retries: cli.max_history_retries });

        let snapshot = SettingsSnapshot {
            num_workers: cli.num_workers,
            node_share: cli.node_share,
            handshake_attempts: cli.handshake_attempts,
            getaddr_attempts: cli.getaddr_attempts,
            delay_start_secs: cli.delay_start,
            staleness_window_hours: cli.staleness_window_hours,
            retry_exhausted_as_reachable: cli.retry_exhausted_as_reachable,
            record_addr_stats: cli.record_addr_stats,
            record_addr_data: cli.record_addr_data,
            extra_version_info: cli.extra_version_info.clone(),
        };

        Settings {
            engine,
            result,
            log,
            gcs,
            history,
            record_addr_stats: cli.record_addr_stats,
            record_addr_data: cli.record_addr_data,
            timestamp: cli.timestamp.clone(),
            extra_version_info: cli.extra_version_info.clone(),
            snapshot,
        }
    }
}
