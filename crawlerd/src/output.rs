//! The external "Output" collaborator (§4.9): turns the engine's
//! terminal state into the file artifacts named in §6, matching
//! `output.py::Output` (`write_reachable_nodes`, `write_crawler_statistics`,
//! `compress_debug_log`, `upload_files_to_gcs`).

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use bzip2::write::BzEncoder;
use bzip2::Compression as BzCompression;
use serde::Serialize;
use serde_json::{json, Value};
use xz2::write::XzEncoder;

use crawler_chain::{Node, NetworkType};

use crate::settings::{GcsSettings, SettingsSnapshot};

/// One row of `<...>_reachable_nodes.csv`, matching the `relevant_stats`
/// list in `node.py::get_stats`. Field names keep the original's wording
/// even though our `NodeStats` carries millisecond durations internally
/// (`handshake_duration` here is milliseconds, not the original's seconds
/// float) since downstream consumers key off column names, not units.
#[derive(Debug, Serialize)]
struct ReachableRow {
    host: String,
    port: u16,
    network: String,
    seed_distance: u32,
    handshake_timestamp: Option<i64>,
    time_connect: Option<i64>,
    handshake_attempts: u32,
    handshake_duration: Option<i64>,
    version: Option<i32>,
    services: Option<u64>,
    user_agent: Option<String>,
    latest_block: Option<i32>,
    relay: Option<bool>,
    version_reply_timestamp_remote: Option<i64>,
    requested_addrs: bool,
    advertised_addrs_total: u32,
    advertised_addrs_ipv4: u32,
    advertised_addrs_ipv6: u32,
    advertised_addrs_onion_v2: u32,
    advertised_addrs_onion_v3: u32,
    advertised_addrs_i2p: u32,
    advertised_addrs_cjdns: u32,
}

impl From<&Node> for ReachableRow {
    fn from(node: &Node) -> ReachableRow {
        let s = &node.stats;
        ReachableRow {
            host: node.address.host().to_owned(),
            port: node.address.port(),
            network: node.address.network_type().to_string(),
            seed_distance: node.seed_distance,
            handshake_timestamp: s.handshake_timestamp,
            time_connect: s.time_connect_ms,
            handshake_attempts: s.handshake_attempts,
            handshake_duration: s.handshake_duration_ms,
            version: s.version,
            services: s.services,
            user_agent: s.user_agent.clone(),
            latest_block: s.latest_block,
            relay: s.relay,
            version_reply_timestamp_remote: s.version_reply_timestamp_remote,
            requested_addrs: s.requested_addrs,
            advertised_addrs_total: s.advertised_addrs.total(),
            advertised_addrs_ipv4: s.advertised_addrs.count(NetworkType::Ipv4),
            advertised_addrs_ipv6: s.advertised_addrs.count(NetworkType::Ipv6),
            advertised_addrs_onion_v2: s.advertised_addrs.count(NetworkType::OnionV2),
            advertised_addrs_onion_v3: s.advertised_addrs.count(NetworkType::OnionV3),
            advertised_addrs_i2p: s.advertised_addrs.count(NetworkType::I2p),
            advertised_addrs_cjdns: s.advertised_addrs.count(NetworkType::Cjdns),
        }
    }
}

/// Appends a compression suffix to a path's full filename rather than
/// replacing its extension, matching `Output.add_suffix` (`foo.csv` +
/// `.bz2` -> `foo.csv.bz2`).
pub fn add_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut os_string = path.as_os_str().to_owned();
    os_string.push(suffix);
    PathBuf::from(os_string)
}

fn log_write_result(dest: &Path, compressed_len: u64, uncompressed_len: usize, runtime: std::time::Duration) {
    tracing::info!(
        path = %dest.display(),
        size_kb = compressed_len as f64 / 1024.0,
        uncompressed_kb = uncompressed_len as f64 / 1024.0,
        ratio = uncompressed_len as f64 / compressed_len.max(1) as f64,
        runtime_s = runtime.as_secs_f64(),
        "wrote artifact"
    );
}

/// §6 `<...>_reachable_nodes.csv`: one row per reachable node, sorted by
/// `handshake_timestamp`, bz2-compressed directly (no uncompressed
/// intermediate ever touches disk, matching `write_reachable_nodes`'s
/// `bz2.open(dest, "wt")`).
pub fn write_reachable_nodes_csv(dest_base: &Path, reachable: &[Node]) -> io::Result<Option<PathBuf>> {
    if reachable.is_empty() {
        tracing::warn!("no reachable nodes found, not writing reachable nodes CSV");
        return Ok(None);
    }

    let start = Instant::now();
    let mut rows: Vec<ReachableRow> = reachable.iter().map(ReachableRow::from).collect();
    rows.sort_by_key(|r| r.handshake_timestamp.unwrap_or(i64::MIN));

    let mut buf = Vec::new();
    {
        let mut writer = csv::Writer::from_writer(&mut buf);
        for row in &rows {
            writer.serialize(row).map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        }
        writer.flush()?;
    }

    let dest = add_suffix(dest_base, ".bz2");
    let file = File::create(&dest)?;
    let mut encoder = BzEncoder::new(file, BzCompression::best());
    encoder.write_all(&buf)?;
    let file = encoder.finish()?;
    log_write_result(&dest, file.metadata()?.len(), buf.len(), start.elapsed());
    Ok(Some(dest))
}

fn node_count_stats(nodes: &[Node]) -> Value {
    let mut obj = serde_json::Map::new();
    obj.insert("total".into(), json!(nodes.len()));
    let unknown = nodes.iter().filter(|n| n.address.network_type() == NetworkType::Unknown).count();
    obj.insert("unknown".into(), json!(unknown));
    for net in NetworkType::ALL {
        let count = nodes.iter().filter(|n| n.address.network_type() == net).count();
        obj.insert(net.to_string(), json!(count));
    }
    Value::Object(obj)
}

fn write_json_bz2(dest: &Path, value: &Value) -> io::Result<()> {
    let start = Instant::now();
    let bytes = serde_json::to_vec_pretty(value).map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
    let file = File::create(dest)?;
    let mut encoder = BzEncoder::new(file, BzCompression::best());
    encoder.write_all(&bytes)?;
    let file = encoder.finish()?;
    log_write_result(dest, file.metadata()?.len(), bytes.len(), start.elapsed());
    Ok(())
}

/// §6 `<...>_crawler_stats.json`: settings snapshot, wall-clock started,
/// runtime, set-size counts (overall and per DNS seed), and the reachable/
/// unreachable node lists, matching `write_crawler_statistics`.
#[allow(clippy::too_many_arguments)]
pub fn write_crawler_stats_json(
    dest: &Path,
    settings: &SettingsSnapshot,
    time_started: &str,
    runtime_seconds: f64,
    num_processed_nodes: u64,
    num_advertised: usize,
    reachable: &[Node],
    unreachable: &[Node],
    nodes_by_seed: &HashMap<String, Vec<Node>>,
) -> io::Result<()> {
    let data = json!({
        "crawler_settings": settings,
        "time_started": time_started,
        "runtime_seconds": runtime_seconds,
        "num_processed_nodes": num_processed_nodes,
        "num_reachable": node_count_stats(reachable),
        "num_unreachable": node_count_stats(unreachable),
        "num_advertised": num_advertised,
        "num_nodes_from_seed": nodes_by_seed.iter().map(|(seed, nodes)| (seed.clone(), node_count_stats(nodes))).collect::<serde_json::Map<_, _>>(),
        "list_reachable": reachable.iter().map(|n| n.to_string()).collect::<Vec<_>>(),
        "list_unreachable": unreachable.iter().map(|n| n.to_string()).collect::<Vec<_>>(),
        "list_nodes_from_seed": nodes_by_seed.iter().map(|(seed, nodes)| (seed.clone(), nodes.iter().map(|n| n.to_string()).collect::<Vec<_>>())).collect::<serde_json::Map<_, _>>(),
    });
    write_json_bz2(dest, &data)
}

/// §6 `<...>_address_stats.json`, written only when `--record-addr-stats`
/// is set (`output.py::persist`'s conditional write).
pub fn write_address_stats_json(dest: &Path, stats: &HashMap<crawler_chain::Address, crawler_network::AddressStats>) -> io::Result<()> {
    let map: serde_json::Map<String, Value> = stats
        .iter()
        .map(|(addr, s)| (addr.to_string(), json!({"seen_by_age": s.seen_by_age, "seen_by_timestamp": s.seen_by_timestamp})))
        .collect();
    write_json_bz2(dest, &Value::Object(map))
}

/// xz-compresses `path_in` in place, matching `Output.lzma_compress_file`
/// (`delete_input=True`): used for the addr-data binary log, which the
/// core writes uncompressed (§4.7, SPEC_FULL §4.2).
pub fn compress_xz_in_place(path_in: &Path) -> io::Result<PathBuf> {
    let start = Instant::now();
    let path_out = path_in.with_extension(format!("{}.xz", path_in.extension().and_then(|e| e.to_str()).unwrap_or("bin")));
    let uncompressed_len = std::fs::metadata(path_in)?.len();
    {
        let input = File::open(path_in)?;
        let output = File::create(&path_out)?;
        let mut encoder = XzEncoder::new(output, 6);
        io::copy(&mut io::BufReader::new(input), &mut encoder)?;
        encoder.finish()?;
    }
    std::fs::remove_file(path_in)?;
    log_write_result(&path_out, std::fs::metadata(&path_out)?.len(), uncompressed_len as usize, start.elapsed());
    Ok(path_out)
}

/// bz2-compresses `path_in` in place, matching `Output.compress_debug_log`.
pub fn compress_bz2_in_place(path_in: &Path) -> io::Result<PathBuf> {
    let start = Instant::now();
    let path_out = path_in.with_extension(format!(
        "{}.bz2",
        path_in.extension().and_then(|e| e.to_str()).unwrap_or("txt")
    ));
    let uncompressed_len = std::fs::metadata(path_in)?.len();
    {
        let mut input = File::open(path_in)?;
        let output = File::create(&path_out)?;
        let mut encoder = BzEncoder::new(output, BzCompression::best());
        io::copy(&mut input, &mut encoder)?;
        encoder.finish()?;
    }
    std::fs::remove_file(path_in)?;
    log_write_result(&path_out, std::fs::metadata(&path_out)?.len(), uncompressed_len as usize, start.elapsed());
    Ok(path_out)
}

/// Where finished artifacts end up (SPEC_FULL §4.9 `ArtifactStore`).
/// `LocalFsStore` is a no-op: every writer above already leaves its output
/// on the local filesystem. `GcsStore` additionally uploads.
pub trait ArtifactStore: Send + Sync {
    fn persist(&self, paths: &[PathBuf]) -> anyhow::Result<()>;
}

pub struct LocalFsStore;

impl ArtifactStore for LocalFsStore {
    fn persist(&self, _paths: &[PathBuf]) -> anyhow::Result<()> {
        Ok(())
    }
}

pub struct GcsStore {
    settings: GcsSettings,
}

impl GcsStore {
    pub fn new(settings: GcsSettings) -> GcsStore {
        GcsStore { settings }
    }
}

impl ArtifactStore for GcsStore {
    fn persist(&self, paths: &[PathBuf]) -> anyhow::Result<()> {
        let credentials = self
            .settings
            .credentials
            .as_ref()
            .expect("sanity_check_settings guarantees credentials are present when store_to_gcs is set");
        crate::gcs::upload_files(credentials, &self.settings.bucket, &self.settings.location, paths)
    }
}
