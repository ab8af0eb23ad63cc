//! `crawlerd`: the CLI binary wiring DNS seeding, the crawl engine, the
//! history store and artifact output together (§4.9, §6).
//!
//! Mirrors `run.py`'s top-level flow: parse settings, sanity-check them
//! before the logger exists (§7 band 3), initialize logging, run the
//! crawl (optionally a second history-driven pass), then persist results.

mod cli;
mod error;
mod gcs;
mod logging;
mod output;
mod settings;

use std::collections::HashSet;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use clap::Parser;

use crawler_chain::{now_unix, Address, Node};
use crawler_network::{CrawlerStatistics, Engine, PeerObserver};
use crawler_storage::{AddrLogWriter, History};

use cli::Cli;
use error::StartupError;
use output::{ArtifactStore, GcsStore, LocalFsStore};
use settings::Settings;

/// §7 band 3 checks that must happen before the logger is initialized:
/// missing GCS credentials when upload is requested, or a credentials path
/// that doesn't exist.
fn sanity_check_settings(settings: &Settings) -> Result<(), StartupError> {
    if settings.gcs.enabled {
        match &settings.gcs.credentials {
            None => return Err(StartupError::MissingGcsCredentials),
            Some(path) if !path.exists() => return Err(StartupError::GcsCredentialsNotFound(path.clone())),
            Some(_) => {}
        }
    }
    Ok(())
}

fn ensure_result_dir(settings: &Settings) -> Result<(), StartupError> {
    std::fs::create_dir_all(&settings.result.dir)
        .map_err(|source| StartupError::ResultDirUnavailable { path: settings.result.dir.clone(), source })
}

/// Feeds every `getaddr` round into the optional addr-data log and the
/// optional per-address statistics accumulator (§4.7, §3), the two things
/// `crawler-network`'s engine deliberately knows nothing about.
struct Observer {
    addr_log: Option<Mutex<AddrLogWriter>>,
    stats: Arc<CrawlerStatistics>,
    record_addr_stats: bool,
}

impl Observer {
    /// Closes the addr-data log, if one is open, writing its trailing `EOF`
    /// marker (§4.7). Takes `self` by value so this can only happen once,
    /// after every worker pass has finished observing peers.
    fn finish(self) -> std::io::Result<()> {
        if let Some(mutex) = self.addr_log {
            mutex.into_inner().expect("addr log writer mutex poisoned").close()?;
        }
        Ok(())
    }
}

impl PeerObserver for Observer {
    fn observe_peers(&self, source: &Node, addrs: &HashSet<Address>) {
        if let Some(mutex) = &self.addr_log {
            let entries: Vec<Address> = addrs.iter().cloned().collect();
            let mut writer = mutex.lock().expect("addr log writer mutex poisoned");
            if let Err(e) = writer.append_node(&source.to_string(), &entries) {
                tracing::warn!(node = %source, error = %e, "failed to append addr-data record");
            }
        }
        if self.record_addr_stats {
            let now = now_unix();
            for addr in addrs {
                self.stats.record_address_observation(addr.clone(), now);
            }
        }
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let settings = Settings::from_cli(&cli);

    if let Err(e) = sanity_check_settings(&settings) {
        eprintln!("crawlerd: {e}");
        return e.exit_code();
    }
    if let Err(e) = ensure_result_dir(&settings) {
        eprintln!("crawlerd: {e}");
        return e.exit_code();
    }

    if let Err(e) = logging::init(&settings.log.level, settings.log.store_debug_log, &settings.log.debug_log_path) {
        eprintln!("crawlerd: failed to initialize logging: {e:#}");
        return ExitCode::FAILURE;
    }

    match run(settings).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "crawl run failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(settings: Settings) -> anyhow::Result<()> {
    let run_started = Instant::now();
    let time_started = chrono::Utc::now().format("%Y-%m-%dT%H-%M-%SZ").to_string();

    tracing::info!(num_workers = settings.engine.num_workers, "starting crawl");

    let engine = Engine::new(settings.engine.clone());

    let addr_log = if settings.record_addr_data {
        Some(Mutex::new(AddrLogWriter::create(&settings.result.addr_data_bin)?))
    } else {
        None
    };
    let observer = Arc::new(Observer {
        addr_log,
        stats: Arc::clone(engine.stats()),
        record_addr_stats: settings.record_addr_stats,
    });
    let observer_dyn: Arc<dyn PeerObserver> = observer.clone();

    engine.seed().await;
    engine.run_pass(Some(Arc::clone(&observer_dyn))).await;

    // §4.6 step 4: an optional second pass seeded from the persistent
    // reachable-node history, run only if there is anything to add.
    let mut history = settings.history.clone().map(History::load).transpose()?;
    if let Some(history) = &history {
        let historical_nodes = history.get_reachable_nodes()?;
        if !historical_nodes.is_empty() {
            tracing::info!(count = historical_nodes.len(), "merging historical reachable nodes for a second pass");
            engine.merge_historical(historical_nodes).await;
            engine.run_pass(Some(observer_dyn)).await;
        }
    }

    let reachable = engine.frontier().reachable_nodes().await;
    let unreachable = engine.frontier().unreachable_nodes().await;
    let nodes_by_seed = engine.frontier().nodes_by_seed().await;

    if let Some(history) = &mut history {
        let summary = history.update_and_persist(&reachable, &settings.timestamp, env!("CARGO_PKG_VERSION"))?;
        tracing::info!(
            added = summary.added,
            retries_reset = summary.retries_reset,
            retries_decremented = summary.retries_decremented,
            removed = summary.removed,
            old_size = summary.old_size,
            new_size = summary.new_size,
            "updated reachable-node history"
        );
    }

    let observer =
        Arc::try_unwrap(observer).map_err(|_| anyhow::anyhow!("peer observer still referenced after engine run"))?;
    observer.finish()?;

    let mut artifact_paths = Vec::new();

    if settings.record_addr_data {
        match output::compress_xz_in_place(&settings.result.addr_data_bin) {
            Ok(path) => artifact_paths.push(path),
            Err(e) => tracing::warn!(error = %e, "failed to compress addr-data log"),
        }
    }

    if let Some(csv_path) = output::write_reachable_nodes_csv(&settings.result.reachable_nodes_csv, &reachable)? {
        artifact_paths.push(csv_path);
    }

    let crawler_stats_dest = output::add_suffix(&settings.result.crawler_stats_json, ".bz2");
    output::write_crawler_stats_json(
        &crawler_stats_dest,
        &settings.snapshot,
        &time_started,
        run_started.elapsed().as_secs_f64(),
        engine.stats().num_processed_nodes(),
        engine.stats().address_stats_snapshot().len(),
        &reachable,
        &unreachable,
        &nodes_by_seed,
    )?;
    artifact_paths.push(crawler_stats_dest);

    if settings.record_addr_stats {
        let address_stats_dest = output::add_suffix(&settings.result.address_stats_json, ".bz2");
        output::write_address_stats_json(&address_stats_dest, &engine.stats().address_stats_snapshot())?;
        artifact_paths.push(address_stats_dest);
    }

    if settings.log.store_debug_log {
        match output::compress_bz2_in_place(&settings.log.debug_log_path) {
            Ok(path) => artifact_paths.push(path),
            Err(e) => tracing::warn!(error = %e, "failed to compress debug log"),
        }
    }

    let store: Box<dyn ArtifactStore> = if settings.gcs.enabled {
        Box::new(GcsStore::new(settings.gcs.clone()))
    } else {
        Box::new(LocalFsStore)
    };
    store.persist(&artifact_paths)?;

    tracing::info!(
        reachable = reachable.len(),
        unreachable = unreachable.len(),
        runtime_s = run_started.elapsed().as_secs_f64(),
        "crawl finished"
    );
    Ok(())
}
