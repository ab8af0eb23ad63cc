//! Standalone decoder for the addr-data binary log (§4.7).
//!
//! The original ships this as a standalone `tools/addr_data_decoder.py`
//! script; here it is a separate bin target in the same workspace so it
//! shares the decoder implementation with the crawler itself instead of
//! reimplementing the format.

use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

/// Decode a `p2p-addr-data` log and print one JSON object per node record.
#[derive(Parser, Debug)]
#[command(name = "crawlerd-addr-data-decode")]
struct Args {
    /// Path to an addr-data log. Transparently un-xz's files ending in
    /// `.xz` before decoding, matching how `crawlerd` leaves the artifact
    /// on disk.
    path: PathBuf,
}

fn read_input(path: &std::path::Path) -> std::io::Result<Vec<u8>> {
    let file = std::fs::File::open(path)?;
    if path.extension().and_then(|e| e.to_str()) == Some("xz") {
        let mut decoder = xz2::read::XzDecoder::new(file);
        let mut bytes = Vec::new();
        decoder.read_to_end(&mut bytes)?;
        Ok(bytes)
    } else {
        let mut bytes = Vec::new();
        std::io::BufReader::new(file).read_to_end(&mut bytes)?;
        Ok(bytes)
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    let bytes = match read_input(&args.path) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("crawlerd-addr-data-decode: failed to read {}: {e}", args.path.display());
            return ExitCode::FAILURE;
        }
    };

    let records = match crawler_storage::decode_addr_log(&bytes) {
        Ok(records) => records,
        Err(e) => {
            eprintln!("crawlerd-addr-data-decode: failed to decode {}: {e}", args.path.display());
            return ExitCode::FAILURE;
        }
    };

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for record in &records {
        let entries: Vec<serde_json::Value> = record
            .entries
            .iter()
            .map(|e| {
                serde_json::json!({
                    "addr_id": e.addr_id,
                    "last_seen": e.last_seen,
                    "network_type": e.network_type.to_string(),
                })
            })
            .collect();
        let line = serde_json::json!({ "node": record.node, "entries": entries });
        if let Err(e) = std::io::Write::write_all(&mut out, format!("{line}\n").as_bytes()) {
            eprintln!("crawlerd-addr-data-decode: failed to write output: {e}");
            return ExitCode::FAILURE;
        }
    }

    ExitCode::SUCCESS
}
