//! Logger setup (§6 "Output": `--log-level`, `--store-debug-log`).
//!
//! Mirrors `run.py::init_logger`: a console layer at the configured level,
//! UTC timestamps, and, when requested, a second layer writing every event
//! at debug level or above to the run's debug-log file, later compressed
//! by [`crate::output`].

use std::fs::File;
use std::path::Path;

use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

pub fn init(level: &str, store_debug_log: bool, debug_log_path: &Path) -> anyhow::Result<()> {
    let console_filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    let console_layer = fmt::layer().with_timer(UtcTime::rfc_3339()).with_target(false).with_filter(console_filter);

    if store_debug_log {
        let file = File::create(debug_log_path)?;
        let file_layer = fmt::layer()
            .with_timer(UtcTime::rfc_3339())
            .with_ansi(false)
            .with_writer(file)
            .with_filter(EnvFilter::new("debug"));
        tracing_subscriber::registry().with(console_layer).with(file_layer).init();
        tracing::debug!(path = %debug_log_path.display(), "storing debug log to file");
    } else {
        tracing_subscriber::registry().with(console_layer).init();
    }

    Ok(())
}
