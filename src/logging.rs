//! Logging setup for the tile engine.
//!
//! The engine emits `tracing` events from the render thread and the
//! decode pool. This module wires both to a per-session log file and to
//! stdout: the file is truncated on startup so each session reads from
//! the top, and verbosity comes from `RUST_LOG`, defaulting to `info`
//! globally with the engine's own events at `debug`.

use std::fs::{self, File};
use std::io;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Keeps the log file writer alive; dropping it flushes and closes the
/// file.
pub struct LoggingGuard {
    _file_guard: WorkerGuard,
}

/// Open the session log file for writing, truncating any previous
/// session's contents and creating missing parent directories.
fn open_session_log(log_dir: &str, log_file: &str) -> io::Result<File> {
    fs::create_dir_all(log_dir)?;
    File::create(Path::new(log_dir).join(log_file))
}

/// Verbosity filter: `RUST_LOG` when set, otherwise `info` globally with
/// the engine's own targets at `debug`.
fn default_filter() -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,hipslayer=debug"))
}

/// Install the global tracing subscriber: compact single-line events to
/// `{log_dir}/{log_file}` (without ANSI colors) and to stdout.
///
/// # Errors
///
/// Returns an error when the log directory cannot be created or the log
/// file cannot be truncated.
pub fn init_logging(log_dir: &str, log_file: &str) -> Result<LoggingGuard, io::Error> {
    let session_log = open_session_log(log_dir, log_file)?;
    let (file_writer, file_guard) = tracing_appender::non_blocking(session_log);

    let file_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_ansi(false)
        .with_writer(file_writer);
    let stdout_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(io::stdout);

    tracing_subscriber::registry()
        .with(default_filter())
        .with(file_layer)
        .with(stdout_layer)
        .init();

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}

/// Default log directory path.
pub fn default_log_dir() -> &'static str {
    "logs"
}

/// Default log file name.
pub fn default_log_file() -> &'static str {
    "hipslayer.log"
}
