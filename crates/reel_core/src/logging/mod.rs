//! Logging infrastructure.
//!
//! Contents:
//! - `init_tracing` for the process-wide `tracing` subscriber, with an
//!   optional daily-rolling file
//! - Per-episode loggers with file + callback output
//! - Tail buffer for external tool output

mod episode_logger;
mod types;

pub(crate) use episode_logger::sanitize_filename;
pub use episode_logger::EpisodeLogger;
pub use types::{LogCallback, LogConfig, LogLevel, MessagePrefix};

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingSettings;

/// Install the global tracing subscriber.
///
/// RUST_LOG overrides the configured filter. When rolling files are enabled
/// and `logs_dir` is given, events are also written to `logs_dir/reel.log.<date>`;
/// keep the returned guard alive for as long as events should be flushed.
pub fn init_tracing(settings: &LoggingSettings, logs_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.filter));

    let stderr_layer = fmt::layer().with_target(true).with_thread_ids(false);

    match logs_dir.filter(|_| settings.rolling_file) {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "reel.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let _ = tracing_subscriber::registry()
                .with(stderr_layer)
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .with(filter)
                .try_init();
            Some(guard)
        }
        None => {
            let _ = tracing_subscriber::registry()
                .with(stderr_layer)
                .with(filter)
                .try_init();
            None
        }
    }
}

/// Warn-level tracing for tests; repeated calls are ignored.
#[cfg(test)]
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("warn")
        .with_test_writer()
        .try_init();
}
