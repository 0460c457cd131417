//! Logging infrastructure for the karaoke player.
//!
//! This module provides:
//! - Application-wide `tracing` setup (stderr plus an optional log file)
//! - Per-render loggers with file + callback output
//! - Compact mode with progress filtering
//! - Tail buffer of transcoder output for error reports
//!
//! # Example
//!
//! ```no_run
//! use kp_core::logging::{LogConfig, RenderLogger};
//!
//! let logger = RenderLogger::new(
//!     "render_song_Key2",
//!     "/path/to/logs",
//!     LogConfig::default(),
//!     None,
//! ).unwrap();
//!
//! logger.phase("Key/Tempo Render");
//! logger.command("ffmpeg -y -i song.mp4 ...");
//! logger.progress(50, 12);
//! logger.success("Render complete");
//! ```

mod render_logger;
mod types;

pub use render_logger::RenderLogger;
pub use types::{LogCallback, LogConfig, LogLevel, MessagePrefix};

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// File name of the application log inside the logs folder.
pub const APP_LOG_FILE: &str = "karaoke-player.log";

/// Initialize the global tracing subscriber.
///
/// - Respects `RUST_LOG`, falling back to `default_level`
/// - Writes to stderr
/// - Also writes to `<logs_dir>/karaoke-player.log` when `logs_dir` is given
///
/// Keep the returned guard alive for the lifetime of the process; dropping
/// it flushes and stops the file writer. Should be called once at startup.
pub fn init_tracing(default_level: LogLevel, logs_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(default_level.to_tracing_level()).into())
        .from_env_lossy();

    let (file_layer, guard) = match logs_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::never(dir, APP_LOG_FILE);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    guard
}

/// Initialize tracing for tests (only logs warnings and above).
#[cfg(test)]
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("warn")
        .with_test_writer()
        .try_init();
}
