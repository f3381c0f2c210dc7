//! Logging setup.
//!
//! Library code only emits `tracing` events; binaries call [`init`] once.
//! Events go to stderr, and additionally to a daily-rotated
//! `chatload.log` when [`LoggingConfig::dir`] is set.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::config::LoggingConfig;
use crate::error::{ChatloadError, Result};

/// Log file name inside [`LoggingConfig::dir`].
pub const LOG_FILE_NAME: &str = "chatload.log";

/// Guard that keeps the file writer alive
///
/// When dropped, flushes any pending log writes.
#[derive(Debug)]
pub struct LoggingGuard {
    _guard: Option<WorkerGuard>,
}

/// Initialize the logging system
///
/// `RUST_LOG` overrides `config.level` when set.
pub fn init(config: &LoggingConfig) -> Result<LoggingGuard> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| ChatloadError::Config(format!("invalid log level '{}': {e}", config.level)))?;

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(config.ansi)
        .with_target(false);

    let (file_layer, guard) = match &config.dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = RollingFileAppender::new(Rotation::DAILY, dir, LOG_FILE_NAME);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| ChatloadError::Config(format!("logging already initialized: {e}")))?;

    tracing::debug!(
        level = %config.level,
        dir = ?config.dir,
        "Logging initialized"
    );

    Ok(LoggingGuard { _guard: guard })
}

/// Initialize logging for tests (captured by the test harness)
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .with_span_events(FmtSpan::CLOSE)
        .try_init();
}
