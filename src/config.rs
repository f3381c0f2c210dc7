//! Configuration for the import pipeline.
//!
//! Configuration is loaded from a TOML file (by default
//! `<config_dir>/chatload/config.toml`); every section and field is optional
//! and falls back to its default.
//!
//! ```toml
//! [import]
//! data_dir = "/var/lib/chatload"
//! preprocess_threshold = 52428800
//! batch_size = 5000
//!
//! [worker]
//! short_timeout = 30.0
//! long_timeout = 1800.0
//!
//! [logging]
//! level = "debug"
//! dir = "/var/log/chatload"
//! ```
//!
//! # Example
//!
//! ```rust
//! use chatload::config::ImportConfig;
//!
//! let config = ImportConfig::new()
//!     .with_data_dir("/tmp/chatload-data")
//!     .with_batch_size(1_000);
//! assert_eq!(config.streaming_config(1024).batch_size, 1_000);
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ChatloadError, Result};
use crate::format::DEFAULT_PREPROCESS_THRESHOLD;
use crate::streaming::StreamingConfig;

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub import: ImportConfig,
    pub worker: WorkerConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Reads a TOML configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
            .map_err(|e| ChatloadError::Config(format!("{}: {e}", path.display())))
    }

    /// Parses configuration from TOML text.
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| ChatloadError::Config(e.to_string()))
    }

    /// Loads `path` if given, else the default file if it exists, else defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }
        match Self::default_path() {
            Some(path) if path.is_file() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    /// `<config_dir>/chatload/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("chatload").join("config.toml"))
    }

    /// `<data_local_dir>/chatload`, or the temp dir when there is no home.
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("chatload")
    }

    /// `<system temp>/chatload`
    pub fn default_temp_dir() -> PathBuf {
        std::env::temp_dir().join("chatload")
    }
}

/// Settings for the import engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// Where session stores are created (`<data_dir>/sessions`)
    pub data_dir: PathBuf,

    /// Private directory for slimmed temp files
    pub temp_dir: PathBuf,

    /// Heavy formats above this size are slimmed first (default: 50MB)
    pub preprocess_threshold: u64,

    /// Files above this size use `large_file_batch_size` (default: 50MB)
    pub large_file_threshold: u64,

    /// Messages per batch (default: 5,000)
    pub batch_size: usize,

    /// Messages per batch for large files (default: 2,000)
    pub large_file_batch_size: usize,

    /// Records between progress events (default: 10,000)
    pub progress_interval: usize,

    /// Read buffer size (default: 64KB)
    pub buffer_size: usize,

    /// Largest single record accepted (default: 10MB)
    pub max_message_size: usize,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            data_dir: Config::default_data_dir(),
            temp_dir: Config::default_temp_dir(),
            preprocess_threshold: DEFAULT_PREPROCESS_THRESHOLD,
            large_file_threshold: DEFAULT_PREPROCESS_THRESHOLD,
            batch_size: 5_000,
            large_file_batch_size: 2_000,
            progress_interval: 10_000,
            buffer_size: 64 * 1024,
            max_message_size: 10 * 1024 * 1024,
        }
    }
}

impl ImportConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    #[must_use]
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = dir.into();
        self
    }

    #[must_use]
    pub fn with_preprocess_threshold(mut self, bytes: u64) -> Self {
        self.preprocess_threshold = bytes;
        self
    }

    #[must_use]
    pub fn with_large_file_threshold(mut self, bytes: u64) -> Self {
        self.large_file_threshold = bytes;
        self
    }

    #[must_use]
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    #[must_use]
    pub fn with_large_file_batch_size(mut self, size: usize) -> Self {
        self.large_file_batch_size = size;
        self
    }

    #[must_use]
    pub fn with_progress_interval(mut self, interval: usize) -> Self {
        self.progress_interval = interval;
        self
    }

    #[must_use]
    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// Parser settings for a file of `file_size` bytes.
    ///
    /// Large files get smaller batches so progress stays responsive.
    pub fn streaming_config(&self, file_size: u64) -> StreamingConfig {
        let batch_size = if file_size > self.large_file_threshold {
            self.large_file_batch_size
        } else {
            self.batch_size
        };
        StreamingConfig::new()
            .with_buffer_size(self.buffer_size)
            .with_max_message_size(self.max_message_size)
            .with_batch_size(batch_size)
            .with_progress_interval(self.progress_interval)
    }
}

/// Settings for the worker coordination layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Timeout for detect and preview requests (default: 30s)
    #[serde(with = "seconds")]
    pub short_timeout: Duration,

    /// Timeout for imports (default: 30min)
    #[serde(with = "seconds")]
    pub long_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            short_timeout: Duration::from_secs(30),
            long_timeout: Duration::from_secs(30 * 60),
        }
    }
}

impl WorkerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_short_timeout(mut self, timeout: Duration) -> Self {
        self.short_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_long_timeout(mut self, timeout: Duration) -> Self {
        self.long_timeout = timeout;
        self
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (default: "info"); `RUST_LOG` takes precedence
    pub level: String,

    /// Directory for a daily-rotated log file; stderr only when unset
    pub dir: Option<PathBuf>,

    /// Colored stderr output (default: true)
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            dir: None,
            ansi: true,
        }
    }
}

impl LoggingConfig {
    #[must_use]
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    #[must_use]
    pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }
}

/// Durations as fractional seconds.
mod seconds {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
