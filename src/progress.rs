//! Progress reporting for long-running pipeline stages.
//!
//! Progress is advisory: it never affects correctness and exists purely so a
//! caller can show a live indicator. Parsers emit [`ProgressEvent`]s at a
//! bounded cadence (every `progress_interval` records plus a final event),
//! never per record.
//!
//! # Example
//!
//! ```rust
//! use chatload::progress::{ProgressCallback, ProgressEvent, ProgressStage};
//! use std::sync::Arc;
//!
//! let callback: ProgressCallback = Arc::new(|event| {
//!     println!("{}: {:.1}%", event.stage, event.percentage);
//! });
//!
//! callback(ProgressEvent::new(ProgressStage::Parsing, 500, 1000, 42));
//! ```

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};

/// Pipeline stage a progress event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStage {
    Detecting,
    Preprocessing,
    Parsing,
    Importing,
    Done,
    Error,
}

impl ProgressStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressStage::Detecting => "detecting",
            ProgressStage::Preprocessing => "preprocessing",
            ProgressStage::Parsing => "parsing",
            ProgressStage::Importing => "importing",
            ProgressStage::Done => "done",
            ProgressStage::Error => "error",
        }
    }
}

impl fmt::Display for ProgressStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single progress update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub stage: ProgressStage,
    /// Bytes of the input consumed so far.
    pub bytes_read: u64,
    /// Total input size in bytes (0 when unknown).
    pub total_bytes: u64,
    /// Records (messages) handled so far.
    pub records_processed: u64,
    /// Completion of the current stage, 0.0 - 100.0
    pub percentage: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ProgressEvent {
    /// Creates an event, deriving `percentage` from the byte counters.
    pub fn new(stage: ProgressStage, bytes_read: u64, total_bytes: u64, records: u64) -> Self {
        Self {
            stage,
            bytes_read,
            total_bytes,
            records_processed: records,
            percentage: percentage(bytes_read, total_bytes),
            message: None,
        }
    }

    /// Creates an event that only carries a stage and a message.
    pub fn stage(stage: ProgressStage, message: impl Into<String>) -> Self {
        let percentage = if stage == ProgressStage::Done { 100.0 } else { 0.0 };
        Self {
            stage,
            bytes_read: 0,
            total_bytes: 0,
            records_processed: 0,
            percentage,
            message: Some(message.into()),
        }
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Returns whether all input bytes were consumed.
    pub fn is_complete(&self) -> bool {
        self.total_bytes > 0 && self.bytes_read >= self.total_bytes
    }
}

fn percentage(done: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    ((done as f64 / total as f64) * 100.0).min(100.0)
}

/// Thread-safe callback receiving [`ProgressEvent`]s.
pub type ProgressCallback = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// Creates a no-op progress callback.
///
/// ```rust
/// use chatload::progress::{no_progress, ProgressEvent, ProgressStage};
///
/// let callback = no_progress();
/// callback(ProgressEvent::stage(ProgressStage::Detecting, "sniffing")); // Does nothing
/// ```
pub fn no_progress() -> ProgressCallback {
    Arc::new(|_| {})
}

/// Creates a progress callback that prints to stderr.
pub fn stderr_progress() -> ProgressCallback {
    Arc::new(|event| match &event.message {
        Some(msg) => eprintln!("[{}] {:.1}% {}", event.stage, event.percentage, msg),
        None => eprintln!(
            "[{}] {:.1}% ({} records)",
            event.stage, event.percentage, event.records_processed
        ),
    })
}

/// Wraps `inner` so the counters it receives never go backwards.
///
/// Every stage of a pipeline counts from zero against its own input, and
/// stage-only events carry no counts at all. The wrapper raises
/// `bytes_read`, `total_bytes` and `records_processed` to the highest value
/// seen so far, so `done` and `error` report the counts reached before them.
/// `percentage` stays per stage.
pub fn monotonic(inner: ProgressCallback) -> ProgressCallback {
    let high = Mutex::new(Watermark::default());
    Arc::new(move |mut event| {
        high.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .raise(&mut event);
        inner(event);
    })
}

#[derive(Debug, Default)]
struct Watermark {
    bytes_read: u64,
    total_bytes: u64,
    records: u64,
}

impl Watermark {
    fn raise(&mut self, event: &mut ProgressEvent) {
        self.bytes_read = self.bytes_read.max(event.bytes_read);
        self.total_bytes = self.total_bytes.max(event.total_bytes);
        self.records = self.records.max(event.records_processed);
        event.bytes_read = self.bytes_read;
        event.total_bytes = self.total_bytes;
        event.records_processed = self.records;
    }
}

/// Decides when a parser should emit the next progress event.
///
/// Events fire every `interval` records; [`ProgressTicker::finish`] produces
/// the closing event regardless of cadence.
#[derive(Debug, Clone)]
pub(crate) struct ProgressTicker {
    stage: ProgressStage,
    total_bytes: u64,
    interval: u64,
    next_at: u64,
}

impl ProgressTicker {
    pub(crate) fn new(stage: ProgressStage, total_bytes: u64, interval: usize) -> Self {
        let interval = interval.max(1) as u64;
        Self {
            stage,
            total_bytes,
            interval,
            next_at: interval,
        }
    }

    /// Returns an event when `records` crossed the next cadence boundary.
    pub(crate) fn tick(&mut self, bytes_read: u64, records: u64) -> Option<ProgressEvent> {
        if records < self.next_at {
            return None;
        }
        while self.next_at <= records {
            self.next_at += self.interval;
        }
        Some(ProgressEvent::new(
            self.stage,
            bytes_read.min(self.total_bytes),
            self.total_bytes,
            records,
        ))
    }

    pub(crate) fn finish(&self, records: u64) -> ProgressEvent {
        ProgressEvent::new(self.stage, self.total_bytes, self.total_bytes, records)
    }
}
