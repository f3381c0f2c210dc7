//! Core traits for streaming parsers.
//!
//! This module defines the contract every format parser satisfies:
//! - [`StreamParser`] - walks one file, pushing records into a sink
//! - [`ParseSink`] - receives meta, members, message batches and progress
//! - [`StreamingConfig`] - buffer, batch and cadence settings
//!
//! The import engine and the preview counter are both written once against
//! [`ParseSink`], so their counts cannot drift apart.

use std::path::Path;

use super::file_stem;
use crate::error::Result;
use crate::model::{ParsedMember, ParsedMessage, ParsedMeta, Platform};
use crate::progress::{ProgressEvent, ProgressStage, ProgressTicker};

/// Receiver of parsed records.
///
/// Call order guaranteed by every parser:
/// 1. `on_meta` at most once, before any message batch
/// 2. `on_members` zero or more times
/// 3. `on_message_batch` zero or more times, each batch at most `batch_size`
///    long, messages in file order
///
/// `on_progress` may be interleaved anywhere. An error returned from any
/// callback aborts the parse and is propagated unchanged.
pub trait ParseSink {
    fn on_meta(&mut self, meta: ParsedMeta) -> Result<()>;

    fn on_members(&mut self, members: Vec<ParsedMember>) -> Result<()>;

    fn on_message_batch(&mut self, messages: Vec<ParsedMessage>) -> Result<()>;

    fn on_progress(&mut self, _event: ProgressEvent) {}
}

/// A parser that streams records from a file without loading it into memory.
///
/// Implementations hold at most `batch_size` messages plus a small header
/// at any time.
pub trait StreamParser: Send + Sync {
    /// Returns the human-readable name of this parser.
    fn name(&self) -> &'static str;

    /// Platform the parsed export comes from.
    fn platform(&self) -> Platform;

    /// Parses `path`, delivering everything to `sink`.
    ///
    /// # Errors
    ///
    /// Malformed syntax or an I/O failure aborts the whole parse. Records with
    /// an unexpected shape are delivered as partial messages instead.
    fn parse(
        &self,
        path: &Path,
        config: &StreamingConfig,
        sink: &mut dyn ParseSink,
    ) -> Result<ParseSummary>;
}

/// What a completed parse observed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseSummary {
    /// Messages delivered to the sink
    pub records: u64,
    pub bytes_read: u64,
}

/// Configuration options for streaming parsers.
///
/// # Examples
///
/// ```
/// use chatload::streaming::StreamingConfig;
///
/// let config = StreamingConfig::new()
///     .with_buffer_size(128 * 1024)
///     .with_batch_size(2_000);
/// assert_eq!(config.batch_size, 2_000);
/// ```
#[derive(Debug, Clone)]
pub struct StreamingConfig {
    /// Buffer size for file reading.
    ///
    /// Default: 64KB.
    pub buffer_size: usize,

    /// Maximum size of a single record in bytes.
    ///
    /// Default: 10MB. A larger record aborts the parse.
    pub max_message_size: usize,

    /// Messages buffered before the sink receives a batch.
    ///
    /// Default: 5,000.
    pub batch_size: usize,

    /// Report progress every N messages.
    ///
    /// Default: 10,000.
    pub progress_interval: usize,

    /// Chat name used when the export header carries none.
    ///
    /// Default: `None`, meaning the stem of the parsed file.
    pub display_name: Option<String>,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            buffer_size: 64 * 1024,             // 64KB
            max_message_size: 10 * 1024 * 1024, // 10MB
            batch_size: 5_000,
            progress_interval: 10_000,
            display_name: None,
        }
    }
}

impl StreamingConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the buffer size.
    #[must_use]
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    /// Sets the maximum record size.
    #[must_use]
    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// Sets the message batch size (minimum 1).
    #[must_use]
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Sets the progress reporting interval.
    #[must_use]
    pub fn with_progress_interval(mut self, interval: usize) -> Self {
        self.progress_interval = interval;
        self
    }

    /// Sets the chat name used when the header has none.
    #[must_use]
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Name a parser falls back to for `path`.
    pub(crate) fn fallback_name(&self, path: &Path) -> String {
        self.display_name.clone().unwrap_or_else(|| file_stem(path))
    }
}

/// Shared batching and cadence logic used by every parser.
pub(crate) struct BatchEmitter<'a> {
    sink: &'a mut dyn ParseSink,
    batch: Vec<ParsedMessage>,
    batch_size: usize,
    ticker: ProgressTicker,
    records: u64,
    bytes_read: u64,
    meta_sent: bool,
}

impl<'a> BatchEmitter<'a> {
    pub(crate) fn new(sink: &'a mut dyn ParseSink, config: &StreamingConfig, total_bytes: u64) -> Self {
        let batch_size = config.batch_size.max(1);
        Self {
            sink,
            batch: Vec::with_capacity(batch_size.min(8_192)),
            batch_size,
            ticker: ProgressTicker::new(ProgressStage::Parsing, total_bytes, config.progress_interval),
            records: 0,
            bytes_read: 0,
            meta_sent: false,
        }
    }

    /// Forwards meta once; later calls and calls after messages are dropped.
    pub(crate) fn meta(&mut self, meta: ParsedMeta) -> Result<()> {
        if self.meta_sent || self.records > 0 {
            return Ok(());
        }
        self.meta_sent = true;
        self.sink.on_meta(meta)
    }

    pub(crate) fn members(&mut self, members: Vec<ParsedMember>) -> Result<()> {
        if members.is_empty() {
            return Ok(());
        }
        self.sink.on_members(members)
    }

    pub(crate) fn push(&mut self, message: ParsedMessage, bytes_read: u64) -> Result<()> {
        self.batch.push(message);
        self.records += 1;
        self.bytes_read = bytes_read;
        if self.batch.len() >= self.batch_size {
            self.flush()?;
        }
        if let Some(event) = self.ticker.tick(self.bytes_read, self.records) {
            self.sink.on_progress(event);
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if self.batch.is_empty() {
            return Ok(());
        }
        let batch = std::mem::replace(&mut self.batch, Vec::with_capacity(self.batch_size.min(8_192)));
        self.sink.on_message_batch(batch)
    }

    pub(crate) fn finish(mut self, bytes_read: u64) -> Result<ParseSummary> {
        self.flush()?;
        self.sink.on_progress(self.ticker.finish(self.records));
        Ok(ParseSummary {
            records: self.records,
            bytes_read,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::testing::CollectSink;
    use super::*;
    use crate::model::{ChatKind, MessageKind, Platform};

    fn msg(i: i64) -> ParsedMessage {
        ParsedMessage::new("u", "User", i, MessageKind::Text)
    }

    #[test]
    fn test_streaming_config_default() {
        let config = StreamingConfig::default();
        assert_eq!(config.buffer_size, 64 * 1024);
        assert_eq!(config.max_message_size, 10 * 1024 * 1024);
        assert_eq!(config.batch_size, 5_000);
        assert_eq!(config.progress_interval, 10_000);
    }

    #[test]
    fn test_streaming_config_builder_chain() {
        let config = StreamingConfig::new()
            .with_buffer_size(256 * 1024)
            .with_max_message_size(20 * 1024 * 1024)
            .with_batch_size(0)
            .with_progress_interval(1000);

        assert_eq!(config.buffer_size, 256 * 1024);
        assert_eq!(config.max_message_size, 20 * 1024 * 1024);
        assert_eq!(config.batch_size, 1);
        assert_eq!(config.progress_interval, 1000);
    }

    #[test]
    fn test_emitter_respects_batch_size() {
        let mut sink = CollectSink::default();
        let config = StreamingConfig::new().with_batch_size(3);
        let mut emitter = BatchEmitter::new(&mut sink, &config, 100);
        for i in 0..7 {
            emitter.push(msg(i), i as u64 * 10).unwrap();
        }
        let summary = emitter.finish(100).unwrap();

        assert_eq!(summary.records, 7);
        let sizes: Vec<_> = sink.batches.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![3, 3, 1]);
        assert_eq!(sink.messages()[6].timestamp, Some(6));
    }

    #[test]
    fn test_emitter_meta_only_once_and_before_messages() {
        let mut sink = CollectSink::default();
        let config = StreamingConfig::new();
        let mut emitter = BatchEmitter::new(&mut sink, &config, 0);
        let meta = ParsedMeta::new("Chat", Platform::Telegram, ChatKind::Group);
        emitter.meta(meta.clone()).unwrap();
        emitter.meta(meta.clone()).unwrap();
        emitter.push(msg(1), 1).unwrap();
        emitter.finish(1).unwrap();

        assert_eq!(sink.meta.len(), 1);
        assert_eq!(sink.calls, vec!["meta", "batch"]);
    }

    #[test]
    fn test_emitter_progress_cadence() {
        let mut sink = CollectSink::default();
        let config = StreamingConfig::new().with_progress_interval(10).with_batch_size(4);
        let mut emitter = BatchEmitter::new(&mut sink, &config, 1000);
        for i in 0..25 {
            emitter.push(msg(i), (i as u64 + 1) * 40).unwrap();
        }
        emitter.finish(1000).unwrap();

        // Two cadence events plus the final one
        assert_eq!(sink.progress.len(), 3);
        let records: Vec<_> = sink.progress.iter().map(|e| e.records_processed).collect();
        assert_eq!(records, vec![10, 20, 25]);
        assert!(sink.progress.windows(2).all(|w| w[0].bytes_read <= w[1].bytes_read));
    }

    #[test]
    fn test_emitter_skips_empty_member_list() {
        let mut sink = CollectSink::default();
        let config = StreamingConfig::new();
        let mut emitter = BatchEmitter::new(&mut sink, &config, 0);
        emitter.members(Vec::new()).unwrap();
        emitter.finish(0).unwrap();
        assert!(sink.calls.is_empty());
    }
}
