//! Streaming parsers for memory-efficient processing of large chat exports.
//!
//! Exports can be gigabytes of JSON. Every parser here walks the file once
//! and pushes records into a [`ParseSink`] in bounded batches, so memory
//! use is `O(batch_size)` plus a small header regardless of file size.
//!
//! # Architecture
//!
//! - [`StreamParser`]: one implementation per supported export variant
//! - [`ParseSink`]: receives meta, members, message batches and progress
//! - [`JsonArrayReader`]: byte-level walker over `{ ..., "messages": [ ... ] }`
//!
//! # Example
//!
//! ```rust,no_run
//! use chatload::model::{ParsedMember, ParsedMessage, ParsedMeta};
//! use chatload::streaming::{ParseSink, StreamParser, StreamingConfig, TelegramStreamParser};
//!
//! struct Count(usize);
//!
//! impl ParseSink for Count {
//!     fn on_meta(&mut self, _: ParsedMeta) -> chatload::Result<()> { Ok(()) }
//!     fn on_members(&mut self, _: Vec<ParsedMember>) -> chatload::Result<()> { Ok(()) }
//!     fn on_message_batch(&mut self, batch: Vec<ParsedMessage>) -> chatload::Result<()> {
//!         self.0 += batch.len();
//!         Ok(())
//!     }
//! }
//!
//! let mut sink = Count(0);
//! TelegramStreamParser::new()
//!     .parse("result.json".as_ref(), &StreamingConfig::default(), &mut sink)
//!     .unwrap();
//! println!("{} messages", sink.0);
//! ```
//!
//! # Supported Formats
//!
//! - Telegram JSON (via [`TelegramStreamParser`])
//! - Discord JSON (via [`DiscordStreamParser`])
//! - Instagram JSON (via [`InstagramStreamParser`])
//! - WhatsApp TXT (via [`WhatsAppStreamParser`])

mod discord;
mod error;
mod instagram;
pub mod json;
mod telegram;
pub(crate) mod traits;
mod whatsapp;

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

pub use discord::DiscordStreamParser;
pub use error::{StreamingError, StreamingResult};
pub use instagram::InstagramStreamParser;
pub use json::JsonArrayReader;
pub use telegram::TelegramStreamParser;
pub use traits::{ParseSink, ParseSummary, StreamParser, StreamingConfig};
pub use crate::parsing::whatsapp::DETECTION_SAMPLE_LINES;
pub use whatsapp::WhatsAppStreamParser;

use crate::error::{ChatloadError, ParseErrorKind};

/// Opens a JSON export for streaming; returns the reader and the file size.
pub(crate) fn open_json(
    path: &Path,
    config: &StreamingConfig,
) -> crate::Result<(JsonArrayReader<BufReader<File>>, u64)> {
    let file = File::open(path)?;
    let total = file.metadata()?.len();
    let reader = BufReader::with_capacity(config.buffer_size, file);
    Ok((JsonArrayReader::new(reader, config.max_message_size), total))
}

/// Attaches format and path context to a streaming failure.
pub(crate) fn parse_failure(format: &'static str, path: &Path, err: StreamingError) -> ChatloadError {
    match err {
        StreamingError::Io(e) => ChatloadError::Io(e),
        StreamingError::BufferOverflow {
            max_size,
            actual_size,
        } => ChatloadError::buffer_overflow(max_size, actual_size),
        StreamingError::Json(e) => ChatloadError::Parse {
            format,
            source: ParseErrorKind::Json(e),
            path: Some(path.to_path_buf()),
        },
        other => ChatloadError::parse(format, other.to_string(), Some(path.to_path_buf())),
    }
}

/// File name without extension, used as a fallback chat name.
pub(crate) fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "chat".to_string())
}
