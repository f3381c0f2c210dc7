//! Streaming parser for Telegram JSON exports.
//!
//! Telegram exports are structured as:
//! ```json
//! {
//!   "name": "Chat Name",
//!   "type": "personal_chat",
//!   "messages": [
//!     {"id": 1, "type": "message", ...},
//!     {"id": 2, "type": "message", ...}
//!   ]
//! }
//! ```
//!
//! This parser streams the messages array without loading the entire file.
//! Telegram exports carry no member list; every member arrives with their
//! first message.

use std::path::Path;

use crate::error::Result;
use crate::model::Platform;
use crate::parsing::telegram::{parse_telegram_header, parse_telegram_value};

use super::traits::BatchEmitter;
use super::{ParseSink, ParseSummary, StreamParser, StreamingConfig, open_json, parse_failure};

const FORMAT: &str = "Telegram JSON";

/// Streaming parser for Telegram JSON exports.
///
/// # Example
///
/// ```rust,no_run
/// use chatload::streaming::{StreamParser, StreamingConfig, TelegramStreamParser};
/// # use chatload::streaming::ParseSink;
/// # fn run(sink: &mut dyn ParseSink) -> chatload::Result<()> {
/// let parser = TelegramStreamParser::new();
/// let summary = parser.parse("result.json".as_ref(), &StreamingConfig::default(), sink)?;
/// println!("{} messages", summary.records);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct TelegramStreamParser;

impl TelegramStreamParser {
    pub fn new() -> Self {
        Self
    }
}

impl StreamParser for TelegramStreamParser {
    fn name(&self) -> &'static str {
        FORMAT
    }

    fn platform(&self) -> Platform {
        Platform::Telegram
    }

    fn parse(
        &self,
        path: &Path,
        config: &StreamingConfig,
        sink: &mut dyn ParseSink,
    ) -> Result<ParseSummary> {
        let (mut reader, total) = open_json(path, config)?;
        let mut emitter = BatchEmitter::new(sink, config, total);

        let header = reader
            .open_array("messages")
            .map_err(|e| parse_failure(FORMAT, path, e))?;
        emitter.meta(parse_telegram_header(&header, &config.fallback_name(path)))?;

        while let Some(value) = reader.next_value().map_err(|e| parse_failure(FORMAT, path, e))? {
            emitter.push(parse_telegram_value(&value), reader.bytes_read())?;
        }
        reader.finish().map_err(|e| parse_failure(FORMAT, path, e))?;

        emitter.finish(reader.bytes_read())
    }
}
