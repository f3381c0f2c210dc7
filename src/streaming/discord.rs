//! Streaming parser for DiscordChatExporter JSON exports.
//!
//! The export has `guild` and `channel` header objects followed by the
//! `messages` array. There is no member list; each author is announced
//! through [`ParseSink::on_members`] the first time they appear, so the
//! member row carries the account name and guild nickname.

use std::collections::HashSet;
use std::path::Path;

use crate::error::Result;
use crate::model::Platform;
use crate::parsing::discord::{parse_discord_header, parse_discord_value};

use super::traits::BatchEmitter;
use super::{ParseSink, ParseSummary, StreamParser, StreamingConfig, open_json, parse_failure};

const FORMAT: &str = "Discord JSON";

/// Streaming parser for DiscordChatExporter JSON exports.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscordStreamParser;

impl DiscordStreamParser {
    pub fn new() -> Self {
        Self
    }
}

impl StreamParser for DiscordStreamParser {
    fn name(&self) -> &'static str {
        FORMAT
    }

    fn platform(&self) -> Platform {
        Platform::Discord
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
        emitter.meta(parse_discord_header(&header, &config.fallback_name(path)))?;

        let mut announced: HashSet<String> = HashSet::new();
        while let Some(value) = reader.next_value().map_err(|e| parse_failure(FORMAT, path, e))? {
            let (message, author) = parse_discord_value(&value);
            if let Some(member) = author {
                if announced.insert(member.platform_id.clone()) {
                    emitter.members(vec![member])?;
                }
            }
            emitter.push(message, reader.bytes_read())?;
        }
        reader.finish().map_err(|e| parse_failure(FORMAT, path, e))?;

        emitter.finish(reader.bytes_read())
    }
}
