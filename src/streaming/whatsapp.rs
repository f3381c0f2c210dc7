//! Streaming parser for WhatsApp TXT exports.
//!
//! WhatsApp exports are text files with various date formats:
//! - US: `[1/15/24, 10:30:45 AM] Sender: Message`
//! - EU (dot): `[15.01.24, 10:30:45] Sender: Message`
//! - EU (no bracket): `26.10.2025, 20:40 - Sender: Message`
//! - EU (slash): `15/01/2024, 10:30 - Sender: Message`
//!
//! This parser streams line-by-line, handling multi-line messages. The date
//! format is detected from the first [`DETECTION_SAMPLE_LINES`] lines starting
//! at the first timestamped one, within the first [`SNIFF_LIMIT`] bytes.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use crate::error::{ChatloadError, Result};
use crate::format::SNIFF_LIMIT;
use crate::model::{ChatKind, MessageKind, ParsedMessage, ParsedMeta, Platform};
use crate::parsing::whatsapp::{
    DETECTION_SAMPLE_LINES, WhatsAppDetector, WhatsAppLine, WhatsAppPatterns, parse_whatsapp_line,
    whatsapp_message_kind,
};

use super::traits::BatchEmitter;
use super::{ParseSink, ParseSummary, StreamParser, StreamingConfig};

const FORMAT: &str = "WhatsApp TXT";

/// Streaming parser for WhatsApp TXT exports.
#[derive(Debug, Default, Clone, Copy)]
pub struct WhatsAppStreamParser;

impl WhatsAppStreamParser {
    pub fn new() -> Self {
        Self
    }
}

impl StreamParser for WhatsAppStreamParser {
    fn name(&self) -> &'static str {
        FORMAT
    }

    fn platform(&self) -> Platform {
        Platform::WhatsApp
    }

    fn parse(
        &self,
        path: &Path,
        config: &StreamingConfig,
        sink: &mut dyn ParseSink,
    ) -> Result<ParseSummary> {
        let file = File::open(path)?;
        let total = file.metadata()?.len();
        let mut lines = LineReader::new(
            BufReader::with_capacity(config.buffer_size, file),
            config.max_message_size,
        );
        let mut emitter = BatchEmitter::new(sink, config, total);

        let detector = WhatsAppDetector::new();
        let sample = read_sample(&mut lines, &detector)?;

        let refs: Vec<&str> = sample.iter().map(String::as_str).collect();
        let format = detector.detect(&refs).ok_or_else(|| {
            ChatloadError::invalid_format(FORMAT, "no timestamped message lines found")
        })?;
        let patterns = WhatsAppPatterns::new(format)?;

        let classified: Vec<WhatsAppLine> = sample
            .iter()
            .map(|line| parse_whatsapp_line(line, &patterns))
            .collect();
        emitter.meta(ParsedMeta::new(
            chat_name(&config.fallback_name(path)),
            Platform::WhatsApp,
            sample_chat_kind(&classified),
        ))?;

        let mut assembler = MessageAssembler::new(config.max_message_size);
        let sample_bytes = lines.bytes_read();
        for line in classified {
            if let Some(message) = assembler.feed(line)? {
                emitter.push(message, sample_bytes)?;
            }
        }

        while let Some(line) = lines.next_line()? {
            if let Some(message) = assembler.feed(parse_whatsapp_line(&line, &patterns))? {
                emitter.push(message, lines.bytes_read())?;
            }
        }
        if let Some(message) = assembler.finish() {
            emitter.push(message, lines.bytes_read())?;
        }

        emitter.finish(lines.bytes_read())
    }
}

/// Derives the chat name from `WhatsApp Chat with X.txt` style file names.
fn chat_name(stem: &str) -> String {
    ["WhatsApp Chat with ", "WhatsApp Chat - "]
        .iter()
        .find_map(|prefix| stem.strip_prefix(prefix))
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map_or_else(|| stem.to_string(), ToString::to_string)
}

/// Reads lines until [`DETECTION_SAMPLE_LINES`] follow the first timestamped
/// one, giving up on finding it after [`SNIFF_LIMIT`] bytes.
fn read_sample<R: BufRead>(lines: &mut LineReader<R>, detector: &WhatsAppDetector) -> Result<Vec<String>> {
    let mut sample = Vec::new();
    let mut anchored = 0;
    while anchored < DETECTION_SAMPLE_LINES {
        if anchored == 0 && lines.bytes_read() >= SNIFF_LIMIT as u64 {
            break;
        }
        let Some(line) = lines.next_line()? else {
            break;
        };
        if anchored > 0 || detector.is_message_line(&line) {
            anchored += 1;
        }
        sample.push(line);
    }
    Ok(sample)
}

/// More than two distinct senders in the sample means a group.
fn sample_chat_kind(lines: &[WhatsAppLine]) -> ChatKind {
    let senders: HashSet<&str> = lines
        .iter()
        .filter_map(|line| match line {
            WhatsAppLine::Message { sender, .. } => Some(sender.as_str()),
            _ => None,
        })
        .collect();
    if senders.len() > 2 {
        ChatKind::Group
    } else {
        ChatKind::Private
    }
}

/// Reads lines with a length bound, decoding invalid UTF-8 lossily.
struct LineReader<R> {
    reader: R,
    buf: Vec<u8>,
    bytes_read: u64,
    max_line: usize,
}

impl<R: BufRead> LineReader<R> {
    fn new(reader: R, max_line: usize) -> Self {
        Self {
            reader,
            buf: Vec::with_capacity(4096),
            bytes_read: 0,
            max_line,
        }
    }

    fn next_line(&mut self) -> Result<Option<String>> {
        self.buf.clear();
        let limit = self.max_line as u64 + 1;
        let n = (&mut self.reader).take(limit).read_until(b'\n', &mut self.buf)?;
        if n == 0 {
            return Ok(None);
        }
        if self.buf.len() > self.max_line && self.buf.last() != Some(&b'\n') {
            return Err(ChatloadError::buffer_overflow(self.max_line, self.buf.len()));
        }
        self.bytes_read += n as u64;
        Ok(Some(String::from_utf8_lossy(&self.buf).into_owned()))
    }

    fn bytes_read(&self) -> u64 {
        self.bytes_read
    }
}

/// Joins continuation lines onto the message they belong to.
struct MessageAssembler {
    pending: Option<ParsedMessage>,
    max_size: usize,
}

impl MessageAssembler {
    fn new(max_size: usize) -> Self {
        Self {
            pending: None,
            max_size,
        }
    }

    /// Feeds one line; returns the previous message once a new one starts.
    fn feed(&mut self, line: WhatsAppLine) -> Result<Option<ParsedMessage>> {
        let started = match line {
            WhatsAppLine::Message {
                timestamp,
                sender,
                content,
            } => ParsedMessage {
                sender_platform_id: Some(sender.clone()),
                sender_name: Some(sender),
                timestamp,
                kind: Some(whatsapp_message_kind(&content)),
                content: (!content.trim().is_empty()).then_some(content),
                ..ParsedMessage::default()
            },
            WhatsAppLine::System {
                timestamp,
                sender,
                content,
            } => ParsedMessage {
                sender_platform_id: sender.clone(),
                sender_name: sender,
                timestamp,
                kind: Some(MessageKind::System),
                content: Some(content),
                ..ParsedMessage::default()
            },
            WhatsAppLine::Continuation(text) => {
                let text = text.trim_end();
                if let (Some(pending), false) = (self.pending.as_mut(), text.is_empty()) {
                    let content = pending.content.get_or_insert_with(String::new);
                    if !content.is_empty() {
                        content.push('\n');
                    }
                    content.push_str(text);
                    if content.len() > self.max_size {
                        return Err(ChatloadError::buffer_overflow(self.max_size, content.len()));
                    }
                }
                return Ok(None);
            }
        };
        Ok(self.pending.replace(started))
    }

    fn finish(self) -> Option<ParsedMessage> {
        self.pending
    }
}
