//! Export format detection.
//!
//! The [`FormatRegistry`] holds an ordered list of [`FormatDescriptor`]s.
//! Detection reads a bounded prefix of the file ([`SNIFF_LIMIT`] bytes) once
//! and asks each descriptor in ascending priority whether it recognizes it;
//! the first match wins.
//!
//! # Example
//!
//! ```rust,no_run
//! use chatload::format::{ExportFormat, FormatRegistry};
//!
//! let registry = FormatRegistry::new();
//! let descriptor = registry.detect_or_fail("result.json".as_ref()).unwrap();
//! assert_eq!(descriptor.format, ExportFormat::TelegramJson);
//! ```

use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ChatloadError, Result};
use crate::model::Platform;
use crate::parsing::whatsapp::detect_whatsapp_format;
use crate::preprocess::{Preprocessor, Slimming, TempWorkspace};
use crate::streaming::{
    DiscordStreamParser, InstagramStreamParser, StreamParser, TelegramStreamParser, WhatsAppStreamParser,
};

/// Bytes of the file inspected during detection.
pub const SNIFF_LIMIT: usize = 64 * 1024;

/// Default size above which heavy formats are slimmed first (50 MiB).
pub const DEFAULT_PREPROCESS_THRESHOLD: u64 = 50 * 1024 * 1024;

/// Supported export variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[non_exhaustive]
pub enum ExportFormat {
    /// Telegram Desktop `result.json`
    TelegramJson,
    /// DiscordChatExporter JSON
    DiscordJson,
    /// Instagram `message_1.json`
    InstagramJson,
    /// WhatsApp "Export chat" text file
    #[serde(rename = "whatsapp-txt")]
    WhatsAppTxt,
}

impl ExportFormat {
    /// Returns the identifier used in configs and on the command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::TelegramJson => "telegram-json",
            ExportFormat::DiscordJson => "discord-json",
            ExportFormat::InstagramJson => "instagram-json",
            ExportFormat::WhatsAppTxt => "whatsapp-txt",
        }
    }

    /// Returns the human-readable name, matching the parser name.
    pub fn display_name(&self) -> &'static str {
        match self {
            ExportFormat::TelegramJson => "Telegram JSON",
            ExportFormat::DiscordJson => "Discord JSON",
            ExportFormat::InstagramJson => "Instagram JSON",
            ExportFormat::WhatsAppTxt => "WhatsApp TXT",
        }
    }

    pub fn platform(&self) -> Platform {
        match self {
            ExportFormat::TelegramJson => Platform::Telegram,
            ExportFormat::DiscordJson => Platform::Discord,
            ExportFormat::InstagramJson => Platform::Instagram,
            ExportFormat::WhatsAppTxt => Platform::WhatsApp,
        }
    }

    /// Returns a fresh parser for this format.
    pub fn parser(&self) -> Box<dyn StreamParser> {
        match self {
            ExportFormat::TelegramJson => Box::new(TelegramStreamParser::new()),
            ExportFormat::DiscordJson => Box::new(DiscordStreamParser::new()),
            ExportFormat::InstagramJson => Box::new(InstagramStreamParser::new()),
            ExportFormat::WhatsAppTxt => Box::new(WhatsAppStreamParser::new()),
        }
    }

    /// Returns all formats in default priority order.
    pub fn all() -> &'static [ExportFormat] {
        &[
            ExportFormat::TelegramJson,
            ExportFormat::DiscordJson,
            ExportFormat::InstagramJson,
            ExportFormat::WhatsAppTxt,
        ]
    }

    /// Returns all accepted names.
    pub fn all_names() -> &'static [&'static str] {
        &["telegram-json", "discord-json", "instagram-json", "whatsapp-txt"]
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportFormat {
    type Err = ChatloadError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "telegram-json" | "telegram" | "tg" => Ok(ExportFormat::TelegramJson),
            "discord-json" | "discord" | "dc" => Ok(ExportFormat::DiscordJson),
            "instagram-json" | "instagram" | "ig" => Ok(ExportFormat::InstagramJson),
            "whatsapp-txt" | "whatsapp" | "wa" => Ok(ExportFormat::WhatsAppTxt),
            _ => Err(ChatloadError::invalid_format(
                "export",
                format!(
                    "Unknown format: '{}'. Expected one of: {}",
                    s,
                    ExportFormat::all_names().join(", ")
                ),
            )),
        }
    }
}

/// What a sniff predicate gets to look at.
#[derive(Debug, Clone, Copy)]
pub struct SniffInput<'a> {
    /// Lowercased extension, empty when absent
    pub extension: &'a str,
    /// At most [`SNIFF_LIMIT`] leading bytes
    pub prefix: &'a [u8],
}

/// One supported export variant.
#[derive(Debug, Clone)]
pub struct FormatDescriptor {
    pub format: ExportFormat,
    pub name: &'static str,
    pub platform: Platform,
    /// Lower is tried first
    pub priority: u32,
    sniff: fn(&SniffInput<'_>) -> bool,
    slimming: Option<Slimming>,
}

impl FormatDescriptor {
    /// Creates a descriptor with the format's default name and platform.
    pub fn new(format: ExportFormat, priority: u32, sniff: fn(&SniffInput<'_>) -> bool) -> Self {
        Self {
            format,
            name: format.display_name(),
            platform: format.platform(),
            priority,
            sniff,
            slimming: None,
        }
    }

    /// Marks the format as embedding heavy payloads that `slimming` strips.
    #[must_use]
    pub fn with_slimming(mut self, slimming: Slimming) -> Self {
        self.slimming = Some(slimming);
        self
    }

    pub fn sniff(&self, input: &SniffInput<'_>) -> bool {
        (self.sniff)(input)
    }

    pub fn parser(&self) -> Box<dyn StreamParser> {
        self.format.parser()
    }

    pub fn slimming(&self) -> Option<Slimming> {
        self.slimming
    }

    /// Heavy format and larger than `threshold`.
    pub fn needs_preprocess(&self, file_size: u64, threshold: u64) -> bool {
        self.slimming.is_some() && file_size > threshold
    }
}

/// Ordered set of known formats.
#[derive(Debug, Clone)]
pub struct FormatRegistry {
    descriptors: Vec<FormatDescriptor>,
    preprocess_threshold: u64,
}

impl Default for FormatRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FormatRegistry {
    /// Creates the registry of built-in formats.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register(
            FormatDescriptor::new(ExportFormat::TelegramJson, 10, sniff_telegram)
                .with_slimming(Slimming::Telegram),
        );
        registry.register(
            FormatDescriptor::new(ExportFormat::DiscordJson, 20, sniff_discord)
                .with_slimming(Slimming::Discord),
        );
        registry.register(FormatDescriptor::new(ExportFormat::InstagramJson, 30, sniff_instagram));
        registry.register(FormatDescriptor::new(ExportFormat::WhatsAppTxt, 40, sniff_whatsapp));
        registry
    }

    /// Creates a registry with no formats.
    pub fn empty() -> Self {
        Self {
            descriptors: Vec::new(),
            preprocess_threshold: DEFAULT_PREPROCESS_THRESHOLD,
        }
    }

    /// Sets the size above which heavy formats are preprocessed.
    #[must_use]
    pub fn with_preprocess_threshold(mut self, bytes: u64) -> Self {
        self.preprocess_threshold = bytes;
        self
    }

    pub fn preprocess_threshold(&self) -> u64 {
        self.preprocess_threshold
    }

    /// Adds a descriptor, keeping ascending priority. Equal priorities keep
    /// registration order.
    pub fn register(&mut self, descriptor: FormatDescriptor) {
        let at = self
            .descriptors
            .partition_point(|d| d.priority <= descriptor.priority);
        self.descriptors.insert(at, descriptor);
    }

    pub fn descriptors(&self) -> &[FormatDescriptor] {
        &self.descriptors
    }

    pub fn get(&self, format: ExportFormat) -> Option<&FormatDescriptor> {
        self.descriptors.iter().find(|d| d.format == format)
    }

    /// Returns the first descriptor recognizing `path`, if any.
    pub fn detect(&self, path: &Path) -> Result<Option<&FormatDescriptor>> {
        let prefix = read_prefix(path)?;
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        let input = SniffInput {
            extension: &extension,
            prefix: &prefix,
        };
        let found = self.descriptors.iter().find(|d| d.sniff(&input));
        match found {
            Some(d) => tracing::debug!(path = %path.display(), format = d.name, "format detected"),
            None => tracing::debug!(path = %path.display(), "no format matched"),
        }
        Ok(found)
    }

    /// Like [`detect`](Self::detect), failing with
    /// [`ChatloadError::UnrecognizedFormat`] when nothing matches.
    pub fn detect_or_fail(&self, path: &Path) -> Result<&FormatDescriptor> {
        self.detect(path)?
            .ok_or_else(|| ChatloadError::unrecognized(path))
    }

    /// Whether `path` must be slimmed before parsing.
    pub fn needs_preprocess(&self, path: &Path) -> Result<bool> {
        let Some(descriptor) = self.detect(path)? else {
            return Ok(false);
        };
        let size = std::fs::metadata(path)?.len();
        Ok(descriptor.needs_preprocess(size, self.preprocess_threshold))
    }

    /// Returns the preprocessor for `path` when one is required.
    pub fn get_preprocessor(
        &self,
        path: &Path,
        workspace: &TempWorkspace,
    ) -> Result<Option<Preprocessor>> {
        let Some(descriptor) = self.detect(path)? else {
            return Ok(None);
        };
        let size = std::fs::metadata(path)?.len();
        if !descriptor.needs_preprocess(size, self.preprocess_threshold) {
            return Ok(None);
        }
        Ok(descriptor
            .slimming()
            .map(|slimming| Preprocessor::new(slimming, workspace.clone())))
    }
}

fn read_prefix(path: &Path) -> Result<Vec<u8>> {
    let mut prefix = Vec::with_capacity(SNIFF_LIMIT);
    File::open(path)?
        .take(SNIFF_LIMIT as u64)
        .read_to_end(&mut prefix)?;
    Ok(prefix)
}

/// Chat `type` values Telegram Desktop writes at the top of an export.
const TELEGRAM_CHAT_TYPES: [&str; 8] = [
    "personal_chat",
    "bot_chat",
    "saved_messages",
    "private_group",
    "private_supergroup",
    "public_supergroup",
    "private_channel",
    "public_channel",
];

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn contains(haystack: &[u8], needle: &str) -> bool {
    find(haystack, needle.as_bytes()).is_some()
}

fn skip_whitespace(bytes: &[u8], mut at: usize) -> usize {
    while bytes.get(at).is_some_and(u8::is_ascii_whitespace) {
        at += 1;
    }
    at
}

/// String values stored under `"key":` anywhere in `haystack`.
///
/// Escapes are not decoded; a value containing `\"` ends early, which is
/// fine for matching plain identifiers.
fn string_values<'a>(haystack: &'a [u8], key: &str) -> impl Iterator<Item = &'a [u8]> + use<'a> {
    let needle = format!("\"{key}\"").into_bytes();
    let mut pos = 0;
    std::iter::from_fn(move || {
        while let Some(found) = find(&haystack[pos..], &needle) {
            pos += found + needle.len();
            let colon = skip_whitespace(haystack, pos);
            if haystack.get(colon) != Some(&b':') {
                continue;
            }
            let quote = skip_whitespace(haystack, colon + 1);
            if haystack.get(quote) != Some(&b'"') {
                continue;
            }
            let start = quote + 1;
            let end = start + haystack[start..].iter().position(|&b| b == b'"')?;
            pos = end;
            return Some(&haystack[start..end]);
        }
        None
    })
}

fn sniff_telegram(input: &SniffInput<'_>) -> bool {
    let chat_type = || {
        string_values(input.prefix, "type")
            .any(|value| TELEGRAM_CHAT_TYPES.iter().any(|t| t.as_bytes() == value))
    };
    input.extension == "json"
        && contains(input.prefix, "\"messages\"")
        && (contains(input.prefix, "\"date_unixtime\"")
            || contains(input.prefix, "\"from_id\"")
            || chat_type())
}

fn sniff_discord(input: &SniffInput<'_>) -> bool {
    input.extension == "json"
        && contains(input.prefix, "\"guild\"")
        && contains(input.prefix, "\"channel\"")
}

fn sniff_instagram(input: &SniffInput<'_>) -> bool {
    input.extension == "json"
        && contains(input.prefix, "\"participants\"")
        && (contains(input.prefix, "\"sender_name\"") || contains(input.prefix, "\"timestamp_ms\""))
}

fn sniff_whatsapp(input: &SniffInput<'_>) -> bool {
    if input.extension != "txt" {
        return false;
    }
    let text = String::from_utf8_lossy(input.prefix);
    let lines: Vec<&str> = text.lines().collect();
    detect_whatsapp_format(&lines).is_some()
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::TempDir;

    use super::*;

    fn write(dir: &TempDir, name: &str, body: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        File::create(&path).unwrap().write_all(body.as_bytes()).unwrap();
        path
    }

    // =========================================================================
    // ExportFormat
    // =========================================================================

    #[test]
    fn test_format_from_str() {
        assert_eq!("telegram".parse::<ExportFormat>().unwrap(), ExportFormat::TelegramJson);
        assert_eq!("WA".parse::<ExportFormat>().unwrap(), ExportFormat::WhatsAppTxt);
        assert!("xml".parse::<ExportFormat>().is_err());
    }

    #[test]
    fn test_format_serde() {
        let json = serde_json::to_string(&ExportFormat::DiscordJson).unwrap();
        assert_eq!(json, "\"discord-json\"");
        let back: ExportFormat = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ExportFormat::DiscordJson);
    }

    #[test]
    fn test_parser_names_match() {
        for format in ExportFormat::all() {
            assert_eq!(format.parser().name(), format.display_name());
        }
    }

    // =========================================================================
    // Detection
    // =========================================================================

    #[test]
    fn test_detect_each_format() {
        let dir = TempDir::new().unwrap();
        let registry = FormatRegistry::new();
        let cases = [
            (
                "result.json",
                r#"{"name": "x", "type": "personal_chat", "messages": [{"id": 1, "date_unixtime": "1"}]}"#,
                ExportFormat::TelegramJson,
            ),
            (
                "dc.json",
                r#"{"guild": {"name": "g"}, "channel": {"name": "c"}, "messages": []}"#,
                ExportFormat::DiscordJson,
            ),
            (
                "message_1.json",
                r#"{"participants": [{"name": "a"}], "messages": [{"sender_name": "a", "timestamp_ms": 1}]}"#,
                ExportFormat::InstagramJson,
            ),
            (
                "chat.txt",
                "[1/15/24, 10:30:45 AM] Alice: Hello\n",
                ExportFormat::WhatsAppTxt,
            ),
        ];
        for (name, body, expected) in cases {
            let path = write(&dir, name, body);
            let found = registry.detect(&path).unwrap().map(|d| d.format);
            assert_eq!(found, Some(expected), "{name}");
        }
    }

    #[test]
    fn test_detect_unrecognized() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "notes.md", "# nothing here");
        let registry = FormatRegistry::new();
        assert!(registry.detect(&path).unwrap().is_none());
        assert!(registry.detect_or_fail(&path).unwrap_err().is_unrecognized_format());
    }

    #[test]
    fn test_extension_is_required() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "chat.log", "[1/15/24, 10:30:45 AM] Alice: Hello\n");
        assert!(FormatRegistry::new().detect(&path).unwrap().is_none());
    }

    #[test]
    fn test_priority_order_wins() {
        let dir = TempDir::new().unwrap();
        // Matches both the Telegram and the Discord sniffers.
        let path = write(
            &dir,
            "ambiguous.json",
            r#"{"guild": {}, "channel": {}, "type": "private_group", "messages": []}"#,
        );
        let registry = FormatRegistry::new();
        for _ in 0..5 {
            let found = registry.detect(&path).unwrap().map(|d| d.format);
            assert_eq!(found, Some(ExportFormat::TelegramJson));
        }
    }

    #[test]
    fn test_telegram_chat_type_must_be_a_type_value() {
        let dir = TempDir::new().unwrap();
        let registry = FormatRegistry::new();

        // A Discord channel with a key that merely ends in `_group`.
        let path = write(
            &dir,
            "dc.json",
            r#"{"guild": {"id": "1"}, "channel": {"id": "2", "category_group": "x"}, "messages": []}"#,
        );
        let found = registry.detect(&path).unwrap().map(|d| d.format);
        assert_eq!(found, Some(ExportFormat::DiscordJson));

        // A Telegram chat type under some other key is not a marker.
        let path = write(&dir, "other.json", r#"{"name": "private_group", "messages": []}"#);
        assert!(registry.detect(&path).unwrap().is_none());

        let path = write(&dir, "result.json", r#"{"name": "x", "type" : "public_supergroup", "messages": []}"#);
        let found = registry.detect(&path).unwrap().map(|d| d.format);
        assert_eq!(found, Some(ExportFormat::TelegramJson));
    }

    #[test]
    fn test_whatsapp_detected_after_long_opening_message() {
        let dir = TempDir::new().unwrap();
        // The export starts inside a long message whose header was cut off.
        let mut body = String::new();
        for i in 0..60 {
            body.push_str(&format!("step {i} of the recipe\n"));
        }
        body.push_str("[1/15/24, 10:31:00 AM] Bob: thanks\n");
        let path = write(&dir, "chat.txt", &body);
        let found = FormatRegistry::new().detect(&path).unwrap().map(|d| d.format);
        assert_eq!(found, Some(ExportFormat::WhatsAppTxt));
    }

    #[test]
    fn test_register_keeps_priority_order() {
        let mut registry = FormatRegistry::empty();
        registry.register(FormatDescriptor::new(ExportFormat::DiscordJson, 20, sniff_discord));
        registry.register(FormatDescriptor::new(ExportFormat::TelegramJson, 10, sniff_telegram));
        registry.register(FormatDescriptor::new(ExportFormat::InstagramJson, 20, sniff_instagram));
        let order: Vec<_> = registry.descriptors().iter().map(|d| d.format).collect();
        assert_eq!(
            order,
            vec![
                ExportFormat::TelegramJson,
                ExportFormat::DiscordJson,
                ExportFormat::InstagramJson
            ]
        );
    }

    #[test]
    fn test_sniff_reads_bounded_prefix() {
        let dir = TempDir::new().unwrap();
        // Markers only appear past the sniff window.
        let padding = " ".repeat(SNIFF_LIMIT + 10);
        let path = write(
            &dir,
            "late.json",
            &format!("{{{padding}\"guild\": {{}}, \"channel\": {{}}, \"messages\": []}}"),
        );
        assert!(FormatRegistry::new().detect(&path).unwrap().is_none());
    }

    // =========================================================================
    // Preprocess decision
    // =========================================================================

    #[test]
    fn test_needs_preprocess_threshold() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "result.json",
            r#"{"type": "personal_chat", "messages": [{"id": 1, "date_unixtime": "1"}]}"#,
        );
        let registry = FormatRegistry::new();
        assert!(!registry.needs_preprocess(&path).unwrap());

        let tiny = FormatRegistry::new().with_preprocess_threshold(10);
        assert!(tiny.needs_preprocess(&path).unwrap());
    }

    #[test]
    fn test_light_formats_never_preprocess() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "chat.txt", "[1/15/24, 10:30:45 AM] Alice: Hello\n");
        let registry = FormatRegistry::new().with_preprocess_threshold(0);
        assert!(!registry.needs_preprocess(&path).unwrap());
        let workspace = TempWorkspace::new(dir.path().join("tmp")).unwrap();
        assert!(registry.get_preprocessor(&path, &workspace).unwrap().is_none());
    }
}
