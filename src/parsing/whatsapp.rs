//! WhatsApp TXT export lines.
//!
//! WhatsApp exports one message per line, prefixed by a locale-dependent
//! timestamp; multi-line messages continue on lines without a prefix.
//! Lines with a timestamp but no `Sender:` part are system notices.

use chrono::NaiveDateTime;
use regex::Regex;

use crate::error::{ChatloadError, Result};
use crate::model::MessageKind;

/// Detected date format variants for WhatsApp exports.
///
/// WhatsApp exports vary by locale and platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateFormat {
    /// US format: M/D/YY or M/D/YYYY with optional AM/PM
    /// Example: [1/15/24, 10:30:45 AM]
    US,
    /// EU format with dots in brackets: DD.MM.YY or DD.MM.YYYY
    /// Example: [15.01.24, 10:30:45]
    EuDotBracketed,
    /// EU format with dots, no brackets: DD.MM.YYYY
    /// Example: 26.10.2025, 20:40 - Sender: Message
    EuDotNoBracket,
    /// EU format with slashes, no brackets: DD/MM/YYYY
    /// Example: 15/01/2024, 10:30 -
    EuSlash,
    /// Bracketed EU with slashes
    /// Example: [15/01/2024, 10:30:45]
    EuSlashBracketed,
}

impl DateFormat {
    /// Returns the date/time prefix pattern, without the sender part.
    fn prefix(self) -> &'static str {
        match self {
            // [1/15/24, 10:30:45 AM]
            DateFormat::US => {
                r"^\[(\d{1,2}/\d{1,2}/\d{2,4}),\s(\d{1,2}:\d{2}(?::\d{2})?(?:\s?[APap][Mm])?)\]\s"
            }
            // [15.01.24, 10:30:45]
            DateFormat::EuDotBracketed => r"^\[(\d{2}\.\d{2}\.\d{2,4}),\s(\d{2}:\d{2}(?::\d{2})?)\]\s",
            // 26.10.2025, 20:40 -
            DateFormat::EuDotNoBracket => r"^(\d{2}\.\d{2}\.\d{2,4}),\s(\d{2}:\d{2}(?::\d{2})?)\s-\s",
            // 15/01/2024, 10:30 -
            DateFormat::EuSlash => r"^(\d{2}/\d{2}/\d{2,4}),\s(\d{2}:\d{2}(?::\d{2})?)\s-\s",
            // [15/01/2024, 10:30:45]
            DateFormat::EuSlashBracketed => r"^\[(\d{2}/\d{2}/\d{2,4}),\s(\d{2}:\d{2}(?::\d{2})?)\]\s",
        }
    }

    /// Returns regex pattern for a `Sender: Message` line in this format.
    pub fn pattern(self) -> String {
        format!(r"{}([^:]+):\s?(.*)", self.prefix())
    }

    /// Returns regex pattern for a system line (timestamp, no sender).
    pub fn system_pattern(self) -> String {
        format!(r"{}(.*)", self.prefix())
    }

    /// Returns date parsing format strings for chrono.
    pub fn date_parse_formats(self) -> &'static [&'static str] {
        match self {
            DateFormat::US => &[
                "%m/%d/%y, %I:%M:%S %p",
                "%m/%d/%y, %I:%M %p",
                "%m/%d/%Y, %I:%M:%S %p",
                "%m/%d/%Y, %I:%M %p",
                "%m/%d/%y, %H:%M:%S",
                "%m/%d/%y, %H:%M",
                "%m/%d/%Y, %H:%M:%S",
                "%m/%d/%Y, %H:%M",
            ],
            DateFormat::EuDotBracketed | DateFormat::EuDotNoBracket => &[
                "%d.%m.%y, %H:%M:%S",
                "%d.%m.%y, %H:%M",
                "%d.%m.%Y, %H:%M:%S",
                "%d.%m.%Y, %H:%M",
            ],
            DateFormat::EuSlash | DateFormat::EuSlashBracketed => &[
                "%d/%m/%y, %H:%M:%S",
                "%d/%m/%y, %H:%M",
                "%d/%m/%Y, %H:%M:%S",
                "%d/%m/%Y, %H:%M",
            ],
        }
    }

    /// Returns all format variants.
    pub fn all() -> &'static [DateFormat] {
        &[
            DateFormat::US,
            DateFormat::EuDotBracketed,
            DateFormat::EuDotNoBracket,
            DateFormat::EuSlash,
            DateFormat::EuSlashBracketed,
        ]
    }
}

/// Parses date and time strings into unix seconds.
///
/// Exports carry no zone, so the wall-clock time is read as UTC.
pub fn parse_whatsapp_timestamp(date_str: &str, time_str: &str, format: DateFormat) -> Option<i64> {
    let datetime_str = format!("{date_str}, {time_str}");

    format
        .date_parse_formats()
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(&datetime_str, f).ok())
        .map(|naive| naive.and_utc().timestamp())
}

/// Check if a sender/content pair is a system notice rather than a chat message.
pub fn is_whatsapp_system_message(sender: &str, content: &str) -> bool {
    const NOTICES: [&str; 12] = [
        "messages and calls are end-to-end encrypted",
        "created group",
        "changed the subject",
        "changed this group's icon",
        "changed the group description",
        "deleted this group's icon",
        "changed their phone number",
        "joined using this group's invite link",
        "security code changed",
        "turned on disappearing messages",
        "turned off disappearing messages",
        "сообщения и звонки защищены сквозным шифрованием",
    ];

    let sender_lower = sender.trim().to_lowercase();
    if sender_lower.is_empty() || sender_lower == "whatsapp" || sender_lower == "system" {
        return true;
    }
    let content_lower = content.to_lowercase();
    NOTICES.iter().any(|n| content_lower.contains(n))
}

/// Classifies message text, recognizing media placeholders.
pub fn whatsapp_message_kind(content: &str) -> MessageKind {
    let lower = content.trim().to_lowercase();
    let attached = lower
        .strip_prefix("<attached:")
        .map(|rest| rest.trim_end_matches('>').trim().to_string());

    if let Some(file) = attached {
        return if file.contains("photo") || file.ends_with(".jpg") || file.ends_with(".png") {
            MessageKind::Image
        } else if file.contains("video") || file.ends_with(".mp4") {
            MessageKind::Video
        } else if file.contains("audio") || file.ends_with(".opus") {
            MessageKind::Voice
        } else if file.contains("sticker") || file.ends_with(".webp") {
            MessageKind::Sticker
        } else {
            MessageKind::File
        };
    }

    match lower.as_str() {
        "image omitted" | "photo omitted" | "gif omitted" => MessageKind::Image,
        "video omitted" => MessageKind::Video,
        "audio omitted" => MessageKind::Voice,
        "sticker omitted" => MessageKind::Sticker,
        "contact card omitted" => MessageKind::Contact,
        "<media omitted>" => MessageKind::Other,
        "missed voice call" | "missed video call" | "voice call" | "video call" => MessageKind::Call,
        _ if lower.ends_with("document omitted") => MessageKind::File,
        _ if lower.starts_with("location: ") => MessageKind::Location,
        _ if lower.starts_with("poll:") => MessageKind::Poll,
        _ if (lower.starts_with("http://") || lower.starts_with("https://"))
            && !lower.contains(char::is_whitespace) =>
        {
            MessageKind::Link
        }
        _ => MessageKind::Text,
    }
}

/// One classified line of a WhatsApp export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WhatsAppLine {
    /// `Sender: text`
    Message {
        timestamp: Option<i64>,
        sender: String,
        content: String,
    },
    /// Timestamped notice; `sender` is set when the notice names one
    System {
        timestamp: Option<i64>,
        sender: Option<String>,
        content: String,
    },
    /// Continuation of the previous message
    Continuation(String),
}

/// Compiled line patterns for one detected [`DateFormat`].
#[derive(Debug, Clone)]
pub struct WhatsAppPatterns {
    format: DateFormat,
    message: Regex,
    system: Regex,
}

impl WhatsAppPatterns {
    /// Compiles the patterns for `format`.
    ///
    /// # Errors
    ///
    /// Returns a parse error if a pattern fails to compile.
    pub fn new(format: DateFormat) -> Result<Self> {
        let compile = |pattern: String| {
            Regex::new(&pattern).map_err(|e| ChatloadError::whatsapp_parse(e.to_string(), None))
        };
        Ok(Self {
            format,
            message: compile(format.pattern())?,
            system: compile(format.system_pattern())?,
        })
    }

    pub fn format(&self) -> DateFormat {
        self.format
    }
}

/// Strips direction marks and odd spaces that iOS exports insert.
fn normalize_line(line: &str) -> String {
    line.trim_end_matches(['\r', '\n'])
        .chars()
        .filter(|c| !matches!(c, '\u{200e}' | '\u{200f}' | '\u{feff}'))
        .map(|c| if matches!(c, '\u{202f}' | '\u{a0}') { ' ' } else { c })
        .collect()
}

/// Classifies one raw line.
pub fn parse_whatsapp_line(line: &str, patterns: &WhatsAppPatterns) -> WhatsAppLine {
    let line = normalize_line(line);

    if let Some(caps) = patterns.message.captures(&line) {
        let timestamp = parse_whatsapp_timestamp(&caps[1], &caps[2], patterns.format);
        let sender = caps[3].trim().to_string();
        let content = caps[4].to_string();
        if is_whatsapp_system_message(&sender, &content) {
            let lower = sender.to_lowercase();
            let sender = (!sender.is_empty() && lower != "whatsapp" && lower != "system")
                .then_some(sender);
            return WhatsAppLine::System {
                timestamp,
                sender,
                content,
            };
        }
        return WhatsAppLine::Message {
            timestamp,
            sender,
            content,
        };
    }

    if let Some(caps) = patterns.system.captures(&line) {
        return WhatsAppLine::System {
            timestamp: parse_whatsapp_timestamp(&caps[1], &caps[2], patterns.format),
            sender: None,
            content: caps[3].to_string(),
        };
    }

    WhatsAppLine::Continuation(line)
}

/// Lines scored for date-format detection, counted from the first
/// timestamped line.
pub const DETECTION_SAMPLE_LINES: usize = 20;

/// Scores lines against every known [`DateFormat`].
///
/// Compiled once and reused while a sample is being collected.
#[derive(Debug, Clone)]
pub struct WhatsAppDetector {
    candidates: Vec<(DateFormat, Regex)>,
}

impl WhatsAppDetector {
    pub fn new() -> Self {
        let candidates = DateFormat::all()
            .iter()
            .filter_map(|&f| Regex::new(&f.pattern()).ok().map(|re| (f, re)))
            .collect();
        Self { candidates }
    }

    /// Whether `line` starts a message in any known format.
    pub fn is_message_line(&self, line: &str) -> bool {
        let line = normalize_line(line);
        self.candidates.iter().any(|(_, re)| re.is_match(&line))
    }

    /// Picks the most likely format for `lines`.
    ///
    /// Leading lines that match no format (the tail of a multi-line message
    /// cut by the export) are skipped; scoring covers the
    /// [`DETECTION_SAMPLE_LINES`] lines from the first timestamped one. Ties
    /// go to the earlier format in [`DateFormat::all`].
    pub fn detect(&self, lines: &[&str]) -> Option<DateFormat> {
        let first = lines.iter().position(|line| self.is_message_line(line))?;
        let mut scores = vec![0usize; self.candidates.len()];
        for line in lines.iter().skip(first).take(DETECTION_SAMPLE_LINES) {
            let line = normalize_line(line);
            for (score, (_, re)) in scores.iter_mut().zip(&self.candidates) {
                if re.is_match(&line) {
                    *score += 1;
                }
            }
        }

        let best = *scores.iter().max()?;
        let winner = scores.iter().position(|&s| s == best)?;
        Some(self.candidates[winner].0)
    }
}

impl Default for WhatsAppDetector {
    fn default() -> Self {
        Self::new()
    }
}

/// Auto-detect date format by analyzing sample lines.
///
/// Returns `None` if no line carries a recognizable timestamp.
pub fn detect_whatsapp_format(lines: &[&str]) -> Option<DateFormat> {
    WhatsAppDetector::new().detect(lines)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterns(format: DateFormat) -> WhatsAppPatterns {
        WhatsAppPatterns::new(format).unwrap()
    }

    #[test]
    fn test_detect_format_us() {
        let lines = vec![
            "[1/15/24, 10:30:45 AM] Alice: Hello",
            "[1/15/24, 10:31:00 AM] Bob: Hi there",
        ];
        assert_eq!(detect_whatsapp_format(&lines), Some(DateFormat::US));
    }

    #[test]
    fn test_detect_format_eu_dot_bracketed() {
        let lines = vec![
            "[15.01.24, 10:30:45] Alice: Hello",
            "[15.01.24, 10:31:00] Bob: Hi there",
        ];
        assert_eq!(
            detect_whatsapp_format(&lines),
            Some(DateFormat::EuDotBracketed)
        );
    }

    #[test]
    fn test_detect_format_eu_dot_no_bracket() {
        let lines = vec![
            "26.10.2025, 20:40 - Alice: Hello",
            "26.10.2025, 20:41 - Bob: Hi there",
        ];
        assert_eq!(
            detect_whatsapp_format(&lines),
            Some(DateFormat::EuDotNoBracket)
        );
    }

    #[test]
    fn test_detect_format_eu_slash() {
        let lines = vec![
            "15/01/2024, 10:30 - Alice: Hello",
            "15/01/2024, 10:31 - Bob: Hi there",
        ];
        assert_eq!(detect_whatsapp_format(&lines), Some(DateFormat::EuSlash));
    }

    #[test]
    fn test_detect_format_none() {
        assert_eq!(detect_whatsapp_format(&["just some notes", "nothing here"]), None);
    }

    #[test]
    fn test_detect_skips_leading_continuation_lines() {
        let mut lines: Vec<String> = (0..40).map(|i| format!("line {i} of a long pasted note")).collect();
        lines.push("15/01/2024, 10:30 - Alice: Hello".into());
        lines.push("15/01/2024, 10:31 - Bob: Hi".into());
        let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
        assert_eq!(detect_whatsapp_format(&refs), Some(DateFormat::EuSlash));

        let detector = WhatsAppDetector::new();
        assert!(!detector.is_message_line(refs[0]));
        assert!(detector.is_message_line(refs[40]));
    }

    #[test]
    fn test_is_system_message() {
        assert!(is_whatsapp_system_message(
            "Alice",
            "Messages and calls are end-to-end encrypted"
        ));
        assert!(!is_whatsapp_system_message("Alice", "I added salt"));
        assert!(!is_whatsapp_system_message("Bob", "<Media omitted>"));
        assert!(is_whatsapp_system_message("", "Some message"));
        assert!(is_whatsapp_system_message("   ", "Some message"));
    }

    #[test]
    fn test_parse_timestamp_us() {
        let ts = parse_whatsapp_timestamp("1/15/24", "10:30:45 AM", DateFormat::US);
        assert_eq!(ts, Some(1_705_314_645));
    }

    #[test]
    fn test_parse_timestamp_eu_dot() {
        let ts = parse_whatsapp_timestamp("15.01.24", "10:30:45", DateFormat::EuDotBracketed);
        assert_eq!(ts, Some(1_705_314_645));

        let ts2 = parse_whatsapp_timestamp("26.10.2025", "20:40", DateFormat::EuDotNoBracket);
        assert!(ts2.is_some());
    }

    #[test]
    fn test_parse_line_message() {
        let p = patterns(DateFormat::EuSlash);
        let line = parse_whatsapp_line("15/01/2024, 10:30 - Alice: Hello: world", &p);
        assert_eq!(
            line,
            WhatsAppLine::Message {
                timestamp: Some(1_705_314_600),
                sender: "Alice".into(),
                content: "Hello: world".into(),
            }
        );
    }

    #[test]
    fn test_parse_line_system_and_continuation() {
        let p = patterns(DateFormat::EuSlash);
        assert!(matches!(
            parse_whatsapp_line("15/01/2024, 10:30 - Alice added Bob", &p),
            WhatsAppLine::System { .. }
        ));
        assert_eq!(
            parse_whatsapp_line("second line of a message", &p),
            WhatsAppLine::Continuation("second line of a message".into())
        );
    }

    #[test]
    fn test_parse_line_ios_marks() {
        let p = patterns(DateFormat::US);
        let line = "\u{200e}[1/15/24, 10:30:45\u{202f}AM] Alice: \u{200e}image omitted";
        match parse_whatsapp_line(line, &p) {
            WhatsAppLine::Message { sender, content, timestamp } => {
                assert_eq!(sender, "Alice");
                assert_eq!(whatsapp_message_kind(&content), MessageKind::Image);
                assert!(timestamp.is_some());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_message_kinds() {
        assert_eq!(whatsapp_message_kind("hello"), MessageKind::Text);
        assert_eq!(whatsapp_message_kind("<Media omitted>"), MessageKind::Other);
        assert_eq!(whatsapp_message_kind("<attached: 00000012-PHOTO-2024-01-15.jpg>"), MessageKind::Image);
        assert_eq!(whatsapp_message_kind("report.pdf • 3 pages document omitted"), MessageKind::File);
        assert_eq!(whatsapp_message_kind("location: https://maps.google.com/?q=1,2"), MessageKind::Location);
        assert_eq!(whatsapp_message_kind("https://example.com"), MessageKind::Link);
        assert_eq!(whatsapp_message_kind("Missed voice call"), MessageKind::Call);
    }
}
