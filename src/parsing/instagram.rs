//! Instagram data-download message records.
//!
//! Threads are exported as `message_N.json`, newest message first:
//! ```json
//! {
//!   "participants": [{"name": "Alice"}, {"name": "Bob"}],
//!   "messages": [
//!     {"sender_name": "Bob", "timestamp_ms": 1705314600000, "content": "hey"}
//!   ],
//!   "title": "Alice and Bob"
//! }
//! ```
//!
//! Meta exports UTF-8 text as Latin-1 code points, so every string passes
//! through [`fix_mojibake_encoding`]. There are no stable user ids; the
//! repaired display name serves as the platform identity.

use serde::Deserialize;
use serde_json::{Map, Value};

use super::lenient;
use crate::model::{ChatKind, MessageKind, ParsedMember, ParsedMessage, ParsedMeta, Platform};

/// Raw Instagram message structure for deserialization.
#[derive(Debug, Default, Deserialize)]
pub struct InstagramRawMessage {
    #[serde(default, deserialize_with = "lenient::string")]
    pub sender_name: Option<String>,
    #[serde(default, deserialize_with = "lenient::int")]
    pub timestamp_ms: Option<i64>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub content: Option<String>,
    #[serde(default)]
    pub share: Option<InstagramShare>,
    #[serde(default, deserialize_with = "lenient::present")]
    pub photos: bool,
    #[serde(default, deserialize_with = "lenient::present")]
    pub videos: bool,
    #[serde(default, deserialize_with = "lenient::present")]
    pub audio_files: bool,
    #[serde(default, deserialize_with = "lenient::present")]
    pub files: bool,
    #[serde(default, deserialize_with = "lenient::present")]
    pub sticker: bool,
    #[serde(default, deserialize_with = "lenient::present")]
    pub gifs: bool,
    #[serde(default, deserialize_with = "lenient::int")]
    pub call_duration: Option<i64>,
}

/// Instagram share structure.
#[derive(Debug, Default, Deserialize)]
pub struct InstagramShare {
    #[serde(default, deserialize_with = "lenient::string")]
    pub share_text: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub link: Option<String>,
}

/// Entry of the `participants` header array.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InstagramParticipant {
    #[serde(default, deserialize_with = "lenient::string")]
    pub name: Option<String>,
}

/// Fix Meta's broken encoding (Mojibake).
///
/// Meta exports UTF-8 text encoded as if it were ISO-8859-1.
/// Each UTF-8 byte is stored as a separate Unicode codepoint.
/// Example: "Привет" becomes "ÐŸÑ€Ð¸Ð²ÐµÑ‚"
///
/// Strings containing code points above U+00FF cannot be mojibake and are
/// returned unchanged, as are byte sequences that are not valid UTF-8.
///
/// ```
/// use chatload::parsing::fix_mojibake_encoding;
///
/// assert_eq!(fix_mojibake_encoding("Hello"), "Hello");
/// assert_eq!(fix_mojibake_encoding("Ð\u{9f}Ñ\u{80}Ð¸Ð²ÐµÑ\u{82}"), "Привет");
/// assert_eq!(fix_mojibake_encoding("Привет"), "Привет");
/// ```
pub fn fix_mojibake_encoding(s: &str) -> String {
    if s.is_ascii() {
        return s.to_string();
    }
    let bytes: Option<Vec<u8>> = s.chars().map(|c| u8::try_from(u32::from(c)).ok()).collect();
    bytes
        .and_then(|b| String::from_utf8(b).ok())
        .unwrap_or_else(|| s.to_string())
}

/// Reads the `participants` header array as members.
pub fn parse_instagram_participants(header: &Map<String, Value>) -> Vec<ParsedMember> {
    let Some(Value::Array(items)) = header.get("participants") else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|v| InstagramParticipant::deserialize(v).ok())
        .filter_map(|p| p.name)
        .map(|name| fix_mojibake_encoding(&name))
        .filter(|name| !name.trim().is_empty())
        .map(|name| ParsedMember::new(name.clone(), name))
        .collect()
}

/// Builds chat metadata from the header.
///
/// `title` usually follows the messages array and is then unavailable; the
/// participant names are used instead.
pub fn parse_instagram_header(
    header: &Map<String, Value>,
    participants: &[ParsedMember],
    fallback_name: &str,
) -> ParsedMeta {
    let kind = if participants.len() > 2 {
        ChatKind::Group
    } else {
        ChatKind::Private
    };
    let name = header
        .get("title")
        .and_then(Value::as_str)
        .map(fix_mojibake_encoding)
        .filter(|t| !t.trim().is_empty())
        .or_else(|| {
            (!participants.is_empty()).then(|| {
                participants
                    .iter()
                    .map(|p| p.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            })
        })
        .unwrap_or_else(|| fallback_name.to_string());
    ParsedMeta::new(name, Platform::Instagram, kind)
}

fn message_kind(msg: &InstagramRawMessage) -> MessageKind {
    if msg.call_duration.is_some() {
        MessageKind::Call
    } else if msg.photos || msg.gifs {
        MessageKind::Image
    } else if msg.videos {
        MessageKind::Video
    } else if msg.audio_files {
        MessageKind::Voice
    } else if msg.sticker {
        MessageKind::Sticker
    } else if msg.files {
        MessageKind::File
    } else if msg.share.as_ref().is_some_and(|s| s.link.is_some()) {
        MessageKind::Link
    } else {
        MessageKind::Text
    }
}

/// Converts a raw Instagram record into a (possibly partial) [`ParsedMessage`].
pub fn parse_instagram_message(msg: &InstagramRawMessage) -> ParsedMessage {
    let sender = msg.sender_name.as_deref().map(fix_mojibake_encoding);
    let content = msg
        .content
        .as_deref()
        .or_else(|| msg.share.as_ref().and_then(|s| s.share_text.as_deref()))
        .or_else(|| msg.share.as_ref().and_then(|s| s.link.as_deref()))
        .map(fix_mojibake_encoding)
        .filter(|c| !c.trim().is_empty());

    ParsedMessage {
        sender_platform_id: sender.clone(),
        sender_name: sender,
        timestamp: msg.timestamp_ms.map(|ms| ms.div_euclid(1000)),
        kind: Some(message_kind(msg)),
        content,
        platform_message_id: None,
        reply_to: None,
    }
}

/// Deserializes one exported element, dropping only the fields of the wrong
/// shape.
pub fn parse_instagram_value(value: &Value) -> ParsedMessage {
    lenient::record::<InstagramRawMessage>(value)
        .map(|raw| parse_instagram_message(&raw))
        .unwrap_or_default()
}
