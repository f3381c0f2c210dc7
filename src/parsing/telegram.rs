//! Telegram Desktop JSON export records.
//!
//! A single-chat export looks like:
//! ```json
//! {
//!   "name": "Chat Name",
//!   "type": "personal_chat",
//!   "id": 123,
//!   "messages": [
//!     {"id": 1, "type": "message", "date_unixtime": "1705314600",
//!      "from": "Alice", "from_id": "user42", "text": "Hi"},
//!     {"id": 2, "type": "service", "actor": "Alice", "actor_id": "user42",
//!      "action": "pin_message", "text": ""}
//!   ]
//! }
//! ```

use chrono::NaiveDateTime;
use serde::Deserialize;
use serde_json::{Map, Value};

use super::lenient;
use crate::model::{ChatKind, MessageKind, ParsedMessage, ParsedMeta, Platform};

/// Raw Telegram message structure for deserialization.
#[derive(Debug, Default, Deserialize)]
pub struct TelegramRawMessage {
    #[serde(default, deserialize_with = "lenient::string")]
    pub id: Option<String>,
    /// `message` or `service`
    #[serde(default, rename = "type", deserialize_with = "lenient::string")]
    pub msg_type: Option<String>,
    /// Local time, `2024-01-15T10:30:00`
    #[serde(default, deserialize_with = "lenient::string")]
    pub date: Option<String>,
    #[serde(default, deserialize_with = "lenient::int")]
    pub date_unixtime: Option<i64>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub from: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub from_id: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub actor: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub actor_id: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub action: Option<String>,
    /// Message text (can be string or array)
    #[serde(default)]
    pub text: Option<Value>,
    #[serde(default, deserialize_with = "lenient::list")]
    pub text_entities: Vec<TelegramEntity>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub reply_to_message_id: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub media_type: Option<String>,
    #[serde(default, deserialize_with = "lenient::present")]
    pub photo: bool,
    #[serde(default, deserialize_with = "lenient::present")]
    pub file: bool,
    #[serde(default, deserialize_with = "lenient::present")]
    pub poll: bool,
    #[serde(default, deserialize_with = "lenient::present")]
    pub location_information: bool,
    #[serde(default, deserialize_with = "lenient::present")]
    pub contact_information: bool,
}

/// One `text_entities` element; only its tag matters here.
#[derive(Debug, Clone, Deserialize)]
pub struct TelegramEntity {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}

/// Extracts text content from Telegram's complex `text` field.
///
/// The `text` field in Telegram exports can be:
/// - A simple string: `"Hello"`
/// - An array with strings and objects: `["Text", {"type": "link", "text": "url"}]`
///
/// # Example
///
/// ```
/// use serde_json::json;
/// use chatload::parsing::extract_telegram_text;
///
/// let complex = json!([
///     "Check this: ",
///     {"type": "link", "text": "https://example.com"}
/// ]);
/// assert_eq!(extract_telegram_text(&complex), "Check this: https://example.com");
/// ```
pub fn extract_telegram_text(text_value: &Value) -> String {
    match text_value {
        Value::String(s) => s.clone(),
        Value::Array(arr) => arr
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.as_str()),
                Value::Object(obj) => obj.get("text").and_then(Value::as_str),
                _ => None,
            })
            .collect::<String>(),
        _ => String::new(),
    }
}

/// Maps the export's chat `type` onto [`ChatKind`].
pub fn telegram_chat_kind(chat_type: Option<&str>) -> ChatKind {
    match chat_type {
        Some("personal_chat" | "bot_chat" | "saved_messages") => ChatKind::Private,
        _ => ChatKind::Group,
    }
}

/// Builds chat metadata from the header fields preceding `messages`.
pub fn parse_telegram_header(header: &Map<String, Value>, fallback_name: &str) -> ParsedMeta {
    let chat_type = header.get("type").and_then(Value::as_str);
    let name = match header.get("name").and_then(Value::as_str) {
        Some(name) if !name.trim().is_empty() => name.to_string(),
        _ if chat_type == Some("saved_messages") => "Saved Messages".to_string(),
        _ => fallback_name.to_string(),
    };
    ParsedMeta::new(name, Platform::Telegram, telegram_chat_kind(chat_type))
}

fn parse_local_date(date: &str) -> Option<i64> {
    NaiveDateTime::parse_from_str(date, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .map(|dt| dt.and_utc().timestamp())
}

fn message_kind(msg: &TelegramRawMessage) -> MessageKind {
    if msg.msg_type.as_deref() == Some("service") {
        return match msg.action.as_deref() {
            Some("phone_call" | "group_call") => MessageKind::Call,
            _ => MessageKind::System,
        };
    }

    match msg.media_type.as_deref() {
        Some("sticker") => return MessageKind::Sticker,
        Some("voice_message" | "audio_file") => return MessageKind::Voice,
        Some("video_file" | "video_message" | "animation") => return MessageKind::Video,
        _ => {}
    }

    if msg.photo {
        MessageKind::Image
    } else if msg.poll {
        MessageKind::Poll
    } else if msg.location_information {
        MessageKind::Location
    } else if msg.contact_information {
        MessageKind::Contact
    } else if msg.file {
        MessageKind::File
    } else if !msg.text_entities.is_empty()
        && msg
            .text_entities
            .iter()
            .all(|e| matches!(e.kind.as_deref(), Some("link" | "text_link")))
    {
        MessageKind::Link
    } else {
        MessageKind::Text
    }
}

/// Converts a raw Telegram record into a (possibly partial) [`ParsedMessage`].
///
/// Service records are attributed to their actor and typed
/// [`MessageKind::System`] (or [`MessageKind::Call`] for calls).
pub fn parse_telegram_message(msg: &TelegramRawMessage) -> ParsedMessage {
    let is_service = msg.msg_type.as_deref() == Some("service");
    let (sender_id, sender_name) = if is_service {
        (msg.actor_id.clone(), msg.actor.clone())
    } else {
        (msg.from_id.clone(), msg.from.clone())
    };

    let text = msg.text.as_ref().map(extract_telegram_text).unwrap_or_default();
    let content = if text.trim().is_empty() {
        if is_service { msg.action.clone() } else { None }
    } else {
        Some(text)
    };

    let timestamp = msg
        .date_unixtime
        .or_else(|| msg.date.as_deref().and_then(parse_local_date));

    ParsedMessage {
        sender_platform_id: sender_id,
        sender_name,
        timestamp,
        kind: msg.msg_type.as_ref().map(|_| message_kind(msg)),
        content,
        platform_message_id: msg.id.clone(),
        reply_to: msg.reply_to_message_id.clone(),
    }
}

/// Converts an arbitrary JSON element, keeping every field that has a usable
/// shape.
pub fn parse_telegram_value(value: &Value) -> ParsedMessage {
    lenient::record::<TelegramRawMessage>(value)
        .map(|raw| parse_telegram_message(&raw))
        .unwrap_or_default()
}
