//! DiscordChatExporter JSON records.
//!
//! ```json
//! {
//!   "guild": {"id": "1", "name": "Server"},
//!   "channel": {"id": "2", "type": "GuildTextChat", "name": "general"},
//!   "messages": [
//!     {"id": "10", "type": "Default", "timestamp": "2024-01-15T10:30:00+00:00",
//!      "content": "hi", "author": {"id": "42", "name": "alice", "nickname": "Alice"}}
//!   ]
//! }
//! ```

use chrono::DateTime;
use serde::Deserialize;
use serde_json::{Map, Value};

use super::lenient;
use crate::model::{ChatKind, MessageKind, ParsedMember, ParsedMessage, ParsedMeta, Platform};

/// Raw Discord message structure for deserialization.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscordRawMessage {
    #[serde(default, deserialize_with = "lenient::string")]
    pub id: Option<String>,
    /// `Default`, `Reply`, `Call`, `RecipientAdd`, ...
    #[serde(default, rename = "type", deserialize_with = "lenient::string")]
    pub msg_type: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub timestamp: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub content: Option<String>,
    #[serde(default)]
    pub author: Option<DiscordAuthor>,
    #[serde(default)]
    pub reference: Option<DiscordReference>,
    #[serde(default, deserialize_with = "lenient::list")]
    pub attachments: Vec<DiscordAttachment>,
    #[serde(default, deserialize_with = "lenient::list")]
    pub stickers: Vec<DiscordSticker>,
}

/// Discord author structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscordAuthor {
    #[serde(default, deserialize_with = "lenient::string")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub nickname: Option<String>,
}

/// Discord message reference (for replies).
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscordReference {
    #[serde(default, deserialize_with = "lenient::string")]
    pub message_id: Option<String>,
}

/// Discord attachment structure.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscordAttachment {
    #[serde(default, deserialize_with = "lenient::string")]
    pub file_name: Option<String>,
}

/// Discord sticker structure.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscordSticker {
    #[serde(default, deserialize_with = "lenient::string")]
    pub name: Option<String>,
}

impl DiscordAuthor {
    /// Converts the author into a member record, if it has an id and a name.
    pub fn to_member(&self) -> Option<ParsedMember> {
        let id = self.id.as_ref().filter(|id| !id.is_empty())?;
        let name = self.name.as_ref()?;
        let member = ParsedMember::new(id.clone(), name.clone());
        Some(match self.nickname.as_ref().filter(|n| !n.trim().is_empty()) {
            Some(nickname) => member.with_nickname(nickname.clone()),
            None => member,
        })
    }
}

/// Maps the exporter's channel type onto [`ChatKind`].
pub fn discord_chat_kind(channel_type: Option<&str>) -> ChatKind {
    match channel_type {
        Some("DirectTextChat") => ChatKind::Private,
        _ => ChatKind::Group,
    }
}

/// Builds chat metadata from the `guild`/`channel` header objects.
pub fn parse_discord_header(header: &Map<String, Value>, fallback_name: &str) -> ParsedMeta {
    let channel = header.get("channel");
    let channel_name = channel
        .and_then(|c| c.get("name"))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty());
    let guild_name = header
        .get("guild")
        .and_then(|g| g.get("name"))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty());
    let kind = discord_chat_kind(channel.and_then(|c| c.get("type")).and_then(Value::as_str));

    let name = channel_name.or(guild_name).unwrap_or(fallback_name);
    ParsedMeta::new(name, Platform::Discord, kind)
}

fn attachment_kind(file_name: &str) -> MessageKind {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" | "jpg" | "jpeg" | "gif" | "webp" | "bmp" | "heic" => MessageKind::Image,
        "mp4" | "mov" | "webm" | "mkv" | "avi" => MessageKind::Video,
        "ogg" | "mp3" | "m4a" | "wav" | "opus" => MessageKind::Voice,
        _ => MessageKind::File,
    }
}

fn is_bare_link(content: &str) -> bool {
    let trimmed = content.trim();
    (trimmed.starts_with("http://") || trimmed.starts_with("https://"))
        && !trimmed.contains(char::is_whitespace)
}

fn message_kind(msg: &DiscordRawMessage) -> MessageKind {
    match msg.msg_type.as_deref() {
        None | Some("Default" | "Reply") => {}
        Some("Call") => return MessageKind::Call,
        Some(_) => return MessageKind::System,
    }
    if !msg.stickers.is_empty() {
        return MessageKind::Sticker;
    }
    if let Some(first) = msg.attachments.first() {
        return first
            .file_name
            .as_deref()
            .map_or(MessageKind::File, attachment_kind);
    }
    match msg.content.as_deref() {
        Some(content) if is_bare_link(content) => MessageKind::Link,
        _ => MessageKind::Text,
    }
}

fn build_content(msg: &DiscordRawMessage) -> Option<String> {
    let mut content = msg.content.clone().unwrap_or_default();
    if content.trim().is_empty() {
        content.clear();
        for att in &msg.attachments {
            if !content.is_empty() {
                content.push('\n');
            }
            content.push_str(&format!(
                "[Attachment: {}]",
                att.file_name.as_deref().unwrap_or("file")
            ));
        }
        for sticker in &msg.stickers {
            if !content.is_empty() {
                content.push('\n');
            }
            match &sticker.name {
                Some(name) => content.push_str(&format!("[Sticker: {name}]")),
                None => content.push_str("[Sticker]"),
            }
        }
    }
    (!content.is_empty()).then_some(content)
}

/// Converts a raw Discord record into a (possibly partial) [`ParsedMessage`].
///
/// The sender name is the guild nickname when set, else the account name.
pub fn parse_discord_message(msg: &DiscordRawMessage) -> ParsedMessage {
    let author = msg.author.clone().unwrap_or_default();
    let sender_name = author
        .nickname
        .filter(|n| !n.trim().is_empty())
        .or(author.name);

    let timestamp = msg
        .timestamp
        .as_deref()
        .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
        .map(|dt| dt.timestamp());

    ParsedMessage {
        sender_platform_id: author.id,
        sender_name,
        timestamp,
        kind: Some(message_kind(msg)),
        content: build_content(msg),
        platform_message_id: msg.id.clone(),
        reply_to: msg.reference.as_ref().and_then(|r| r.message_id.clone()),
    }
}

/// Deserializes one exported element. A field of the wrong shape is dropped
/// on its own and the rest of the record is kept; a non-object element
/// becomes an empty record.
pub fn parse_discord_value(value: &Value) -> (ParsedMessage, Option<ParsedMember>) {
    match lenient::record::<DiscordRawMessage>(value) {
        Some(raw) => {
            let member = raw.author.as_ref().and_then(DiscordAuthor::to_member);
            (parse_discord_message(&raw), member)
        }
        None => (ParsedMessage::default(), None),
    }
}
