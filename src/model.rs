//! Normalized records produced by every format parser.
//!
//! Parsers convert their native wire shapes into three record types:
//!
//! - [`ParsedMeta`]: once per file, before any messages
//! - [`ParsedMember`]: zero or more, typically near the start
//! - [`ParsedMessage`]: the bulk of the file, delivered in batches
//!
//! A [`ParsedMessage`] is deliberately *partial*: every identity field is an
//! `Option`, because a record with an unexpected shape degrades to whatever
//! could be read instead of aborting the parse. The importer decides validity.
//!
//! # Example
//!
//! ```
//! use chatload::model::{MessageKind, ParsedMessage};
//!
//! let msg = ParsedMessage::new("user42", "Alice", 1705314600, MessageKind::Text)
//!     .with_content("Hello!");
//!
//! assert_eq!(msg.sender_name.as_deref(), Some("Alice"));
//! assert_eq!(msg.kind, Some(MessageKind::Text));
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Supported messaging platforms.
///
/// # Example
///
/// ```rust
/// use chatload::model::Platform;
/// use std::str::FromStr;
///
/// let platform = Platform::from_str("telegram").unwrap();
/// assert_eq!(platform, Platform::Telegram);
///
/// // Aliases are supported
/// let platform = Platform::from_str("tg").unwrap();
/// assert_eq!(platform, Platform::Telegram);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum Platform {
    /// Telegram Desktop JSON exports
    #[serde(alias = "tg")]
    Telegram,

    /// WhatsApp TXT exports (iOS and Android)
    #[serde(alias = "wa")]
    WhatsApp,

    /// Instagram JSON exports from the data download
    #[serde(alias = "ig")]
    Instagram,

    /// DiscordChatExporter JSON exports
    #[serde(alias = "dc")]
    Discord,
}

impl Platform {
    /// Stable lowercase tag used in storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Telegram => "telegram",
            Platform::WhatsApp => "whatsapp",
            Platform::Instagram => "instagram",
            Platform::Discord => "discord",
        }
    }

    /// Returns all platform names including aliases.
    pub fn all_names() -> &'static [&'static str] {
        &[
            "telegram", "tg", "whatsapp", "wa", "instagram", "ig", "discord", "dc",
        ]
    }

    /// Returns all available platforms.
    pub fn all() -> &'static [Platform] {
        &[
            Platform::Telegram,
            Platform::WhatsApp,
            Platform::Instagram,
            Platform::Discord,
        ]
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Telegram => write!(f, "Telegram"),
            Platform::WhatsApp => write!(f, "WhatsApp"),
            Platform::Instagram => write!(f, "Instagram"),
            Platform::Discord => write!(f, "Discord"),
        }
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "telegram" | "tg" => Ok(Platform::Telegram),
            "whatsapp" | "wa" => Ok(Platform::WhatsApp),
            "instagram" | "ig" => Ok(Platform::Instagram),
            "discord" | "dc" => Ok(Platform::Discord),
            _ => Err(format!(
                "Unknown platform: '{}'. Expected one of: {}",
                s,
                Platform::all_names().join(", ")
            )),
        }
    }
}

/// Whether a chat has many participants or is a direct conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatKind {
    Group,
    Private,
}

impl ChatKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatKind::Group => "group",
            ChatKind::Private => "private",
        }
    }
}

impl FromStr for ChatKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "group" => Ok(ChatKind::Group),
            "private" => Ok(ChatKind::Private),
            other => Err(format!("Unknown chat type: '{other}'")),
        }
    }
}

/// Kind of a chat message, normalized across platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Image,
    Video,
    Voice,
    Sticker,
    File,
    Link,
    Location,
    Contact,
    Poll,
    Call,
    /// Membership changes, pins, title edits and similar service events
    System,
    Other,
}

impl MessageKind {
    /// Stable lowercase tag used in storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Image => "image",
            MessageKind::Video => "video",
            MessageKind::Voice => "voice",
            MessageKind::Sticker => "sticker",
            MessageKind::File => "file",
            MessageKind::Link => "link",
            MessageKind::Location => "location",
            MessageKind::Contact => "contact",
            MessageKind::Poll => "poll",
            MessageKind::Call => "call",
            MessageKind::System => "system",
            MessageKind::Other => "other",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let kind = match s {
            "text" => MessageKind::Text,
            "image" => MessageKind::Image,
            "video" => MessageKind::Video,
            "voice" => MessageKind::Voice,
            "sticker" => MessageKind::Sticker,
            "file" => MessageKind::File,
            "link" => MessageKind::Link,
            "location" => MessageKind::Location,
            "contact" => MessageKind::Contact,
            "poll" => MessageKind::Poll,
            "call" => MessageKind::Call,
            "system" => MessageKind::System,
            "other" => MessageKind::Other,
            other => return Err(format!("Unknown message kind: '{other}'")),
        };
        Ok(kind)
    }
}

/// Chat-level metadata, emitted at most once per parse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedMeta {
    /// Chat or session display name
    pub name: String,
    pub platform: Platform,
    #[serde(rename = "type")]
    pub kind: ChatKind,
}

impl ParsedMeta {
    pub fn new(name: impl Into<String>, platform: Platform, kind: ChatKind) -> Self {
        Self {
            name: name.into(),
            platform,
            kind,
        }
    }
}

/// A chat participant announced by the export.
///
/// Not guaranteed exhaustive: messages may reference members never listed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedMember {
    /// Stable external identity, unique per member within a file
    pub platform_id: String,
    /// Display name at export time
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
}

impl ParsedMember {
    pub fn new(platform_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            platform_id: platform_id.into(),
            name: name.into(),
            nickname: None,
        }
    }

    #[must_use]
    pub fn with_nickname(mut self, nickname: impl Into<String>) -> Self {
        self.nickname = Some(nickname.into());
        self
    }
}

/// A single message as read from the export, possibly partial.
///
/// | Field | Required for import |
/// |-------|---------------------|
/// | `sender_platform_id` | yes, non-empty |
/// | `sender_name` | yes, non-blank |
/// | `timestamp` | yes (unix seconds) |
/// | `kind` | yes |
/// | `content` | no |
/// | `platform_message_id`, `reply_to` | no |
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedMessage {
    #[serde(default)]
    pub sender_platform_id: Option<String>,

    /// Sender name as of this message; may change over time for one sender
    #[serde(default)]
    pub sender_name: Option<String>,

    /// Unix seconds
    #[serde(default)]
    pub timestamp: Option<i64>,

    #[serde(default, rename = "type")]
    pub kind: Option<MessageKind>,

    /// Normalized text body
    #[serde(default)]
    pub content: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform_message_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
}

impl ParsedMessage {
    /// Creates a complete message with all required fields present.
    pub fn new(
        sender_platform_id: impl Into<String>,
        sender_name: impl Into<String>,
        timestamp: i64,
        kind: MessageKind,
    ) -> Self {
        Self {
            sender_platform_id: Some(sender_platform_id.into()),
            sender_name: Some(sender_name.into()),
            timestamp: Some(timestamp),
            kind: Some(kind),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    #[must_use]
    pub fn with_platform_message_id(mut self, id: impl Into<String>) -> Self {
        self.platform_message_id = Some(id.into());
        self
    }

    #[must_use]
    pub fn with_reply_to(mut self, id: impl Into<String>) -> Self {
        self.reply_to = Some(id.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_from_str_aliases() {
        assert_eq!(Platform::from_str("dc").unwrap(), Platform::Discord);
        assert_eq!(Platform::from_str("WA").unwrap(), Platform::WhatsApp);
        let err = Platform::from_str("myspace").unwrap_err();
        assert!(err.contains("telegram"));
    }

    #[test]
    fn test_platform_serde_alias() {
        let p: Platform = serde_json::from_str("\"ig\"").unwrap();
        assert_eq!(p, Platform::Instagram);
        assert_eq!(serde_json::to_string(&Platform::WhatsApp).unwrap(), "\"whatsapp\"");
    }

    #[test]
    fn test_message_kind_round_trips_through_tag() {
        for kind in [
            MessageKind::Text,
            MessageKind::Sticker,
            MessageKind::System,
            MessageKind::Other,
        ] {
            assert_eq!(MessageKind::from_str(kind.as_str()).unwrap(), kind);
        }
        assert!(MessageKind::from_str("hologram").is_err());
    }

    #[test]
    fn test_parsed_message_builder() {
        let msg = ParsedMessage::new("u1", "Alice", 10, MessageKind::Text)
            .with_content("hi")
            .with_platform_message_id("7")
            .with_reply_to("6");
        assert_eq!(msg.content.as_deref(), Some("hi"));
        assert_eq!(msg.platform_message_id.as_deref(), Some("7"));
        assert_eq!(msg.reply_to.as_deref(), Some("6"));
    }

    #[test]
    fn test_partial_message_deserializes() {
        let msg: ParsedMessage = serde_json::from_str(r#"{"sender_name": "Bob"}"#).unwrap();
        assert!(msg.sender_platform_id.is_none());
        assert!(msg.timestamp.is_none());
        assert_eq!(msg.sender_name.as_deref(), Some("Bob"));
    }

    #[test]
    fn test_meta_serializes_type_field() {
        let meta = ParsedMeta::new("Team", Platform::Discord, ChatKind::Group);
        let json = serde_json::to_string(&meta).unwrap();
        assert!(json.contains("\"type\":\"group\""));
    }
}
