//! Per-platform record shapes and conversion into [`ParsedMessage`](crate::model::ParsedMessage).
//!
//! Every raw type here deserializes leniently: fields of an unexpected JSON
//! type become `None` instead of failing the record, so a shape anomaly
//! yields a partial message rather than aborting the parse.

pub mod discord;
pub mod instagram;
pub mod telegram;
pub mod whatsapp;

pub use discord::{
    DiscordRawMessage, discord_chat_kind, parse_discord_header, parse_discord_message,
    parse_discord_value,
};
pub use instagram::{
    InstagramRawMessage, fix_mojibake_encoding, parse_instagram_header,
    parse_instagram_message, parse_instagram_participants, parse_instagram_value,
};
pub use telegram::{
    TelegramRawMessage, extract_telegram_text, parse_telegram_header, parse_telegram_message,
    parse_telegram_value, telegram_chat_kind,
};
pub use whatsapp::{
    DateFormat as WhatsAppDateFormat, WhatsAppDetector, WhatsAppLine, WhatsAppPatterns,
    detect_whatsapp_format,
    is_whatsapp_system_message, parse_whatsapp_line, parse_whatsapp_timestamp,
    whatsapp_message_kind,
};

/// Lenient field deserializers shared by the JSON formats.
pub(crate) mod lenient {
    use serde::de::DeserializeOwned;
    use serde::{Deserialize, Deserializer};
    use serde_json::{Map, Value};

    /// Deserializes a whole record, dropping only the fields that fail.
    ///
    /// Every field of `T` must have a default. Returns `None` when `value`
    /// is not an object.
    pub(crate) fn record<T>(value: &Value) -> Option<T>
    where
        T: DeserializeOwned + Default,
    {
        let Value::Object(fields) = value else {
            return None;
        };
        if let Ok(parsed) = T::deserialize(value) {
            return Some(parsed);
        }
        let kept: Map<String, Value> = fields
            .iter()
            .filter(|(key, field)| {
                let single = Map::from_iter([((*key).clone(), (*field).clone())]);
                T::deserialize(&Value::Object(single)).is_ok()
            })
            .map(|(key, field)| (key.clone(), field.clone()))
            .collect();
        Some(T::deserialize(&Value::Object(kept)).unwrap_or_default())
    }

    /// Accepts a string or a number; anything else becomes `None`.
    pub(crate) fn string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Value::deserialize(deserializer)? {
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
    }

    /// Accepts an integer or a string holding one; anything else becomes `None`.
    pub(crate) fn int<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Value::deserialize(deserializer)? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })
    }

    /// `true` when the field is present and not `null`/`false`.
    pub(crate) fn present<'de, D>(deserializer: D) -> Result<bool, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(!matches!(
            Value::deserialize(deserializer)?,
            Value::Null | Value::Bool(false)
        ))
    }

    /// Accepts an array of objects, dropping elements that don't fit `T`.
    pub(crate) fn list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: serde::de::DeserializeOwned,
    {
        Ok(match Value::deserialize(deserializer)? {
            Value::Array(items) => items
                .into_iter()
                .filter_map(|v| serde_json::from_value(v).ok())
                .collect(),
            _ => Vec::new(),
        })
    }

}
