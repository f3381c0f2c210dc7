//! Telegram record slimming.
//!
//! Telegram Desktop exports repeat every message's text twice (`text` as a
//! rich array and `text_entities`) and carry media descriptors with file
//! paths, sizes and thumbnails. Only identity, timing and type tags survive.

use serde_json::{Map, Value};

use crate::parsing::telegram::extract_telegram_text;

const KEPT: &[&str] = &[
    "id",
    "type",
    "date",
    "date_unixtime",
    "from",
    "from_id",
    "actor",
    "actor_id",
    "action",
    "reply_to_message_id",
    "edited_unixtime",
    "forwarded_from",
    "media_type",
    "sticker_emoji",
];

/// Payload fields reduced to a `true` presence marker.
const MARKERS: &[&str] = &[
    "photo",
    "file",
    "thumbnail",
    "poll",
    "location_information",
    "contact_information",
];

pub(crate) fn slim_telegram(record: Value) -> Value {
    let Value::Object(mut source) = record else {
        return record;
    };
    let mut slim = Map::new();

    for key in KEPT {
        if let Some(value) = source.remove(*key) {
            slim.insert((*key).to_string(), value);
        }
    }
    if let Some(text) = source.get("text") {
        slim.insert("text".into(), Value::String(extract_telegram_text(text)));
    }
    for key in ["text_entities", "reactions"] {
        if let Some(Value::Array(items)) = source.get(key) {
            slim.insert(key.into(), Value::Array(items.iter().map(type_tag).collect()));
        }
    }
    for key in MARKERS {
        if source.get(*key).is_some_and(|v| !matches!(v, Value::Null | Value::Bool(false))) {
            slim.insert((*key).to_string(), Value::Bool(true));
        }
    }

    Value::Object(slim)
}

fn type_tag(item: &Value) -> Value {
    let mut tag = Map::new();
    if let Some(kind) = item.get("type") {
        tag.insert("type".into(), kind.clone());
    }
    Value::Object(tag)
}
