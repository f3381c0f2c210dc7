//! DiscordChatExporter record slimming.
//!
//! Exporter records embed full author profiles (avatar URLs, roles, colors),
//! rich embeds and mention lists. Only what the parser reads is kept.

use serde_json::{Map, Value};

const KEPT: &[&str] = &["id", "type", "timestamp", "timestampEdited", "content"];

pub(crate) fn slim_discord(record: Value) -> Value {
    let Value::Object(mut source) = record else {
        return record;
    };
    let mut slim = Map::new();

    for key in KEPT {
        if let Some(value) = source.remove(*key) {
            slim.insert((*key).to_string(), value);
        }
    }
    if let Some(author) = source.get("author") {
        slim.insert("author".into(), pick(author, &["id", "name", "nickname", "isBot"]));
    }
    if let Some(reference) = source.get("reference").filter(|r| !r.is_null()) {
        slim.insert("reference".into(), pick(reference, &["messageId"]));
    }
    for (key, fields) in [
        ("attachments", &["fileName"][..]),
        ("stickers", &["name", "format"][..]),
    ] {
        if let Some(Value::Array(items)) = source.get(key) {
            let items = items.iter().map(|item| pick(item, fields)).collect();
            slim.insert(key.into(), Value::Array(items));
        }
    }
    if let Some(Value::Array(reactions)) = source.get("reactions") {
        let reduced = reactions
            .iter()
            .map(|r| {
                let mut emoji = Map::new();
                if let Some(name) = r.get("emoji").and_then(|e| e.get("name")) {
                    emoji.insert("name".into(), name.clone());
                }
                let mut out = Map::new();
                out.insert("emoji".into(), Value::Object(emoji));
                Value::Object(out)
            })
            .collect();
        slim.insert("reactions".into(), Value::Array(reduced));
    }

    Value::Object(slim)
}

fn pick(source: &Value, fields: &[&str]) -> Value {
    let mut out = Map::new();
    for field in fields {
        if let Some(value) = source.get(*field) {
            out.insert((*field).to_string(), value.clone());
        }
    }
    Value::Object(out)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::parsing::discord::parse_discord_value;

    fn sample() -> Value {
        json!({
            "id": "11",
            "type": "Reply",
            "timestamp": "2024-01-15T10:31:00+00:00",
            "timestampEdited": null,
            "content": "",
            "author": {
                "id": "43", "name": "bob", "nickname": "Bobby", "isBot": false,
                "color": "#FFFFFF", "avatarUrl": "https://cdn/avatar.png",
                "roles": [{"id": "1", "name": "admin"}]
            },
            "attachments": [{"id": "a", "url": "https://cdn/cat.png", "fileName": "cat.png", "fileSizeBytes": 1000}],
            "embeds": [{"title": "big", "description": "x".repeat(100)}],
            "stickers": [{"id": "s", "name": "wave", "format": "Apng", "sourceUrl": "https://cdn/s.png"}],
            "reactions": [{"emoji": {"id": "", "name": "👍", "imageUrl": "https://cdn/e.svg"}, "count": 2, "users": []}],
            "mentions": [{"id": "42", "name": "alice"}],
            "reference": {"messageId": "10", "channelId": "2", "guildId": "1"}
        })
    }

    #[test]
    fn test_slim_drops_payloads() {
        let slim = slim_discord(sample());
        assert!(slim.get("embeds").is_none());
        assert!(slim.get("mentions").is_none());
        assert_eq!(slim["author"], json!({"id": "43", "name": "bob", "nickname": "Bobby", "isBot": false}));
        assert_eq!(slim["attachments"], json!([{"fileName": "cat.png"}]));
        assert_eq!(slim["reactions"], json!([{"emoji": {"name": "👍"}}]));
        assert_eq!(slim["reference"], json!({"messageId": "10"}));
    }

    #[test]
    fn test_slim_preserves_parsed_fields() {
        let before = parse_discord_value(&sample());
        let after = parse_discord_value(&slim_discord(sample()));
        assert_eq!(before, after);
    }
}
