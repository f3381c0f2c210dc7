//! Streaming parser for Instagram JSON exports.
//!
//! Instagram exports list `participants` before the `messages` array, so the
//! member list is available up front. Messages are stored newest first and
//! are delivered in that (file) order.

use std::path::Path;

use crate::error::Result;
use crate::model::Platform;
use crate::parsing::instagram::{
    parse_instagram_header, parse_instagram_participants, parse_instagram_value,
};

use super::traits::BatchEmitter;
use super::{ParseSink, ParseSummary, StreamParser, StreamingConfig, open_json, parse_failure};

const FORMAT: &str = "Instagram JSON";

/// Streaming parser for Instagram JSON exports.
#[derive(Debug, Default, Clone, Copy)]
pub struct InstagramStreamParser;

impl InstagramStreamParser {
    pub fn new() -> Self {
        Self
    }
}

impl StreamParser for InstagramStreamParser {
    fn name(&self) -> &'static str {
        FORMAT
    }

    fn platform(&self) -> Platform {
        Platform::Instagram
    }

    fn parse(
        &self,
        path: &Path,
        config: &StreamingConfig,
        sink: &mut dyn ParseSink,
    ) -> Result<ParseSummary> {
        let (mut reader, total) = open_json(path, config)?;
        let mut emitter = BatchEmitter::new(sink, config, total);

        let header = reader
            .open_array("messages")
            .map_err(|e| parse_failure(FORMAT, path, e))?;
        let participants = parse_instagram_participants(&header);
        emitter.meta(parse_instagram_header(&header, &participants, &config.fallback_name(path)))?;
        emitter.members(participants)?;

        while let Some(value) = reader.next_value().map_err(|e| parse_failure(FORMAT, path, e))? {
            emitter.push(parse_instagram_value(&value), reader.bytes_read())?;
        }
        reader.finish().map_err(|e| parse_failure(FORMAT, path, e))?;

        emitter.finish(reader.bytes_read())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::{Builder, NamedTempFile};

    use super::*;
    use crate::model::ChatKind;
    use crate::streaming::traits::testing::CollectSink;

    fn export(body: &str) -> NamedTempFile {
        let mut file = Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, "{body}").unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_streaming_parser_basic() {
        let file = export(
            r#"{
  "participants": [{"name": "user_one"}, {"name": "user_two"}],
  "messages": [
    {"sender_name": "user_two", "timestamp_ms": 1705315860000, "content": "Hi!"},
    {"sender_name": "user_one", "timestamp_ms": 1705315800000, "content": "Hello"}
  ],
  "title": "user_two",
  "is_still_participant": true,
  "thread_path": "inbox/user_two_123"
}"#,
        );
        let mut sink = CollectSink::default();
        let summary = InstagramStreamParser::new()
            .parse(file.path(), &StreamingConfig::default(), &mut sink)
            .unwrap();

        assert_eq!(summary.records, 2);
        assert_eq!(sink.calls, vec!["meta", "members", "batch"]);
        assert_eq!(sink.meta[0].kind, ChatKind::Private);
        assert_eq!(sink.meta[0].name, "user_one, user_two");
        assert_eq!(sink.members.len(), 2);

        let messages = sink.messages();
        assert_eq!(messages[0].timestamp, Some(1_705_315_860));
        assert_eq!(messages[1].sender_platform_id.as_deref(), Some("user_one"));
    }

    #[test]
    fn test_title_before_messages_is_used() {
        let file = export(r#"{"title": "Trip", "participants": [{"name": "a"}, {"name": "b"}, {"name": "c"}], "messages": []}"#);
        let mut sink = CollectSink::default();
        InstagramStreamParser::new()
            .parse(file.path(), &StreamingConfig::default(), &mut sink)
            .unwrap();
        assert_eq!(sink.meta[0].name, "Trip");
        assert_eq!(sink.meta[0].kind, ChatKind::Group);
    }
}
