//! Integration tests for the import engine.
//!
//! Each test imports into its own temp data dir and then reads the committed
//! session back through the public store API.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chatload::ChatloadError;
use chatload::config::ImportConfig;
use chatload::format::ExportFormat;
use chatload::import::Importer;
use chatload::model::{ChatKind, MessageKind, ParsedMember, ParsedMessage, ParsedMeta, Platform};
use chatload::progress::{ProgressCallback, ProgressEvent, ProgressStage, no_progress};
use chatload::store::{SessionStore, list_sessions, sessions_dir};
use chatload::streaming::{ParseSink, ParseSummary, StreamParser, StreamingConfig, TelegramStreamParser};
use tempfile::{TempDir, tempdir};

// ============================================================================
// Fixtures
// ============================================================================

struct Env {
    dir: TempDir,
}

impl Env {
    fn new() -> Self {
        Self { dir: tempdir().expect("temp dir") }
    }

    fn data_dir(&self) -> PathBuf {
        self.dir.path().join("data")
    }

    fn temp_dir(&self) -> PathBuf {
        self.dir.path().join("tmp")
    }

    fn config(&self) -> ImportConfig {
        ImportConfig::new()
            .with_data_dir(self.data_dir())
            .with_temp_dir(self.temp_dir())
    }

    fn importer(&self) -> Importer {
        Importer::new(self.config())
    }

    fn write(&self, name: &str, body: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        fs::write(&path, body).expect("write fixture");
        path
    }

    fn open(&self, session_id: &str) -> SessionStore {
        SessionStore::open(&self.data_dir(), session_id).expect("open session")
    }

    fn sessions(&self) -> Vec<String> {
        list_sessions(&self.data_dir()).expect("list sessions")
    }

    /// Files left in the sessions directory (databases and sidecars).
    fn artifacts(&self) -> Vec<PathBuf> {
        fs::read_dir(sessions_dir(&self.data_dir()))
            .map(|entries| entries.flatten().map(|e| e.path()).collect())
            .unwrap_or_default()
    }
}

const TELEGRAM: &str = r#"{
  "name": "Family",
  "type": "private_group",
  "id": 42,
  "messages": [
    {"id": 1, "type": "message", "date_unixtime": "1705314600", "from": "Al", "from_id": "user1", "text": "Hello"},
    {"id": 2, "type": "message", "date_unixtime": "1705314660", "from": "Bob", "from_id": "user2",
     "text": ["Look ", {"type": "link", "text": "https://example.com"}], "text_entities": [{"type": "plain", "text": "Look "}]},
    {"id": 3, "type": "message", "date_unixtime": "1705314720", "from": "Alice", "from_id": "user1", "text": "Renamed",
     "reply_to_message_id": 1},
    {"id": 4, "type": "service", "date_unixtime": "1705314780", "actor": "Bob", "actor_id": "user2", "action": "pin_message", "text": ""},
    {"id": 5, "type": "message", "date_unixtime": "1705314840", "from": "Carol", "from_id": "user3", "text": "",
     "photo": "photos/photo_1.jpg", "width": 1280, "height": 960},
    {"id": 6, "type": "message", "date_unixtime": "1705314900", "from": "Alice", "from_id": "user1", "text": "Still me"}
  ]
}"#;

const DISCORD: &str = r#"{
  "guild": {"id": "1", "name": "Rust Club", "iconUrl": "https://cdn/x.png"},
  "channel": {"id": "2", "type": "GuildTextChat", "category": "Text", "name": "general"},
  "messages": [
    {"id": "10", "type": "Default", "timestamp": "2024-01-15T10:30:00+00:00", "content": "hi",
     "author": {"id": "42", "name": "alice", "nickname": "Alice", "isBot": false}, "embeds": [{"title": "x"}]},
    {"id": "11", "type": "Reply", "timestamp": "2024-01-15T10:31:00+00:00", "content": "yo",
     "author": {"id": "43", "name": "bob"}, "reference": {"messageId": "10"}},
    {"id": "12", "type": "Default", "timestamp": "2024-01-15T10:32:00+00:00", "content": "again",
     "author": {"id": "42", "name": "alice", "nickname": "Alice"}}
  ]
}"#;

const INSTAGRAM: &str = r#"{
  "participants": [{"name": "user_one"}, {"name": "user_two"}, {"name": "lurker"}],
  "messages": [
    {"sender_name": "user_two", "timestamp_ms": 1705315920000, "content": "Third"},
    {"sender_name": "user_one", "timestamp_ms": 1705315860000, "content": "Second"},
    {"sender_name": "user_two", "timestamp_ms": 1705315800000, "content": "First"}
  ],
  "title": "Trip"
}"#;

const WHATSAPP: &str = "15/01/2024, 10:29 - Messages and calls are end-to-end encrypted.\n\
15/01/2024, 10:30 - Alice: Hello\n\
continued here\n\
15/01/2024, 10:31 - Bob: Hi!\n\
15/01/2024, 10:32 - Alice: <Media omitted>\n";

fn capture() -> (ProgressCallback, Arc<Mutex<Vec<ProgressEvent>>>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let callback: ProgressCallback = Arc::new(move |event| sink.lock().unwrap().push(event));
    (callback, events)
}

/// `(sender platform id, ts, type)` for every stored message, in id order.
fn triples(store: &SessionStore) -> Vec<(String, i64, String)> {
    let by_id: HashMap<i64, String> = store
        .members()
        .unwrap()
        .into_iter()
        .map(|m| (m.id, m.platform_id))
        .collect();
    store
        .messages(0, u64::MAX >> 1)
        .unwrap()
        .into_iter()
        .map(|m| (by_id[&m.sender_id].clone(), m.ts, m.kind))
        .collect()
}

fn assert_ledger_contiguous(store: &SessionStore) {
    for member in store.members().unwrap() {
        let history = store.name_history(member.id).unwrap();
        assert!(!history.is_empty(), "{} has no history", member.platform_id);
        let open = history.iter().filter(|h| h.end_ts.is_none()).count();
        assert_eq!(open, 1, "{} must have exactly one open interval", member.platform_id);
        for pair in history.windows(2) {
            assert_eq!(pair[0].end_ts, Some(pair[1].start_ts));
        }
        assert!(history.last().unwrap().end_ts.is_none());
        assert_eq!(history.last().unwrap().name, member.name);
    }
}

// ============================================================================
// Preview / import agreement
// ============================================================================

#[test]
fn test_preview_matches_import_for_every_format() {
    let env = Env::new();
    let fixtures = [
        ("result.json", TELEGRAM, ExportFormat::TelegramJson),
        ("discord.json", DISCORD, ExportFormat::DiscordJson),
        ("message_1.json", INSTAGRAM, ExportFormat::InstagramJson),
        ("WhatsApp Chat with Bob.txt", WHATSAPP, ExportFormat::WhatsAppTxt),
    ];

    for (name, body, format) in fixtures {
        let path = env.write(name, body);
        let importer = env.importer();

        let info = importer.preview(&path, &no_progress()).unwrap();
        assert_eq!(info.format, format, "{name}");
        assert_eq!(info.file_size, body.len() as u64);

        let outcome = importer.import_file(&path, &no_progress()).unwrap();
        let store = env.open(&outcome.session_id);
        assert_eq!(store.message_count().unwrap(), info.message_count, "{name}");
        assert_eq!(store.member_count().unwrap(), info.member_count, "{name}");
        assert_eq!(outcome.message_count, info.message_count, "{name}");
        assert_eq!(outcome.skipped_messages, info.skipped_messages, "{name}");
        assert_eq!(outcome.format, Some(format));
    }
    assert_eq!(env.sessions().len(), 4);
}

#[test]
fn test_import_telegram_details() {
    let env = Env::new();
    let path = env.write("result.json", TELEGRAM);
    let outcome = env.importer().import_file(&path, &no_progress()).unwrap();

    assert_eq!(outcome.chat_name, "Family");
    assert_eq!(outcome.platform, Platform::Telegram);
    assert_eq!(outcome.message_count, 6);
    assert_eq!(outcome.member_count, 3);

    let store = env.open(&outcome.session_id);
    let meta = store.meta().unwrap().unwrap();
    assert_eq!(meta.chat_type, ChatKind::Group);
    assert_eq!(meta.source_file.as_deref(), path.to_str());

    let messages = store.messages(0, 10).unwrap();
    assert_eq!(messages[1].content.as_deref(), Some("Look https://example.com"));
    assert_eq!(messages[2].reply_to.as_deref(), Some("1"));
    assert_eq!(messages[3].kind, MessageKind::System.as_str());
    assert_eq!(messages[4].kind, MessageKind::Image.as_str());
}

// ============================================================================
// Validation
// ============================================================================

#[test]
fn test_invalid_records_are_skipped_not_fatal() {
    let env = Env::new();
    let path = env.write(
        "result.json",
        r#"{
  "name": "Mixed",
  "type": "personal_chat",
  "messages": [
    {"id": 1, "type": "message", "date_unixtime": "1705314600", "from": "A", "from_id": "u1", "text": "ok"},
    {"id": 2, "type": "message", "date_unixtime": "1705314601", "from": "A", "text": "no id"},
    {"id": 3, "type": "message", "from": "A", "from_id": "u1", "text": "no date"},
    {"id": 4, "type": "message", "date_unixtime": "1705314603", "from": "   ", "from_id": "u1", "text": "blank name"},
    {"id": 5, "type": "message", "date_unixtime": "1705314604", "from": "B", "from_id": "u2", "text": "ok"},
    "not even an object",
    {"id": 7, "type": "message", "date_unixtime": "1705314606", "from": "A", "from_id": "u1", "text": "ok"}
  ]
}"#,
    );

    let outcome = env.importer().import_file(&path, &no_progress()).unwrap();
    assert_eq!(outcome.message_count, 3);
    assert_eq!(outcome.skipped_messages, 4);

    let store = env.open(&outcome.session_id);
    assert_eq!(store.message_count().unwrap(), 3);
    assert_eq!(store.member_count().unwrap(), 2);
}

#[test]
fn test_whatsapp_system_lines_are_skipped() {
    let env = Env::new();
    let path = env.write("chat.txt", WHATSAPP);
    let outcome = env.importer().import_file(&path, &no_progress()).unwrap();

    assert_eq!(outcome.message_count, 3);
    assert_eq!(outcome.skipped_messages, 1);
    assert_eq!(outcome.member_count, 2);

    let store = env.open(&outcome.session_id);
    let messages = store.messages(0, 10).unwrap();
    assert_eq!(messages[0].content.as_deref(), Some("Hello\ncontinued here"));
}

// ============================================================================
// Members and name history
// ============================================================================

#[test]
fn test_member_upsert_is_idempotent() {
    let env = Env::new();
    let path = env.write("discord.json", DISCORD);
    let outcome = env.importer().import_file(&path, &no_progress()).unwrap();

    let store = env.open(&outcome.session_id);
    let members = store.members().unwrap();
    assert_eq!(members.len(), 2);
    let alice = store.member_by_platform_id("42").unwrap().unwrap();
    assert_eq!(alice.name, "Alice");
    assert_eq!(alice.nickname.as_deref(), Some("Alice"));
}

#[test]
fn test_name_history_tracks_renames() {
    let env = Env::new();
    let path = env.write("result.json", TELEGRAM);
    let outcome = env.importer().import_file(&path, &no_progress()).unwrap();
    let store = env.open(&outcome.session_id);

    let user1 = store.member_by_platform_id("user1").unwrap().unwrap();
    assert_eq!(user1.name, "Alice");
    let history = store.name_history(user1.id).unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].name, "Al");
    assert_eq!(history[0].start_ts, 1_705_314_600);
    assert_eq!(history[0].end_ts, Some(1_705_314_720));
    assert_eq!(history[1].name, "Alice");
    assert_eq!(history[1].end_ts, None);

    assert_ledger_contiguous(&store);
}

#[test]
fn test_listed_member_without_messages() {
    let env = Env::new();
    let path = env.write("message_1.json", INSTAGRAM);
    let outcome = env.importer().import_file(&path, &no_progress()).unwrap();
    let store = env.open(&outcome.session_id);

    assert_eq!(outcome.member_count, 3);
    let lurker = store.member_by_platform_id("lurker").unwrap().unwrap();
    let history = store.name_history(lurker.id).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].start_ts, 1_705_315_800);
    assert_ledger_contiguous(&store);
}

// ============================================================================
// Atomicity
// ============================================================================

/// Delivers one good batch, then fails as a storage layer would.
struct FailingParser;

impl StreamParser for FailingParser {
    fn name(&self) -> &'static str {
        "Failing"
    }

    fn platform(&self) -> Platform {
        Platform::WhatsApp
    }

    fn parse(
        &self,
        _path: &Path,
        _config: &StreamingConfig,
        sink: &mut dyn ParseSink,
    ) -> chatload::Result<ParseSummary> {
        sink.on_meta(ParsedMeta::new("doomed", Platform::WhatsApp, ChatKind::Private))?;
        sink.on_members(vec![ParsedMember::new("a", "A")])?;
        sink.on_message_batch(vec![
            ParsedMessage::new("a", "A", 1, MessageKind::Text),
            ParsedMessage::new("b", "B", 2, MessageKind::Text),
        ])?;
        Err(ChatloadError::Storage(rusqlite::Error::QueryReturnedNoRows))
    }
}

#[test]
fn test_failure_mid_import_leaves_no_store() {
    let env = Env::new();
    let path = env.write("anything.txt", "irrelevant");
    let (progress, events) = capture();

    let err = env
        .importer()
        .import_with_parser(&FailingParser, &path, &progress)
        .unwrap_err();

    assert!(err.is_storage());
    assert!(env.sessions().is_empty());
    assert!(env.artifacts().is_empty(), "left behind: {:?}", env.artifacts());
    let last = events.lock().unwrap().last().cloned().unwrap();
    assert_eq!(last.stage, ProgressStage::Error);
}

#[test]
fn test_malformed_json_after_committed_batches_leaves_no_store() {
    let env = Env::new();
    let mut body = String::from(r#"{"name": "Broken", "type": "personal_chat", "messages": ["#);
    for i in 0..50 {
        body.push_str(&format!(
            r#"{{"id": {i}, "type": "message", "date_unixtime": "{}", "from": "A", "from_id": "u1", "text": "m"}},"#,
            1_705_314_600 + i
        ));
    }
    body.push_str(r#"{"id": 99, "type": "message",, }]}"#);
    let path = env.write("result.json", &body);

    let importer = Importer::new(env.config().with_batch_size(10));
    let err = importer.import_file(&path, &no_progress()).unwrap_err();

    assert!(err.is_parse(), "{err}");
    assert!(env.sessions().is_empty());
    assert!(env.artifacts().is_empty());
}

#[test]
fn test_unrecognized_format_creates_nothing() {
    let env = Env::new();
    let path = env.write("notes.txt", "shopping list\n- milk\n- eggs\n");
    let err = env.importer().import_file(&path, &no_progress()).unwrap_err();

    assert!(err.is_unrecognized_format());
    assert!(env.sessions().is_empty());
}

#[test]
fn test_missing_file() {
    let env = Env::new();
    let err = env
        .importer()
        .import_file(&env.dir.path().join("gone.json"), &no_progress())
        .unwrap_err();
    assert!(err.is_io());
}

// ============================================================================
// Preprocessing
// ============================================================================

#[test]
fn test_preprocessed_import_matches_direct_import() {
    let env = Env::new();
    let path = env.write("result.json", TELEGRAM);

    let direct = env.importer().import_file(&path, &no_progress()).unwrap();

    let (progress, events) = capture();
    let slimming = Importer::new(env.config().with_preprocess_threshold(0));
    let slimmed = slimming.import_file(&path, &progress).unwrap();

    let stages: Vec<_> = events.lock().unwrap().iter().map(|e| e.stage).collect();
    assert!(stages.contains(&ProgressStage::Preprocessing));
    assert_eq!(stages.last(), Some(&ProgressStage::Done));

    assert_eq!(direct.message_count, slimmed.message_count);
    assert_eq!(direct.member_count, slimmed.member_count);
    assert_eq!(
        triples(&env.open(&direct.session_id)),
        triples(&env.open(&slimmed.session_id))
    );
    // Slimmed copy removed afterwards
    let leftovers: Vec<_> = fs::read_dir(env.temp_dir()).unwrap().flatten().collect();
    assert!(leftovers.is_empty());
}

#[test]
fn test_preprocessed_import_names_chat_after_source_file() {
    let env = Env::new();
    let path = env.write(
        "family.json",
        r#"{"type": "private_group", "messages": [
          {"id": 1, "type": "message", "date_unixtime": "1705314600", "from": "Al", "from_id": "user1", "text": "Hi"}
        ]}"#,
    );

    let direct = env.importer().import_file(&path, &no_progress()).unwrap();
    let slimmed = Importer::new(env.config().with_preprocess_threshold(0))
        .import_file(&path, &no_progress())
        .unwrap();

    assert_eq!(direct.chat_name, "family");
    assert_eq!(slimmed.chat_name, "family");
    assert_eq!(env.open(&slimmed.session_id).meta().unwrap().unwrap().name, "family");
}

#[test]
fn test_discord_preprocessed_import_matches_direct_import() {
    let env = Env::new();
    let path = env.write("discord.json", DISCORD);

    let direct = env.importer().import_file(&path, &no_progress()).unwrap();
    let slimmed = Importer::new(env.config().with_preprocess_threshold(0))
        .import_file(&path, &no_progress())
        .unwrap();

    assert_eq!(
        triples(&env.open(&direct.session_id)),
        triples(&env.open(&slimmed.session_id))
    );
}

// ============================================================================
// Explicit parser, progress
// ============================================================================

#[test]
fn test_import_with_explicit_parser() {
    let env = Env::new();
    // Extension would not be detected as Telegram
    let path = env.write("export.data", TELEGRAM);
    assert!(env.importer().detect(&path).is_err());

    let outcome = env
        .importer()
        .import_with_parser(&TelegramStreamParser::new(), &path, &no_progress())
        .unwrap();
    assert_eq!(outcome.format, None);
    assert_eq!(outcome.message_count, 6);
}

/// Counters never move backwards across any two events of one operation.
fn assert_monotonic(events: &[ProgressEvent]) {
    for pair in events.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        assert!(
            a.records_processed <= b.records_processed && a.bytes_read <= b.bytes_read,
            "regressed: {} r={} b={} -> {} r={} b={}",
            a.stage,
            a.records_processed,
            a.bytes_read,
            b.stage,
            b.records_processed,
            b.bytes_read
        );
    }
}

#[test]
fn test_progress_is_monotonic() {
    let env = Env::new();
    let mut body = String::new();
    for i in 0..1_000 {
        body.push_str(&format!("15/01/2024, {:02}:{:02} - User{}: message {i}\n", i / 60 % 24, i % 60, i % 3));
    }
    let path = env.write("chat.txt", &body);
    let (progress, events) = capture();

    Importer::new(env.config().with_progress_interval(100))
        .import_file(&path, &progress)
        .unwrap();

    let events = events.lock().unwrap();
    let importing = events
        .iter()
        .filter(|e| e.stage == ProgressStage::Importing)
        .count();
    assert!(importing >= 10);
    assert_monotonic(&events);

    assert_eq!(events.first().unwrap().stage, ProgressStage::Detecting);
    let done = events.last().unwrap();
    assert_eq!(done.stage, ProgressStage::Done);
    assert_eq!(done.records_processed, 1_000);
    assert_eq!(done.bytes_read, body.len() as u64);
    assert_eq!(done.total_bytes, body.len() as u64);
}

#[test]
fn test_progress_is_monotonic_across_preprocessing() {
    let env = Env::new();
    let path = env.write("result.json", TELEGRAM);
    let (progress, events) = capture();

    Importer::new(env.config().with_preprocess_threshold(0).with_progress_interval(2))
        .import_file(&path, &progress)
        .unwrap();

    let events = events.lock().unwrap();
    let stages: Vec<_> = events.iter().map(|e| e.stage).collect();
    assert!(stages.contains(&ProgressStage::Preprocessing));
    assert!(stages.contains(&ProgressStage::Importing));
    assert_monotonic(&events);

    let done = events.last().unwrap();
    assert_eq!(done.stage, ProgressStage::Done);
    assert_eq!(done.total_bytes, TELEGRAM.len() as u64);
    assert_eq!(done.records_processed, 6);
}

#[test]
fn test_failed_preprocess_reports_one_error() {
    let env = Env::new();
    let mut body = String::from(r#"{"name": "Broken", "type": "personal_chat", "messages": ["#);
    for i in 0..20 {
        body.push_str(&format!(
            r#"{{"id": {i}, "type": "message", "date_unixtime": "{}", "from": "A", "from_id": "u1", "text": "m"}},"#,
            1_705_314_600 + i
        ));
    }
    body.push_str(r#"{"id": 99, "type": "message",, }]}"#);
    let path = env.write("result.json", &body);
    let (progress, events) = capture();

    let err = Importer::new(env.config().with_preprocess_threshold(0).with_progress_interval(5))
        .import_file(&path, &progress)
        .unwrap_err();

    assert!(err.is_preprocess(), "{err}");
    let events = events.lock().unwrap();
    let errors: Vec<_> = events
        .iter()
        .filter(|e| e.stage == ProgressStage::Error)
        .collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(events.last().unwrap().stage, ProgressStage::Error);
    // The error carries how far slimming got
    assert_eq!(errors[0].records_processed, 20);
    assert_monotonic(&events);
}

// ============================================================================
// End to end
// ============================================================================

#[test]
fn test_ten_megabyte_whatsapp_export() {
    let env = Env::new();
    let filler = "lorem ipsum ".repeat(170);
    let senders = ["Alice", "Bob", "Carol"];
    let mut body = String::with_capacity(11 * 1024 * 1024);
    for i in 0..5_000 {
        let day = 1 + i / 1_440;
        let minute = i % 1_440;
        body.push_str(&format!(
            "{day:02}/03/2024, {:02}:{:02} - {}: {i} {filler}\n",
            minute / 60,
            minute % 60,
            senders[i % 3]
        ));
    }
    assert!(body.len() >= 10_000_000);
    let path = env.write("WhatsApp Chat with Family.txt", &body);

    let outcome = env.importer().import_file(&path, &no_progress()).unwrap();
    assert_eq!(outcome.message_count, 5_000);
    assert_eq!(outcome.member_count, 3);
    assert_eq!(outcome.skipped_messages, 0);
    assert_eq!(outcome.chat_name, "Family");

    assert!(env.sessions().contains(&outcome.session_id));
    let store = env.open(&outcome.session_id);
    assert_eq!(store.message_count().unwrap(), 5_000);
    assert_eq!(store.member_count().unwrap(), 3);
    assert_eq!(store.meta().unwrap().unwrap().chat_type, ChatKind::Group);
    assert_ledger_contiguous(&store);
}
