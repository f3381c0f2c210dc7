//! Session store schema.
//!
//! Every session database is created fresh by one import, so there is a
//! single schema version; `PRAGMA user_version` records it for readers.

use rusqlite::Connection;

use crate::error::Result;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS meta (
    name            TEXT NOT NULL,
    platform        TEXT NOT NULL,
    chat_type       TEXT NOT NULL,
    source_file     TEXT,
    imported_at     INTEGER NOT NULL,
    schema_version  INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS member (
    id              INTEGER PRIMARY KEY,
    platform_id     TEXT NOT NULL UNIQUE,
    name            TEXT NOT NULL,
    nickname        TEXT
);

-- end_ts IS NULL marks the open interval; at most one per member
CREATE TABLE IF NOT EXISTS member_name_history (
    id              INTEGER PRIMARY KEY,
    member_id       INTEGER NOT NULL REFERENCES member(id),
    name            TEXT NOT NULL,
    start_ts        INTEGER NOT NULL,
    end_ts          INTEGER
);

CREATE TABLE IF NOT EXISTS message (
    id                  INTEGER PRIMARY KEY,
    sender_id           INTEGER NOT NULL REFERENCES member(id),
    ts                  INTEGER NOT NULL,
    type                TEXT NOT NULL,
    content             TEXT,
    platform_message_id TEXT,
    reply_to            TEXT
);

CREATE INDEX IF NOT EXISTS idx_message_ts ON message(ts);
CREATE INDEX IF NOT EXISTS idx_message_sender ON message(sender_id);
CREATE INDEX IF NOT EXISTS idx_name_history_member ON member_name_history(member_id);
";

/// Creates all tables and indexes and stamps the schema version.
pub fn apply(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    conn.execute_batch(&format!("PRAGMA user_version = {SCHEMA_VERSION}"))?;
    Ok(())
}

/// Get the current schema version from the database
pub fn schema_version(conn: &Connection) -> Result<i32> {
    let version: i32 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
    Ok(version)
}
