//! Session stores.
//!
//! Each imported file lands in its own SQLite database,
//! `<data_dir>/sessions/<session_id>.db`. A store is created fresh by an
//! import, populated inside one transaction, and either committed or
//! discarded together with its files.
//!
//! # Example
//!
//! ```rust,no_run
//! use chatload::store::{SessionStore, list_sessions};
//!
//! let data_dir = std::path::Path::new("/var/lib/chatload");
//! for id in list_sessions(data_dir)? {
//!     let store = SessionStore::open(data_dir, &id)?;
//!     println!("{id}: {} messages", store.message_count()?);
//! }
//! # Ok::<(), chatload::ChatloadError>(())
//! ```

pub mod schema;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use rand::Rng;
use rand::distributions::Alphanumeric;
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use serde::Serialize;

use crate::error::{ChatloadError, Result};
use crate::model::{ChatKind, Platform};

/// Sidecar files SQLite may leave next to a database.
const SIDECARS: &[&str] = &["-journal", "-wal", "-shm"];

/// Chat metadata as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionMeta {
    pub name: String,
    pub platform: Platform,
    pub chat_type: ChatKind,
    pub source_file: Option<String>,
    /// Unix seconds
    pub imported_at: i64,
    pub schema_version: i32,
}

/// A stored member row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Member {
    pub id: i64,
    pub platform_id: String,
    /// Last observed name
    pub name: String,
    pub nickname: Option<String>,
}

/// One interval of a member's display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NameInterval {
    pub name: String,
    pub start_ts: i64,
    /// `None` while the interval is open
    pub end_ts: Option<i64>,
}

/// A stored message row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredMessage {
    pub id: i64,
    pub sender_id: i64,
    pub ts: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub content: Option<String>,
    pub platform_message_id: Option<String>,
    pub reply_to: Option<String>,
}

/// Counts and metadata for one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub id: String,
    pub meta: Option<SessionMeta>,
    pub message_count: u64,
    pub member_count: u64,
}

/// Handle to one session database.
#[derive(Debug)]
pub struct SessionStore {
    id: String,
    path: PathBuf,
    conn: Connection,
}

impl SessionStore {
    /// Creates a new, empty session store with a fresh id.
    pub fn create(data_dir: &Path) -> Result<Self> {
        let dir = sessions_dir(data_dir);
        fs::create_dir_all(&dir)?;

        // Ids embed a timestamp and a random suffix; a collision is retried.
        let mut attempts = 0;
        let (id, path) = loop {
            let id = generate_session_id();
            let path = dir.join(format!("{id}.db"));
            if !path.exists() {
                break (id, path);
            }
            attempts += 1;
            if attempts >= 8 {
                return Err(ChatloadError::Io(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    "could not allocate a unique session id",
                )));
            }
        };

        let conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        let store = Self { id, path, conn };
        if let Err(err) = store.init() {
            if let Err(cleanup) = store.discard() {
                tracing::warn!(error = %cleanup, "failed to remove half-created store");
            }
            return Err(err);
        }
        tracing::debug!(session_id = %store.id, path = %store.path.display(), "created session store");
        Ok(store)
    }

    /// Opens an existing session.
    pub fn open(data_dir: &Path, id: &str) -> Result<Self> {
        let path = existing_session_path(data_dir, id)?;
        let conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self {
            id: id.to_string(),
            path,
            conn,
        })
    }

    fn init(&self) -> Result<()> {
        self.conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA cache_size = -64000;  -- 64MB cache
            ",
        )?;
        schema::apply(&self.conn)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub(crate) fn connection_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    /// Closes the connection.
    pub fn close(self) -> Result<()> {
        self.conn.close().map_err(|(_, e)| e.into())
    }

    /// Closes the connection and deletes the database and its sidecars.
    pub fn discard(self) -> Result<()> {
        let path = self.path.clone();
        if let Err((_, e)) = self.conn.close() {
            tracing::warn!(error = %e, "closing store before discard failed");
        }
        remove_artifacts(&path)
    }

    // ============================================
    // Read API
    // ============================================

    pub fn meta(&self) -> Result<Option<SessionMeta>> {
        let row = self
            .conn
            .query_row(
                "SELECT name, platform, chat_type, source_file, imported_at, schema_version
                 FROM meta LIMIT 1",
                [],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, i64>(4)?,
                        row.get::<_, i32>(5)?,
                    ))
                },
            )
            .optional()?;

        let Some((name, platform, chat_type, source_file, imported_at, schema_version)) = row else {
            return Ok(None);
        };
        Ok(Some(SessionMeta {
            name,
            platform: platform
                .parse()
                .map_err(|e: String| ChatloadError::invalid_format("session store", e))?,
            chat_type: chat_type
                .parse()
                .map_err(|e: String| ChatloadError::invalid_format("session store", e))?,
            source_file,
            imported_at,
            schema_version,
        }))
    }

    pub fn message_count(&self) -> Result<u64> {
        let n: i64 = self.conn.query_row("SELECT COUNT(*) FROM message", [], |r| r.get(0))?;
        Ok(n as u64)
    }

    pub fn member_count(&self) -> Result<u64> {
        let n: i64 = self.conn.query_row("SELECT COUNT(*) FROM member", [], |r| r.get(0))?;
        Ok(n as u64)
    }

    /// All members ordered by id.
    pub fn members(&self) -> Result<Vec<Member>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, platform_id, name, nickname FROM member ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok(Member {
                id: row.get(0)?,
                platform_id: row.get(1)?,
                name: row.get(2)?,
                nickname: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn member_by_platform_id(&self, platform_id: &str) -> Result<Option<Member>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, platform_id, name, nickname FROM member WHERE platform_id = ?1",
                [platform_id],
                |row| {
                    Ok(Member {
                        id: row.get(0)?,
                        platform_id: row.get(1)?,
                        name: row.get(2)?,
                        nickname: row.get(3)?,
                    })
                },
            )
            .optional()?)
    }

    /// Name intervals of one member, ordered by start.
    pub fn name_history(&self, member_id: i64) -> Result<Vec<NameInterval>> {
        let mut stmt = self.conn.prepare(
            "SELECT name, start_ts, end_ts FROM member_name_history
             WHERE member_id = ?1 ORDER BY start_ts, id",
        )?;
        let rows = stmt.query_map(params![member_id], |row| {
            Ok(NameInterval {
                name: row.get(0)?,
                start_ts: row.get(1)?,
                end_ts: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Messages in insertion order.
    pub fn messages(&self, offset: u64, limit: u64) -> Result<Vec<StoredMessage>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, sender_id, ts, type, content, platform_message_id, reply_to
             FROM message ORDER BY id LIMIT ?1 OFFSET ?2",
        )?;
        let rows = stmt.query_map(params![limit as i64, offset as i64], |row| {
            Ok(StoredMessage {
                id: row.get(0)?,
                sender_id: row.get(1)?,
                ts: row.get(2)?,
                kind: row.get(3)?,
                content: row.get(4)?,
                platform_message_id: row.get(5)?,
                reply_to: row.get(6)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn summary(&self) -> Result<SessionSummary> {
        Ok(SessionSummary {
            id: self.id.clone(),
            meta: self.meta()?,
            message_count: self.message_count()?,
            member_count: self.member_count()?,
        })
    }
}

/// Returns a new id: `<unix_millis>-<8 alphanumerics>`.
pub fn generate_session_id() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect();
    format!("{}-{suffix}", Utc::now().timestamp_millis())
}

/// Whether `id` has the shape of a generated session id.
pub fn is_valid_session_id(id: &str) -> bool {
    !id.is_empty() && id.len() <= 64 && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

pub fn sessions_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("sessions")
}

/// Path a session's database lives at (whether or not it exists).
pub fn session_path(data_dir: &Path, id: &str) -> PathBuf {
    sessions_dir(data_dir).join(format!("{id}.db"))
}

fn existing_session_path(data_dir: &Path, id: &str) -> Result<PathBuf> {
    if !is_valid_session_id(id) {
        return Err(ChatloadError::SessionNotFound(id.to_string()));
    }
    let path = session_path(data_dir, id);
    if !path.is_file() {
        return Err(ChatloadError::SessionNotFound(id.to_string()));
    }
    Ok(path)
}

/// Ids of all committed sessions, oldest first.
pub fn list_sessions(data_dir: &Path) -> Result<Vec<String>> {
    let dir = sessions_dir(data_dir);
    let entries = match fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut ids = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.extension().is_some_and(|e| e == "db") {
            if let Some(id) = path.file_stem().and_then(|s| s.to_str()) {
                if is_valid_session_id(id) {
                    ids.push(id.to_string());
                }
            }
        }
    }
    ids.sort();
    Ok(ids)
}

/// Deletes a session and all its files.
pub fn delete_session(data_dir: &Path, id: &str) -> Result<()> {
    let path = existing_session_path(data_dir, id)?;
    remove_artifacts(&path)?;
    tracing::info!(session_id = id, "deleted session");
    Ok(())
}

fn remove_artifacts(db_path: &Path) -> Result<()> {
    let mut targets = vec![db_path.to_path_buf()];
    for suffix in SIDECARS {
        let mut name = db_path.as_os_str().to_owned();
        name.push(suffix);
        targets.push(PathBuf::from(name));
    }
    for target in targets {
        match fs::remove_file(&target) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

/// Inserts the meta row.
pub(crate) fn insert_meta(
    conn: &Connection,
    meta: &crate::model::ParsedMeta,
    source_file: Option<&Path>,
) -> Result<()> {
    conn.execute(
        "INSERT INTO meta (name, platform, chat_type, source_file, imported_at, schema_version)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            meta.name,
            meta.platform.as_str(),
            meta.kind.as_str(),
            source_file.map(|p| p.to_string_lossy().into_owned()),
            Utc::now().timestamp(),
            schema::SCHEMA_VERSION,
        ],
    )?;
    Ok(())
}
