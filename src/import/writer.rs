//! The sink that turns a parse into rows.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::path::Path;

use rusqlite::{Connection, params};
use tracing::debug;

use super::validate::{SkipStats, ValidMessage, validate};
use crate::error::Result;
use crate::model::{ParsedMember, ParsedMessage, ParsedMeta};
use crate::progress::{ProgressCallback, ProgressEvent, ProgressStage};
use crate::store::insert_meta;
use crate::streaming::ParseSink;

const INSERT_MEMBER: &str =
    "INSERT OR IGNORE INTO member (platform_id, name, nickname) VALUES (?1, ?2, ?3)";
const SELECT_MEMBER: &str = "SELECT id FROM member WHERE platform_id = ?1";
const INSERT_MESSAGE: &str = "INSERT INTO message (sender_id, ts, type, content, platform_message_id, reply_to)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6)";
const INSERT_HISTORY: &str =
    "INSERT INTO member_name_history (member_id, name, start_ts, end_ts) VALUES (?1, ?2, ?3, ?4)";
const UPDATE_NAME: &str = "UPDATE member SET name = ?2 WHERE id = ?1";

/// A run of messages sent under one name.
#[derive(Debug, Clone)]
struct NameRun {
    name: String,
    /// Earliest timestamp seen in the run
    start_ts: i64,
}

#[derive(Debug)]
struct MemberState {
    id: i64,
    /// Name the row was inserted with
    stored_name: String,
    runs: Vec<NameRun>,
}

impl MemberState {
    /// Extends the current run or starts a new one on a name change.
    fn observe(&mut self, name: &str, ts: i64) {
        match self.runs.last_mut() {
            Some(run) if run.name == name => run.start_ts = run.start_ts.min(ts),
            _ => self.runs.push(NameRun {
                name: name.to_string(),
                start_ts: ts,
            }),
        }
    }

    /// Runs ordered by time with neighbours of the same name merged.
    fn timeline(&self) -> Vec<NameRun> {
        let mut runs = self.runs.clone();
        runs.sort_by_key(|r| r.start_ts);
        let mut merged: Vec<NameRun> = Vec::with_capacity(runs.len());
        for run in runs {
            match merged.last() {
                Some(prev) if prev.name == run.name => {}
                _ => merged.push(run),
            }
        }
        merged
    }
}

/// Totals reported by [`ImportWriter::finish`].
#[derive(Debug, Clone)]
pub(crate) struct WriteStats {
    pub(crate) meta: ParsedMeta,
    pub(crate) messages: u64,
    pub(crate) members: u64,
    pub(crate) skipped: SkipStats,
}

/// Writes one parse into an open transaction.
///
/// The `platform_id -> member` map lives for the whole import and is the
/// only lookup used while inserting messages. Name history is collected as
/// runs and written on [`finish`](Self::finish), so files delivered newest
/// first produce the same intervals as files delivered oldest first.
pub(crate) struct ImportWriter<'c> {
    conn: &'c Connection,
    source: &'c Path,
    fallback_meta: ParsedMeta,
    meta: Option<ParsedMeta>,
    members: HashMap<String, MemberState>,
    messages: u64,
    skipped: SkipStats,
    first_ts: Option<i64>,
    progress: ProgressCallback,
}

impl<'c> ImportWriter<'c> {
    pub(crate) fn new(
        conn: &'c Connection,
        source: &'c Path,
        fallback_meta: ParsedMeta,
        progress: ProgressCallback,
    ) -> Self {
        Self {
            conn,
            source,
            fallback_meta,
            meta: None,
            members: HashMap::new(),
            messages: 0,
            skipped: SkipStats::default(),
            first_ts: None,
            progress,
        }
    }

    fn ensure_member(
        &mut self,
        platform_id: &str,
        name: &str,
        nickname: Option<&str>,
    ) -> Result<&mut MemberState> {
        let conn = self.conn;
        match self.members.entry(platform_id.to_string()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let inserted = conn
                    .prepare_cached(INSERT_MEMBER)?
                    .execute(params![platform_id, name, nickname])?;
                let id = if inserted == 1 {
                    conn.last_insert_rowid()
                } else {
                    conn.prepare_cached(SELECT_MEMBER)?
                        .query_row([platform_id], |r| r.get(0))?
                };
                Ok(entry.insert(MemberState {
                    id,
                    stored_name: name.to_string(),
                    runs: Vec::new(),
                }))
            }
        }
    }

    fn insert_message(&mut self, msg: &ValidMessage<'_>) -> Result<()> {
        let state = self.ensure_member(msg.sender_platform_id, msg.sender_name, None)?;
        state.observe(msg.sender_name, msg.timestamp);
        let sender_id = state.id;

        self.conn.prepare_cached(INSERT_MESSAGE)?.execute(params![
            sender_id,
            msg.timestamp,
            msg.kind.as_str(),
            msg.content,
            msg.platform_message_id,
            msg.reply_to,
        ])?;
        self.messages += 1;
        self.first_ts = Some(self.first_ts.map_or(msg.timestamp, |t| t.min(msg.timestamp)));
        Ok(())
    }

    /// Writes fallback meta if none arrived, the name ledger and final names.
    pub(crate) fn finish(self) -> Result<WriteStats> {
        let meta = match self.meta {
            Some(meta) => meta,
            None => {
                debug!(name = %self.fallback_meta.name, "no meta emitted, writing fallback");
                insert_meta(self.conn, &self.fallback_meta, Some(self.source))?;
                self.fallback_meta
            }
        };

        let origin = self.first_ts.unwrap_or(0);
        let mut history = self.conn.prepare_cached(INSERT_HISTORY)?;
        let mut rename = self.conn.prepare_cached(UPDATE_NAME)?;
        for state in self.members.values() {
            let mut timeline = state.timeline();
            if timeline.is_empty() {
                // Listed but never spoke: known by the listed name throughout.
                timeline.push(NameRun {
                    name: state.stored_name.clone(),
                    start_ts: origin,
                });
            }
            for (i, run) in timeline.iter().enumerate() {
                let end_ts = timeline.get(i + 1).map(|next| next.start_ts);
                history.execute(params![state.id, run.name, run.start_ts, end_ts])?;
            }
            if let Some(current) = timeline.last().filter(|r| r.name != state.stored_name) {
                rename.execute(params![state.id, current.name])?;
            }
        }

        Ok(WriteStats {
            meta,
            messages: self.messages,
            members: self.members.len() as u64,
            skipped: self.skipped,
        })
    }
}

impl ParseSink for ImportWriter<'_> {
    fn on_meta(&mut self, meta: ParsedMeta) -> Result<()> {
        if self.meta.is_some() {
            debug!("ignoring repeated meta");
            return Ok(());
        }
        insert_meta(self.conn, &meta, Some(self.source))?;
        self.meta = Some(meta);
        Ok(())
    }

    fn on_members(&mut self, members: Vec<ParsedMember>) -> Result<()> {
        for member in members.iter().filter(|m| !m.platform_id.is_empty()) {
            self.ensure_member(&member.platform_id, &member.name, member.nickname.as_deref())?;
        }
        Ok(())
    }

    fn on_message_batch(&mut self, messages: Vec<ParsedMessage>) -> Result<()> {
        debug!(size = messages.len(), "writing batch");
        for msg in &messages {
            match validate(msg) {
                Ok(valid) => self.insert_message(&valid)?,
                Err(reason) => {
                    self.skipped.record(reason);
                    debug!(%reason, id = ?msg.platform_message_id, "skipping message");
                }
            }
        }
        Ok(())
    }

    fn on_progress(&mut self, event: ProgressEvent) {
        (self.progress)(ProgressEvent {
            stage: ProgressStage::Importing,
            ..event
        });
    }
}
