//! Per-record validity rules shared by import and preview.

use std::fmt;

use serde::Serialize;

use crate::model::{MessageKind, ParsedMessage};

/// Why a parsed message was not ingested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    MissingSenderId,
    MissingSenderName,
    MissingTimestamp,
    MissingKind,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::MissingSenderId => "missing sender id",
            SkipReason::MissingSenderName => "missing sender name",
            SkipReason::MissingTimestamp => "missing timestamp",
            SkipReason::MissingKind => "missing type",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message that passed validation, borrowing from the parsed record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidMessage<'a> {
    pub sender_platform_id: &'a str,
    /// Trimmed
    pub sender_name: &'a str,
    pub timestamp: i64,
    pub kind: MessageKind,
    pub content: Option<&'a str>,
    pub platform_message_id: Option<&'a str>,
    pub reply_to: Option<&'a str>,
}

/// Checks the required fields of `msg`.
///
/// # Example
///
/// ```
/// use chatload::import::{SkipReason, validate};
/// use chatload::model::{MessageKind, ParsedMessage};
///
/// let ok = ParsedMessage::new("u1", "Alice", 1_700_000_000, MessageKind::Text);
/// assert!(validate(&ok).is_ok());
///
/// let blank = ParsedMessage::new("u1", "   ", 1_700_000_000, MessageKind::Text);
/// assert_eq!(validate(&blank), Err(SkipReason::MissingSenderName));
/// ```
pub fn validate(msg: &ParsedMessage) -> Result<ValidMessage<'_>, SkipReason> {
    let sender_platform_id = msg
        .sender_platform_id
        .as_deref()
        .filter(|id| !id.is_empty())
        .ok_or(SkipReason::MissingSenderId)?;
    let sender_name = msg
        .sender_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .ok_or(SkipReason::MissingSenderName)?;
    let timestamp = msg.timestamp.ok_or(SkipReason::MissingTimestamp)?;
    let kind = msg.kind.ok_or(SkipReason::MissingKind)?;

    Ok(ValidMessage {
        sender_platform_id,
        sender_name,
        timestamp,
        kind,
        content: msg.content.as_deref(),
        platform_message_id: msg.platform_message_id.as_deref(),
        reply_to: msg.reply_to.as_deref(),
    })
}

/// Skip counts by reason.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SkipStats {
    pub missing_sender_id: u64,
    pub missing_sender_name: u64,
    pub missing_timestamp: u64,
    pub missing_kind: u64,
}

impl SkipStats {
    pub fn record(&mut self, reason: SkipReason) {
        match reason {
            SkipReason::MissingSenderId => self.missing_sender_id += 1,
            SkipReason::MissingSenderName => self.missing_sender_name += 1,
            SkipReason::MissingTimestamp => self.missing_timestamp += 1,
            SkipReason::MissingKind => self.missing_kind += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.missing_sender_id + self.missing_sender_name + self.missing_timestamp + self.missing_kind
    }
}
