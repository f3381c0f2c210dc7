use std::collections::HashSet;

use super::validate::{SkipStats, validate};
use crate::error::Result;
use crate::model::{ParsedMember, ParsedMessage, ParsedMeta};
use crate::progress::{ProgressCallback, ProgressEvent};
use crate::streaming::ParseSink;

/// Counts what an import of the same file would write, without writing.
pub(crate) struct PreviewCounter {
    pub(crate) meta: Option<ParsedMeta>,
    members: HashSet<String>,
    pub(crate) messages: u64,
    pub(crate) skipped: SkipStats,
    progress: ProgressCallback,
}

impl PreviewCounter {
    pub(crate) fn new(progress: ProgressCallback) -> Self {
        Self {
            meta: None,
            members: HashSet::new(),
            messages: 0,
            skipped: SkipStats::default(),
            progress,
        }
    }

    pub(crate) fn member_count(&self) -> u64 {
        self.members.len() as u64
    }
}

impl ParseSink for PreviewCounter {
    fn on_meta(&mut self, meta: ParsedMeta) -> Result<()> {
        self.meta.get_or_insert(meta);
        Ok(())
    }

    fn on_members(&mut self, members: Vec<ParsedMember>) -> Result<()> {
        self.members.extend(
            members
                .into_iter()
                .map(|m| m.platform_id)
                .filter(|id| !id.is_empty()),
        );
        Ok(())
    }

    fn on_message_batch(&mut self, messages: Vec<ParsedMessage>) -> Result<()> {
        for msg in &messages {
            match validate(msg) {
                Ok(valid) => {
                    self.messages += 1;
                    if !self.members.contains(valid.sender_platform_id) {
                        self.members.insert(valid.sender_platform_id.to_string());
                    }
                }
                Err(reason) => self.skipped.record(reason),
            }
        }
        Ok(())
    }

    fn on_progress(&mut self, event: ProgressEvent) {
        (self.progress)(event);
    }
}
