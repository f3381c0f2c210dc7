//! Size-triggered slimming of heavy exports.
//!
//! Telegram and Discord exports embed payloads the importer never reads:
//! rich text duplicated next to the plain text, media descriptors,
//! embeds, avatar URLs. For files above the configured threshold the
//! [`Preprocessor`] rewrites the export into a compact copy with the same
//! top-level shape inside the [`TempWorkspace`], and the streaming parser
//! runs against that copy instead.
//!
//! A failed run removes its partial output; there is no partially
//! slimmed state.

mod discord;
mod telegram;
mod workspace;

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};

pub use workspace::TempWorkspace;

use crate::error::{ChatloadError, Result};
use crate::progress::{ProgressEvent, ProgressStage, ProgressTicker};
use crate::streaming::{JsonArrayReader, StreamingError, file_stem, parse_failure};

/// Which record reduction to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Slimming {
    Telegram,
    Discord,
}

impl Slimming {
    /// Name of the format being slimmed, used in errors.
    pub fn format_name(&self) -> &'static str {
        match self {
            Slimming::Telegram => "Telegram JSON",
            Slimming::Discord => "Discord JSON",
        }
    }

    /// Reduces one message record.
    pub fn slim(&self, record: Value) -> Value {
        match self {
            Slimming::Telegram => telegram::slim_telegram(record),
            Slimming::Discord => discord::slim_discord(record),
        }
    }
}

/// Rewrites an oversized export into a slimmed temp file.
#[derive(Debug, Clone)]
pub struct Preprocessor {
    slimming: Slimming,
    workspace: TempWorkspace,
    progress_interval: usize,
    max_record_size: usize,
    buffer_size: usize,
}

impl Preprocessor {
    pub fn new(slimming: Slimming, workspace: TempWorkspace) -> Self {
        Self {
            slimming,
            workspace,
            progress_interval: 10_000,
            max_record_size: 10 * 1024 * 1024,
            buffer_size: 64 * 1024,
        }
    }

    /// Records between progress events.
    #[must_use]
    pub fn with_progress_interval(mut self, interval: usize) -> Self {
        self.progress_interval = interval;
        self
    }

    /// Largest single record accepted.
    #[must_use]
    pub fn with_max_record_size(mut self, size: usize) -> Self {
        self.max_record_size = size;
        self
    }

    pub fn slimming(&self) -> Slimming {
        self.slimming
    }

    pub fn workspace(&self) -> &TempWorkspace {
        &self.workspace
    }

    /// Writes a slimmed copy of `input` and returns its path.
    ///
    /// # Errors
    ///
    /// Any I/O or syntax failure yields [`ChatloadError::Preprocess`]; the
    /// partial output has been deleted by then.
    pub fn preprocess(
        &self,
        input: &Path,
        on_progress: &mut dyn FnMut(ProgressEvent),
    ) -> Result<PathBuf> {
        let output = self.workspace.allocate(&file_stem(input), ".slim.json");
        info!(
            input = %input.display(),
            output = %output.display(),
            format = self.slimming.format_name(),
            "preprocessing oversized export"
        );
        on_progress(ProgressEvent::stage(
            ProgressStage::Preprocessing,
            format!("Slimming {}", input.display()),
        ));

        match self.slim_into(input, &output, on_progress) {
            Ok(records) => {
                info!(records, output = %output.display(), "preprocessing finished");
                Ok(output)
            }
            Err(err) => {
                if let Err(cleanup) = self.workspace.remove(&output) {
                    warn!(error = %cleanup, path = %output.display(), "failed to remove partial output");
                }
                Err(ChatloadError::preprocess(input, err))
            }
        }
    }

    /// Deletes a file produced by [`preprocess`](Self::preprocess).
    ///
    /// # Errors
    ///
    /// Refuses paths outside the workspace with
    /// [`ChatloadError::UnsafeTempPath`].
    pub fn cleanup(&self, path: &Path) -> Result<()> {
        self.workspace.remove(path)
    }

    fn slim_into(
        &self,
        input: &Path,
        output: &Path,
        on_progress: &mut dyn FnMut(ProgressEvent),
    ) -> Result<u64> {
        let format = self.slimming.format_name();
        let fail = |e: StreamingError| parse_failure(format, input, e);

        let file = File::open(input)?;
        let total = file.metadata()?.len();
        let mut reader = JsonArrayReader::new(
            BufReader::with_capacity(self.buffer_size, file),
            self.max_record_size,
        );
        let mut writer = BufWriter::new(File::create(output)?);

        let header = reader.open_array("messages").map_err(fail)?;
        writer.write_all(b"{")?;
        write_fields(&mut writer, &header, b",")?;
        writer.write_all(b"\"messages\":[")?;

        let mut ticker = ProgressTicker::new(ProgressStage::Preprocessing, total, self.progress_interval);
        let mut records = 0u64;
        while let Some(value) = reader.next_value().map_err(fail)? {
            if records > 0 {
                writer.write_all(b",")?;
            }
            serde_json::to_writer(&mut writer, &self.slimming.slim(value))?;
            records += 1;
            if let Some(event) = ticker.tick(reader.bytes_read(), records) {
                on_progress(event);
            }
        }
        writer.write_all(b"]")?;

        let trailer = reader.finish().map_err(fail)?;
        for (key, value) in &trailer {
            writer.write_all(b",")?;
            serde_json::to_writer(&mut writer, key)?;
            writer.write_all(b":")?;
            serde_json::to_writer(&mut writer, value)?;
        }
        writer.write_all(b"}")?;
        writer.flush()?;

        on_progress(ticker.finish(records));
        Ok(records)
    }
}

fn write_fields(writer: &mut impl Write, fields: &Map<String, Value>, separator: &[u8]) -> Result<()> {
    for (key, value) in fields {
        serde_json::to_writer(&mut *writer, key)?;
        writer.write_all(b":")?;
        serde_json::to_writer(&mut *writer, value)?;
        writer.write_all(separator)?;
    }
    Ok(())
}
