//! The import engine.
//!
//! [`Importer`] is the only component that writes session stores. One import
//! runs these stages strictly in order:
//!
//! 1. detect the format (fails with [`crate::ChatloadError::UnrecognizedFormat`])
//! 2. slim the file if it is a heavy format above the threshold
//! 3. create a fresh [`SessionStore`] and open one transaction
//! 4. stream the parser into an `ImportWriter`
//! 5. commit, or roll back and delete the store
//!
//! The temp file from step 2 is removed whatever the outcome.
//!
//! # Example
//!
//! ```rust,no_run
//! use chatload::config::ImportConfig;
//! use chatload::import::Importer;
//! use chatload::progress::stderr_progress;
//!
//! let importer = Importer::new(ImportConfig::new().with_data_dir("/tmp/chatload"));
//! let outcome = importer.import_file("result.json".as_ref(), &stderr_progress())?;
//! println!("{} messages in session {}", outcome.message_count, outcome.session_id);
//! # Ok::<(), chatload::ChatloadError>(())
//! ```

mod preview;
mod validate;
mod writer;

use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

pub use validate::{SkipReason, SkipStats, ValidMessage, validate};

use crate::config::ImportConfig;
use crate::error::Result;
use crate::format::{ExportFormat, FormatRegistry};
use crate::model::{ChatKind, ParsedMeta, Platform};
use crate::preprocess::{Preprocessor, TempWorkspace};
use crate::progress::{ProgressCallback, ProgressEvent, ProgressStage, monotonic};
use crate::store::SessionStore;
use crate::streaming::{StreamParser, StreamingConfig, file_stem};
use preview::PreviewCounter;
use writer::{ImportWriter, WriteStats};

/// Result of a committed import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportOutcome {
    pub session_id: String,
    /// `None` when the parser was chosen by the caller
    pub format: Option<ExportFormat>,
    pub platform: Platform,
    pub chat_name: String,
    pub message_count: u64,
    pub member_count: u64,
    /// Records dropped by validation
    pub skipped_messages: u64,
}

/// Counts an import would produce, gathered without writing anything.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileInfo {
    pub name: String,
    pub format: ExportFormat,
    pub platform: Platform,
    pub message_count: u64,
    pub member_count: u64,
    pub file_size: u64,
    pub skipped_messages: u64,
}

/// Runs detection, preprocessing, parsing and storage for single files.
#[derive(Debug, Clone)]
pub struct Importer {
    config: ImportConfig,
    registry: FormatRegistry,
}

impl Importer {
    /// Creates an importer over the built-in formats.
    pub fn new(config: ImportConfig) -> Self {
        let registry = FormatRegistry::new().with_preprocess_threshold(config.preprocess_threshold);
        Self { config, registry }
    }

    /// Replaces the format registry.
    #[must_use]
    pub fn with_registry(mut self, registry: FormatRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn config(&self) -> &ImportConfig {
        &self.config
    }

    pub fn registry(&self) -> &FormatRegistry {
        &self.registry
    }

    /// Detects the format of `path`.
    pub fn detect(&self, path: &Path) -> Result<ExportFormat> {
        Ok(self.registry.detect_or_fail(path)?.format)
    }

    /// Imports `path` into a new session store.
    ///
    /// # Errors
    ///
    /// Any failure leaves no store behind. Invalid records are not failures;
    /// they are counted in [`ImportOutcome::skipped_messages`].
    pub fn import_file(&self, path: &Path, progress: &ProgressCallback) -> Result<ImportOutcome> {
        let progress = monotonic(Arc::clone(progress));
        let result = self.run_import(path, &progress);
        report(&result, &progress, |o| {
            format!("Imported {} messages into session {}", o.message_count, o.session_id)
        });
        result
    }

    /// Imports `path` with an explicit parser, skipping detection and
    /// preprocessing.
    pub fn import_with_parser(
        &self,
        parser: &dyn StreamParser,
        path: &Path,
        progress: &ProgressCallback,
    ) -> Result<ImportOutcome> {
        let progress = monotonic(Arc::clone(progress));
        let result = self
            .write_session(parser, path, path, &progress)
            .map(|(id, stats)| outcome(id, None, stats));
        report(&result, &progress, |o| {
            format!("Imported {} messages into session {}", o.message_count, o.session_id)
        });
        result
    }

    /// Parses `path` and counts what an import would store.
    pub fn preview(&self, path: &Path, progress: &ProgressCallback) -> Result<FileInfo> {
        let progress = monotonic(Arc::clone(progress));
        let result = self.run_preview(path, &progress);
        report(&result, &progress, |info| {
            format!("{} messages from {} members", info.message_count, info.member_count)
        });
        result
    }

    fn run_import(&self, path: &Path, progress: &ProgressCallback) -> Result<ImportOutcome> {
        progress(ProgressEvent::stage(
            ProgressStage::Detecting,
            format!("Detecting {}", path.display()),
        ));
        let descriptor = self.registry.detect_or_fail(path)?;
        let format = descriptor.format;
        let size = fs::metadata(path)?.len();
        info!(path = %path.display(), format = %format, size, "importing");

        let slimmed = match descriptor.slimming() {
            Some(slimming) if descriptor.needs_preprocess(size, self.registry.preprocess_threshold()) => {
                let preprocessor = Preprocessor::new(slimming, TempWorkspace::new(&self.config.temp_dir)?)
                    .with_progress_interval(self.config.progress_interval)
                    .with_max_record_size(self.config.max_message_size);
                let output = preprocessor.preprocess(path, &mut |event| progress(event))?;
                Some((preprocessor, output))
            }
            _ => None,
        };

        let parse_path = slimmed.as_ref().map_or(path, |(_, output)| output.as_path());
        let parser = descriptor.parser();
        let result = self.write_session(parser.as_ref(), parse_path, path, progress);

        if let Some((preprocessor, output)) = &slimmed {
            if let Err(err) = preprocessor.cleanup(output) {
                warn!(error = %err, path = %output.display(), "failed to remove slimmed file");
            }
        }

        let (session_id, stats) = result?;
        Ok(outcome(session_id, Some(format), stats))
    }

    /// Creates a store and fills it from `parser`; the store is deleted again
    /// on any failure.
    fn write_session(
        &self,
        parser: &dyn StreamParser,
        parse_path: &Path,
        source: &Path,
        progress: &ProgressCallback,
    ) -> Result<(String, WriteStats)> {
        let streaming = self
            .config
            .streaming_config(fs::metadata(source)?.len())
            .with_display_name(file_stem(source));
        let mut store = SessionStore::create(&self.config.data_dir)?;
        let session_id = store.id().to_string();

        let written = populate(&mut store, parser, parse_path, source, &streaming, progress);
        match written {
            Ok(stats) => {
                if let Err(err) = store.close() {
                    warn!(error = %err, session_id = %session_id, "closing committed store failed");
                }
                if stats.skipped.total() > 0 {
                    info!(
                        skipped = stats.skipped.total(),
                        missing_sender_id = stats.skipped.missing_sender_id,
                        missing_sender_name = stats.skipped.missing_sender_name,
                        missing_timestamp = stats.skipped.missing_timestamp,
                        missing_type = stats.skipped.missing_kind,
                        "invalid records skipped"
                    );
                }
                info!(
                    session_id = %session_id,
                    messages = stats.messages,
                    members = stats.members,
                    "import committed"
                );
                Ok((session_id, stats))
            }
            Err(err) => {
                warn!(error = %err, session_id = %session_id, "import failed, discarding store");
                if let Err(cleanup) = store.discard() {
                    warn!(error = %cleanup, session_id = %session_id, "failed to remove store");
                }
                Err(err)
            }
        }
    }

    fn run_preview(&self, path: &Path, progress: &ProgressCallback) -> Result<FileInfo> {
        progress(ProgressEvent::stage(
            ProgressStage::Detecting,
            format!("Detecting {}", path.display()),
        ));
        let descriptor = self.registry.detect_or_fail(path)?;
        let file_size = fs::metadata(path)?.len();
        let streaming = self.config.streaming_config(file_size);

        let mut counter = PreviewCounter::new(Arc::clone(progress));
        descriptor.parser().parse(path, &streaming, &mut counter)?;

        let member_count = counter.member_count();
        Ok(FileInfo {
            name: counter.meta.map_or_else(|| file_stem(path), |m| m.name),
            format: descriptor.format,
            platform: descriptor.platform,
            message_count: counter.messages,
            member_count,
            file_size,
            skipped_messages: counter.skipped.total(),
        })
    }
}

/// Runs `parser` into one transaction on `store`. Dropping the transaction
/// on an early return rolls it back.
fn populate(
    store: &mut SessionStore,
    parser: &dyn StreamParser,
    parse_path: &Path,
    source: &Path,
    streaming: &StreamingConfig,
    progress: &ProgressCallback,
) -> Result<WriteStats> {
    let fallback = ParsedMeta::new(file_stem(source), parser.platform(), ChatKind::Group);
    let tx = store.connection_mut().transaction()?;
    let mut writer = ImportWriter::new(&tx, source, fallback, Arc::clone(progress));
    parser.parse(parse_path, streaming, &mut writer)?;
    let stats = writer.finish()?;
    tx.commit()?;
    Ok(stats)
}

fn outcome(session_id: String, format: Option<ExportFormat>, stats: WriteStats) -> ImportOutcome {
    ImportOutcome {
        session_id,
        format,
        platform: stats.meta.platform,
        chat_name: stats.meta.name,
        message_count: stats.messages,
        member_count: stats.members,
        skipped_messages: stats.skipped.total(),
    }
}

/// Emits the terminal progress event for an operation. Counts are filled in
/// by the [`monotonic`] wrapper.
fn report<T>(result: &Result<T>, progress: &ProgressCallback, describe: impl FnOnce(&T) -> String) {
    match result {
        Ok(value) => progress(ProgressEvent::stage(ProgressStage::Done, describe(value))),
        Err(err) => progress(ProgressEvent::stage(ProgressStage::Error, err.to_string())),
    }
}
