//! # Chatload
//!
//! Streams chat exports from popular messaging platforms into isolated,
//! indexed SQLite session stores.
//!
//! ## Overview
//!
//! Chatload ingests exports from:
//! - **Telegram** — JSON exports from Telegram Desktop
//! - **Discord** — JSON exports from DiscordChatExporter
//! - **Instagram** — JSON exports from the Instagram data download
//! - **WhatsApp** — "Export chat" text files (iOS and Android)
//!
//! Files are never loaded whole. Formats are sniffed from a bounded prefix,
//! oversized heavy exports are slimmed into a temp file first, and parsers
//! hand messages to the importer in bounded batches. Each import writes one
//! new session inside a single transaction: it either commits completely or
//! leaves nothing behind.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use chatload::config::ImportConfig;
//! use chatload::import::Importer;
//! use chatload::progress::no_progress;
//! use chatload::store::SessionStore;
//!
//! let config = ImportConfig::new().with_data_dir("/var/lib/chatload");
//! let importer = Importer::new(config.clone());
//!
//! // Cheap preview first
//! let info = importer.preview("result.json".as_ref(), &no_progress())?;
//! println!("{}: {} messages, {} members", info.name, info.message_count, info.member_count);
//!
//! // Then the real import
//! let outcome = importer.import_file("result.json".as_ref(), &no_progress())?;
//! let store = SessionStore::open(&config.data_dir, &outcome.session_id)?;
//! assert_eq!(store.message_count()?, info.message_count);
//! # Ok::<(), chatload::ChatloadError>(())
//! ```
//!
//! ## Module Structure
//!
//! - [`format`] — format registry and detection
//! - [`parsing`] — per-platform record types and conversion
//! - [`streaming`] — streaming parsers and the [`ParseSink`](streaming::ParseSink) contract
//! - [`preprocess`] — size-triggered slimming into a private temp directory
//! - [`store`] — session databases: schema, creation, read API
//! - [`import`] — the import engine and preview
//! - [`worker`] — request coordination with a dedicated worker thread
//! - [`config`], [`logging`], [`progress`], [`error`] — ambient pieces

#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod error;
pub mod format;
pub mod import;
pub mod logging;
pub mod model;
pub mod parsing;
pub mod preprocess;
pub mod progress;
pub mod store;
pub mod streaming;
pub mod worker;

// Re-export the main types at the crate root for convenience
pub use error::{ChatloadError, Result};

/// Convenient re-exports for common usage.
///
/// ```rust
/// use chatload::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::{Config, ImportConfig, WorkerConfig};
    pub use crate::error::{ChatloadError, Result};
    pub use crate::format::{ExportFormat, FormatRegistry};
    pub use crate::import::{FileInfo, ImportOutcome, Importer};
    pub use crate::model::{ChatKind, MessageKind, Platform};
    pub use crate::progress::{ProgressCallback, ProgressEvent, ProgressStage};
    pub use crate::store::SessionStore;
    pub use crate::worker::WorkerHandle;
}
