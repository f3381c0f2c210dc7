//! Unified error types for chatload.
//!
//! This module provides a single [`ChatloadError`] enum covering every failure
//! the ingestion pipeline can surface to a caller.
//!
//! # Error Handling Philosophy
//!
//! - **Structural** failures (unrecognized format, malformed syntax, I/O while
//!   preprocessing) abort the whole import before anything is committed.
//! - **Per-record** validity problems are never errors: they are counted by the
//!   importer and reported as `skipped_messages`.
//! - **Coordination** failures ([`ChatloadError::Timeout`],
//!   [`ChatloadError::WorkerCrashed`]) mean the outcome is unknown, not that
//!   anything was rolled back.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// A specialized [`Result`] type for chatload operations.
///
/// # Example
///
/// ```rust
/// use chatload::error::Result;
/// use chatload::model::ParsedMessage;
///
/// fn my_function() -> Result<Vec<ParsedMessage>> {
///     Ok(vec![])
/// }
/// ```
pub type Result<T> = std::result::Result<T, ChatloadError>;

/// The error type for all chatload operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ChatloadError {
    /// An I/O error occurred.
    ///
    /// This typically happens when:
    /// - The input file doesn't exist
    /// - Permission denied
    /// - Disk is full (when writing a store or a slimmed temp file)
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON parsing/serialization error outside of a specific export format.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Failed to parse the input file.
    ///
    /// Contains the format being parsed, the underlying parse error,
    /// and optionally the file path.
    #[error("Failed to parse {format} export{}: {source}", path.as_ref().map(|p| format!(" (file: {})", p.display())).unwrap_or_default())]
    Parse {
        /// The format being parsed (e.g., "Telegram JSON", "WhatsApp TXT")
        format: &'static str,
        /// The underlying parse error
        #[source]
        source: ParseErrorKind,
        /// The file path, if available
        path: Option<PathBuf>,
    },

    /// The file content doesn't match the structure its format requires.
    #[error("Invalid {format} format: {message}")]
    InvalidFormat {
        /// The format that was expected
        format: &'static str,
        /// Description of what's wrong
        message: String,
    },

    /// No registered format recognized the file.
    #[error("Unrecognized chat export format: {}", path.display())]
    UnrecognizedFormat {
        /// The file that failed detection
        path: PathBuf,
    },

    /// Streaming parser error.
    #[error("Streaming error: {0}")]
    Streaming(#[source] StreamingErrorKind),

    /// The size-triggered preprocessing stage failed.
    ///
    /// The partially written output has already been removed.
    #[error("Preprocessing {} failed: {source}", path.display())]
    Preprocess {
        /// The source file being slimmed
        path: PathBuf,
        /// What went wrong
        #[source]
        source: Box<ChatloadError>,
    },

    /// Storage (SQLite) error.
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Refused to create or delete a file outside the temp workspace.
    #[error("Refusing to touch {} outside temp workspace {}", path.display(), root.display())]
    UnsafeTempPath {
        /// The offending path
        path: PathBuf,
        /// The workspace root
        root: PathBuf,
    },

    /// No session store with the given id exists.
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// A single record exceeded the maximum allowed size.
    #[error("Message too large: {actual_size} bytes (maximum: {max_size} bytes)")]
    BufferOverflow {
        /// Maximum allowed size in bytes
        max_size: usize,
        /// Actual size encountered
        actual_size: usize,
    },

    /// The file ended before parsing was complete.
    #[error("Unexpected end of file while {context}")]
    UnexpectedEof {
        /// Context about what was being parsed
        context: String,
    },

    /// The worker did not deliver a terminal message in time.
    ///
    /// The operation may still be running; its outcome is unknown.
    #[error("{operation} timed out after {}s", timeout.as_secs_f64())]
    Timeout {
        /// Operation that timed out
        operation: String,
        /// Configured timeout
        timeout: Duration,
    },

    /// The worker thread exited while requests were pending.
    #[error("Worker exited: {0}")]
    WorkerCrashed(String),

    /// An operation failed inside the worker; carries its rendered error.
    #[error("{0}")]
    Worker(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Kinds of parse errors that can occur.
#[derive(Debug, Error)]
pub enum ParseErrorKind {
    /// JSON parsing error
    #[error("{0}")]
    Json(#[from] serde_json::Error),
    /// Regex/pattern matching error
    #[error("{0}")]
    Pattern(String),
    /// Generic parsing error
    #[error("{0}")]
    Other(String),
}

/// Kinds of streaming errors.
#[derive(Debug, Error)]
pub enum StreamingErrorKind {
    /// IO error during streaming
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    /// JSON parsing error during streaming
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// Invalid format encountered
    #[error("Invalid format: {0}")]
    InvalidFormat(String),
    /// Buffer overflow
    #[error("Buffer overflow: {actual_size} bytes (max: {max_size})")]
    BufferOverflow { max_size: usize, actual_size: usize },
    /// Unexpected EOF
    #[error("Unexpected end of file")]
    UnexpectedEof,
}

// ============================================================================
// Convenience constructors
// ============================================================================

impl ChatloadError {
    /// Creates a parse error with a textual cause.
    pub fn parse(format: &'static str, message: impl Into<String>, path: Option<PathBuf>) -> Self {
        ChatloadError::Parse {
            format,
            source: ParseErrorKind::Other(message.into()),
            path,
        }
    }

    /// Creates a parse error for WhatsApp format.
    pub fn whatsapp_parse(message: impl Into<String>, path: Option<PathBuf>) -> Self {
        ChatloadError::Parse {
            format: "WhatsApp TXT",
            source: ParseErrorKind::Pattern(message.into()),
            path,
        }
    }

    /// Creates an invalid format error.
    pub fn invalid_format(format: &'static str, message: impl Into<String>) -> Self {
        ChatloadError::InvalidFormat {
            format,
            message: message.into(),
        }
    }

    /// Creates an unrecognized format error.
    pub fn unrecognized(path: impl Into<PathBuf>) -> Self {
        ChatloadError::UnrecognizedFormat { path: path.into() }
    }

    /// Wraps an error raised while slimming `path`.
    pub fn preprocess(path: impl Into<PathBuf>, source: ChatloadError) -> Self {
        ChatloadError::Preprocess {
            path: path.into(),
            source: Box::new(source),
        }
    }

    /// Creates a streaming error from components.
    pub fn streaming(kind: StreamingErrorKind) -> Self {
        ChatloadError::Streaming(kind)
    }

    /// Creates a buffer overflow error.
    pub fn buffer_overflow(max_size: usize, actual_size: usize) -> Self {
        ChatloadError::BufferOverflow {
            max_size,
            actual_size,
        }
    }

    /// Creates an unexpected EOF error.
    pub fn unexpected_eof(context: impl Into<String>) -> Self {
        ChatloadError::UnexpectedEof {
            context: context.into(),
        }
    }

    /// Creates a timeout error.
    pub fn timeout(operation: impl Into<String>, timeout: Duration) -> Self {
        ChatloadError::Timeout {
            operation: operation.into(),
            timeout,
        }
    }

    /// Returns `true` if this is an IO error.
    pub fn is_io(&self) -> bool {
        matches!(self, ChatloadError::Io(_))
    }

    /// Returns `true` if this is a parse error, including streaming failures.
    pub fn is_parse(&self) -> bool {
        matches!(
            self,
            ChatloadError::Parse { .. }
                | ChatloadError::Streaming(_)
                | ChatloadError::BufferOverflow { .. }
                | ChatloadError::UnexpectedEof { .. }
        )
    }

    /// Returns `true` if this is an invalid format error.
    pub fn is_invalid_format(&self) -> bool {
        matches!(self, ChatloadError::InvalidFormat { .. })
    }

    /// Returns `true` if no format recognized the file.
    pub fn is_unrecognized_format(&self) -> bool {
        matches!(self, ChatloadError::UnrecognizedFormat { .. })
    }

    /// Returns `true` if preprocessing failed.
    pub fn is_preprocess(&self) -> bool {
        matches!(self, ChatloadError::Preprocess { .. })
    }

    /// Returns `true` if this is a storage error.
    pub fn is_storage(&self) -> bool {
        matches!(self, ChatloadError::Storage(_))
    }

    /// Returns `true` if the worker did not answer in time.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ChatloadError::Timeout { .. })
    }

    /// Returns `true` if the worker exited with the request pending.
    pub fn is_worker_crashed(&self) -> bool {
        matches!(self, ChatloadError::WorkerCrashed(_))
    }
}

// ============================================================================
// Integration with streaming module
// ============================================================================

impl From<crate::streaming::StreamingError> for ChatloadError {
    fn from(err: crate::streaming::StreamingError) -> Self {
        use crate::streaming::StreamingError;
        match err {
            StreamingError::Io(e) => ChatloadError::Streaming(StreamingErrorKind::Io(e)),
            StreamingError::Json(e) => ChatloadError::Streaming(StreamingErrorKind::Json(e)),
            StreamingError::InvalidFormat(s) => {
                ChatloadError::Streaming(StreamingErrorKind::InvalidFormat(s))
            }
            StreamingError::Syntax { offset, message } => ChatloadError::Streaming(
                StreamingErrorKind::InvalidFormat(format!("byte {offset}: {message}")),
            ),
            StreamingError::BufferOverflow {
                max_size,
                actual_size,
            } => ChatloadError::Streaming(StreamingErrorKind::BufferOverflow {
                max_size,
                actual_size,
            }),
            StreamingError::UnexpectedEof => {
                ChatloadError::Streaming(StreamingErrorKind::UnexpectedEof)
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_display() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err = ChatloadError::from(io_err);
        let display = err.to_string();
        assert!(display.contains("IO error"));
        assert!(display.contains("file not found"));
    }

    #[test]
    fn test_parse_error_with_path() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid").unwrap_err();
        let err = ChatloadError::Parse {
            format: "Telegram JSON",
            source: ParseErrorKind::Json(json_err),
            path: Some(PathBuf::from("/path/to/file.json")),
        };
        let display = err.to_string();
        assert!(display.contains("Telegram JSON"));
        assert!(display.contains("/path/to/file.json"));
    }

    #[test]
    fn test_parse_error_without_path() {
        let err = ChatloadError::whatsapp_parse("invalid pattern", None);
        let display = err.to_string();
        assert!(display.contains("WhatsApp TXT"));
        assert!(!display.contains("file:"));
    }

    #[test]
    fn test_unrecognized_format_display() {
        let err = ChatloadError::unrecognized("/tmp/notes.md");
        assert!(err.is_unrecognized_format());
        assert!(err.to_string().contains("/tmp/notes.md"));
    }

    #[test]
    fn test_preprocess_wraps_source() {
        use std::error::Error;
        let inner = ChatloadError::unexpected_eof("reading messages array");
        let err = ChatloadError::preprocess("/data/big.json", inner);
        assert!(err.is_preprocess());
        assert!(err.to_string().contains("big.json"));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_timeout_display() {
        let err = ChatloadError::timeout("import", Duration::from_millis(1500));
        assert!(err.is_timeout());
        assert!(err.to_string().contains("import timed out after 1.5s"));
    }

    #[test]
    fn test_worker_crashed() {
        let err = ChatloadError::WorkerCrashed("channel closed".into());
        assert!(err.is_worker_crashed());
        assert!(!err.is_timeout());
    }

    #[test]
    fn test_storage_from_rusqlite() {
        let err: ChatloadError = rusqlite::Error::InvalidQuery.into();
        assert!(err.is_storage());
        assert!(err.to_string().contains("Storage error"));
    }

    #[test]
    fn test_buffer_overflow_display() {
        let err = ChatloadError::buffer_overflow(1024, 2048);
        let display = err.to_string();
        assert!(display.contains("2048"));
        assert!(display.contains("1024"));
        assert!(err.is_parse());
    }

    #[test]
    fn test_streaming_error_conversion() {
        let err: ChatloadError =
            crate::streaming::StreamingError::InvalidFormat("missing header".into()).into();
        let display = err.to_string();
        assert!(display.contains("Streaming error"));
        assert!(display.contains("missing header"));
        assert!(err.is_parse());
    }

    #[test]
    fn test_error_source_chain() {
        use std::error::Error;
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "access denied");
        let err = ChatloadError::Streaming(StreamingErrorKind::Io(io_err));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_is_methods() {
        let io_err = ChatloadError::Io(io::Error::new(io::ErrorKind::NotFound, ""));
        assert!(io_err.is_io());
        assert!(!io_err.is_parse());
        assert!(!io_err.is_invalid_format());

        let fmt_err = ChatloadError::invalid_format("Discord", "bad format");
        assert!(fmt_err.is_invalid_format());
        assert!(!fmt_err.is_io());
    }
}
