//! Errors raised by the byte-level export reader.
//!
//! These carry no file or format context; [`parse_failure`](super::parse_failure)
//! attaches both before the error leaves a parser.

use std::io;

use thiserror::Error;

/// Result type for streaming operations.
pub type StreamingResult<T> = Result<T, StreamingError>;

/// Errors that can occur while walking an export file.
#[derive(Debug, Error)]
pub enum StreamingError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// A record is not valid JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The document is well-formed but not shaped like an export
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Syntax error at byte {offset}: {message}")]
    Syntax { offset: u64, message: String },

    /// Input ended inside a value
    #[error("Unexpected end of file")]
    UnexpectedEof,

    /// A single record exceeded `max_message_size`
    #[error("Record too large: {actual_size} bytes (max: {max_size})")]
    BufferOverflow { max_size: usize, actual_size: usize },
}

impl StreamingError {
    pub(crate) fn syntax(offset: u64, message: impl Into<String>) -> Self {
        StreamingError::Syntax {
            offset,
            message: message.into(),
        }
    }

    /// Byte offset of the failure, when known.
    pub fn offset(&self) -> Option<u64> {
        match self {
            StreamingError::Syntax { offset, .. } => Some(*offset),
            _ => None,
        }
    }
}
