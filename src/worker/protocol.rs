//! Messages exchanged with the worker thread.

use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::format::ExportFormat;
use crate::import::{FileInfo, ImportOutcome, Importer};
use crate::progress::ProgressCallback;

/// Work the worker can be asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Detect(PathBuf),
    Preview(PathBuf),
    Import(PathBuf),
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Detect(_) => "detect",
            Operation::Preview(_) => "preview",
            Operation::Import(_) => "import",
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            Operation::Detect(path) | Operation::Preview(path) | Operation::Import(path) => path,
        }
    }

    /// Whether the operation gets the long timeout.
    pub fn is_long_running(&self) -> bool {
        matches!(self, Operation::Import(_))
    }
}

/// Controller -> worker.
#[derive(Debug, Clone)]
pub struct WorkerRequest {
    pub id: u64,
    pub operation: Operation,
}

/// Successful result of an [`Operation`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Detected(ExportFormat),
    Preview(FileInfo),
    Imported(ImportOutcome),
}

/// Worker -> controller.
///
/// Any number of `Progress` messages precede exactly one `Done` per request.
#[derive(Debug, Clone)]
pub enum WorkerMessage {
    Progress {
        id: u64,
        event: crate::progress::ProgressEvent,
    },
    Done {
        id: u64,
        result: std::result::Result<Response, String>,
    },
}

/// Runs operations on the worker thread.
pub trait RequestExecutor: Send + 'static {
    fn execute(&self, operation: &Operation, progress: &ProgressCallback) -> Result<Response>;
}

impl RequestExecutor for Importer {
    fn execute(&self, operation: &Operation, progress: &ProgressCallback) -> Result<Response> {
        match operation {
            Operation::Detect(path) => self.detect(path).map(Response::Detected),
            Operation::Preview(path) => self.preview(path, progress).map(Response::Preview),
            Operation::Import(path) => self.import_file(path, progress).map(Response::Imported),
        }
    }
}
