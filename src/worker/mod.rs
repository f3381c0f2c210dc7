//! Request/response coordination with a dedicated worker thread.
//!
//! A [`WorkerHandle`] owns two threads:
//!
//! - the worker, which runs one [`Operation`] at a time through a
//!   [`RequestExecutor`] and reports `Progress` then `Done` messages
//! - the router, which matches those messages to pending requests
//!
//! Every request is resolved exactly once: by its terminal message, by its
//! timeout, or by the worker exiting. A timed-out operation keeps running on
//! the worker; its outcome is unknown to the caller.
//!
//! # Example
//!
//! ```rust,no_run
//! use chatload::config::{ImportConfig, WorkerConfig};
//! use chatload::import::Importer;
//! use chatload::worker::WorkerHandle;
//!
//! let worker = WorkerHandle::spawn(Importer::new(ImportConfig::new()), WorkerConfig::new())?;
//! let outcome = worker.import_file("result.json", None)?;
//! println!("session {}", outcome.session_id);
//! # Ok::<(), chatload::ChatloadError>(())
//! ```

mod protocol;

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded, unbounded};
use tracing::{debug, warn};

pub use protocol::{Operation, RequestExecutor, Response, WorkerMessage, WorkerRequest};

use crate::config::WorkerConfig;
use crate::error::{ChatloadError, Result};
use crate::format::ExportFormat;
use crate::import::{FileInfo, ImportOutcome};
use crate::progress::ProgressCallback;

struct Pending {
    reply: Sender<Result<Response>>,
    progress: Option<ProgressCallback>,
}

type PendingMap = Arc<Mutex<HashMap<u64, Pending>>>;

fn lock(pending: &Mutex<HashMap<u64, Pending>>) -> MutexGuard<'_, HashMap<u64, Pending>> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle to a running worker.
///
/// Dropping the handle shuts the worker down and waits for the operation in
/// flight, if any, to finish.
pub struct WorkerHandle {
    requests: Option<Sender<WorkerRequest>>,
    pending: PendingMap,
    alive: Arc<AtomicBool>,
    next_id: AtomicU64,
    config: WorkerConfig,
    worker: Option<JoinHandle<()>>,
    router: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    /// Starts the worker and router threads.
    pub fn spawn<E: RequestExecutor>(executor: E, config: WorkerConfig) -> Result<Self> {
        let (request_tx, request_rx) = unbounded::<WorkerRequest>();
        let (message_tx, message_rx) = unbounded::<WorkerMessage>();
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let alive = Arc::new(AtomicBool::new(true));

        let worker = thread::Builder::new()
            .name("chatload-worker".into())
            .spawn(move || run_worker(&executor, &request_rx, &message_tx))?;

        let router = {
            let pending = Arc::clone(&pending);
            let alive = Arc::clone(&alive);
            thread::Builder::new()
                .name("chatload-router".into())
                .spawn(move || route(&message_rx, &pending, &alive))?
        };

        debug!(
            short_timeout = ?config.short_timeout,
            long_timeout = ?config.long_timeout,
            "worker started"
        );
        Ok(Self {
            requests: Some(request_tx),
            pending,
            alive,
            next_id: AtomicU64::new(1),
            config,
            worker: Some(worker),
            router: Some(router),
        })
    }

    /// Whether the worker can still accept requests.
    pub fn is_running(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Requests that have neither resolved nor timed out.
    pub fn pending_count(&self) -> usize {
        lock(&self.pending).len()
    }

    /// Sends `operation` and blocks until it resolves.
    ///
    /// # Errors
    ///
    /// - [`ChatloadError::Timeout`] when no terminal message arrives in time
    /// - [`ChatloadError::WorkerCrashed`] when the worker is gone
    /// - [`ChatloadError::Worker`] carrying the operation's own error
    pub fn call(&self, operation: Operation, progress: Option<ProgressCallback>) -> Result<Response> {
        let requests = match &self.requests {
            Some(requests) if self.is_running() => requests,
            _ => return Err(ChatloadError::WorkerCrashed("worker is not running".into())),
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let name = operation.name();
        let timeout = if operation.is_long_running() {
            self.config.long_timeout
        } else {
            self.config.short_timeout
        };

        let (reply_tx, reply_rx) = bounded(1);
        lock(&self.pending).insert(
            id,
            Pending {
                reply: reply_tx,
                progress,
            },
        );
        // The router may have drained the map between the check above and
        // the insert.
        if !self.is_running() && lock(&self.pending).remove(&id).is_some() {
            return Err(ChatloadError::WorkerCrashed("worker is not running".into()));
        }

        debug!(id, operation = name, path = %operation.path().display(), "sending request");
        if requests.send(WorkerRequest { id, operation }).is_err() {
            lock(&self.pending).remove(&id);
            return Err(ChatloadError::WorkerCrashed("request channel closed".into()));
        }

        match reply_rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                if lock(&self.pending).remove(&id).is_some() {
                    warn!(id, operation = name, ?timeout, "request timed out");
                    return Err(ChatloadError::timeout(name, timeout));
                }
                // Resolved by the router at the deadline; its reply is on the way.
                reply_rx
                    .recv()
                    .unwrap_or_else(|_| Err(ChatloadError::WorkerCrashed("worker exited".into())))
            }
            Err(RecvTimeoutError::Disconnected) => {
                Err(ChatloadError::WorkerCrashed("worker exited".into()))
            }
        }
    }

    /// Detects the format of `path`.
    pub fn detect(&self, path: impl AsRef<Path>) -> Result<ExportFormat> {
        match self.call(Operation::Detect(path.as_ref().to_path_buf()), None)? {
            Response::Detected(format) => Ok(format),
            other => Err(unexpected(&other)),
        }
    }

    /// Counts what importing `path` would store.
    pub fn preview_file(
        &self,
        path: impl AsRef<Path>,
        progress: Option<ProgressCallback>,
    ) -> Result<FileInfo> {
        match self.call(Operation::Preview(path.as_ref().to_path_buf()), progress)? {
            Response::Preview(info) => Ok(info),
            other => Err(unexpected(&other)),
        }
    }

    /// Imports `path` into a new session.
    pub fn import_file(
        &self,
        path: impl AsRef<Path>,
        progress: Option<ProgressCallback>,
    ) -> Result<ImportOutcome> {
        match self.call(Operation::Import(path.as_ref().to_path_buf()), progress)? {
            Response::Imported(outcome) => Ok(outcome),
            other => Err(unexpected(&other)),
        }
    }

    /// Stops accepting requests and joins both threads.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.requests.take();
        for (name, handle) in [("worker", self.worker.take()), ("router", self.router.take())] {
            if let Some(handle) = handle {
                if handle.join().is_err() {
                    warn!(thread = name, "thread panicked");
                }
            }
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("running", &self.is_running())
            .field("pending", &self.pending_count())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn unexpected(response: &Response) -> ChatloadError {
    ChatloadError::Worker(format!("unexpected response: {response:?}"))
}

fn run_worker<E: RequestExecutor>(
    executor: &E,
    requests: &Receiver<WorkerRequest>,
    messages: &Sender<WorkerMessage>,
) {
    for WorkerRequest { id, operation } in requests {
        let progress: ProgressCallback = {
            let messages = messages.clone();
            Arc::new(move |event| {
                // The router only disappears once this thread has exited.
                let _ = messages.send(WorkerMessage::Progress { id, event });
            })
        };
        let result = executor
            .execute(&operation, &progress)
            .map_err(|e| e.to_string());
        if messages.send(WorkerMessage::Done { id, result }).is_err() {
            break;
        }
    }
    debug!("worker loop finished");
}

fn route(messages: &Receiver<WorkerMessage>, pending: &Mutex<HashMap<u64, Pending>>, alive: &AtomicBool) {
    for message in messages {
        match message {
            WorkerMessage::Progress { id, event } => {
                let callback = lock(pending).get(&id).and_then(|p| p.progress.clone());
                if let Some(callback) = callback {
                    callback(event);
                }
            }
            WorkerMessage::Done { id, result } => match lock(pending).remove(&id) {
                Some(entry) => {
                    let _ = entry.reply.send(result.map_err(ChatloadError::Worker));
                }
                None => debug!(id, "dropping result of abandoned request"),
            },
        }
    }

    // Every sender is gone: the worker returned or panicked.
    alive.store(false, Ordering::Release);
    let orphaned: Vec<(u64, Pending)> = lock(pending).drain().collect();
    if !orphaned.is_empty() {
        warn!(count = orphaned.len(), "worker exited with requests pending");
    }
    for (id, entry) in orphaned {
        let _ = entry.reply.send(Err(ChatloadError::WorkerCrashed(format!(
            "worker exited before request {id} completed"
        ))));
    }
}
