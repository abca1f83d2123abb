//! Download task: one coalesced request and its subscribers.
//!
//! A [`DownloadTask`] wraps a single transport task and accumulates its
//! response body. Any number of callers may subscribe to it:
//!
//! - **Completion callbacks** form an ordered list. Each is invoked exactly
//!   once, in registration order, with either the full body or the transport
//!   error.
//! - **Progress** is a single slot. A later subscriber replaces the previous
//!   progress callback (last subscriber wins).
//!
//! All callbacks run on the manager's [`Dispatcher`], never on the transport
//! thread that delivered the event.
//!
//! # Lifecycle
//!
//! ```text
//!  created ──resume──► streaming ──on_response──► on_data* ──on_complete──► completed
//!     │                                                                       ▲
//!     └──────────────────────────────cancel───────────────────────────────────┘
//!                                (completes with TransportError::Cancelled)
//! ```

use std::fmt;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::dispatch::Dispatcher;
use crate::error::TransportError;
use crate::registry::RegistryEntry;
use crate::transport::{TransportTask, TransportTaskId};

/// Outcome delivered to completion subscribers.
pub type DownloadResult = Result<Bytes, TransportError>;

/// Receives the download progress as a fraction in `[0, 1]`.
pub type ProgressCallback = Arc<dyn Fn(f64) + Send + Sync>;

/// Receives the outcome of a download.
pub type CompletionCallback = Box<dyn FnOnce(DownloadResult) + Send>;

/// Mutable state guarded by the task lock.
struct TaskState {
    buffer: BytesMut,
    expected_length: Option<u64>,
    progress: Option<ProgressCallback>,
    completions: Vec<CompletionCallback>,
    /// Set once, when the transport reports completion.
    outcome: Option<DownloadResult>,
}

/// A download shared by every caller that requested the same URL.
pub struct DownloadTask {
    url: String,
    transport: Arc<dyn TransportTask>,
    dispatcher: Arc<dyn Dispatcher>,
    state: Mutex<TaskState>,
}

impl DownloadTask {
    pub(crate) fn new(transport: Arc<dyn TransportTask>, dispatcher: Arc<dyn Dispatcher>) -> Self {
        Self {
            url: transport.url().to_string(),
            transport,
            dispatcher,
            state: Mutex::new(TaskState {
                buffer: BytesMut::new(),
                expected_length: None,
                progress: None,
                completions: Vec::new(),
                outcome: None,
            }),
        }
    }

    /// The URL this task downloads.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Starts or continues the underlying transport task.
    pub fn resume(&self) {
        self.transport.resume();
    }

    /// Pauses the underlying transport task.
    pub fn suspend(&self) {
        self.transport.suspend();
    }

    /// Cancels the underlying transport task. Subscribers still receive a
    /// completion, carrying [`TransportError::Cancelled`].
    pub fn cancel(&self) {
        self.transport.cancel();
    }

    pub fn priority(&self) -> f32 {
        self.transport.priority()
    }

    pub fn set_priority(&self, priority: f32) {
        self.transport.set_priority(priority);
    }

    /// Replaces the progress callback. `None` clears it.
    pub fn set_progress_handler(&self, handler: Option<ProgressCallback>) {
        self.state.lock().progress = handler;
    }

    /// Sets the progress callback, replacing any previous one.
    pub fn on_progress<F>(&self, handler: F)
    where
        F: Fn(f64) + Send + Sync + 'static,
    {
        self.set_progress_handler(Some(Arc::new(handler)));
    }

    /// Appends a completion callback.
    ///
    /// If the task has already completed, the callback is scheduled right
    /// away with the stored outcome.
    pub fn on_completion<F>(&self, handler: F)
    where
        F: FnOnce(DownloadResult) + Send + 'static,
    {
        let mut state = self.state.lock();
        if let Some(outcome) = state.outcome.clone() {
            drop(state);
            trace!(url = %self.url, "late subscriber on completed task");
            self.dispatcher.dispatch(Box::new(move || handler(outcome)));
            return;
        }
        state.completions.push(Box::new(handler));
    }

    /// Declared content length, once the response headers arrived.
    pub fn expected_length(&self) -> Option<u64> {
        self.state.lock().expected_length
    }

    /// Bytes received so far.
    pub fn received_len(&self) -> usize {
        let state = self.state.lock();
        match &state.outcome {
            Some(Ok(body)) => body.len(),
            _ => state.buffer.len(),
        }
    }

    /// Number of completion callbacks still waiting.
    pub fn pending_subscribers(&self) -> usize {
        self.state.lock().completions.len()
    }

    pub fn is_completed(&self) -> bool {
        self.state.lock().outcome.is_some()
    }

    /// Records the declared content length.
    ///
    /// A repeated call overwrites the previous value.
    pub(crate) fn handle_response(&self, expected_length: Option<u64>) {
        let mut state = self.state.lock();
        if state.expected_length.is_some() {
            debug!(url = %self.url, ?expected_length, "expected length replaced");
        }
        state.expected_length = expected_length;
    }

    /// Appends a body chunk and reports progress when the length is known.
    pub(crate) fn handle_data(&self, chunk: Bytes) {
        let mut state = self.state.lock();
        if state.outcome.is_some() {
            warn!(url = %self.url, len = chunk.len(), "data after completion dropped");
            return;
        }
        state.buffer.extend_from_slice(&chunk);

        let fraction = progress_fraction(state.buffer.len(), state.expected_length);
        let handler = state.progress.clone();
        drop(state);

        if let (Some(fraction), Some(handler)) = (fraction, handler) {
            self.dispatcher.dispatch(Box::new(move || handler(fraction)));
        }
    }

    /// Fans the outcome out to every completion callback, in order.
    ///
    /// Returns false, without notifying anyone, if the task had already
    /// completed.
    pub(crate) fn handle_completion(&self, error: Option<TransportError>) -> bool {
        let mut state = self.state.lock();
        if state.outcome.is_some() {
            warn!(url = %self.url, "duplicate completion ignored");
            return false;
        }

        let outcome = match error {
            Some(e) => Err(e),
            None => Ok(std::mem::take(&mut state.buffer).freeze()),
        };
        state.outcome = Some(outcome.clone());
        state.progress = None;
        let handlers = std::mem::take(&mut state.completions);
        drop(state);

        debug!(
            url = %self.url,
            subscribers = handlers.len(),
            success = outcome.is_ok(),
            "download task completed"
        );
        self.dispatcher.dispatch(Box::new(move || {
            for handler in handlers {
                handler(outcome.clone());
            }
        }));
        true
    }
}

impl RegistryEntry for DownloadTask {
    fn url(&self) -> &str {
        &self.url
    }

    fn transport_id(&self) -> TransportTaskId {
        self.transport.id()
    }
}

impl fmt::Debug for DownloadTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("DownloadTask")
            .field("url", &self.url)
            .field("transport_id", &self.transport.id())
            .field("received", &state.buffer.len())
            .field("expected_length", &state.expected_length)
            .field("subscribers", &state.completions.len())
            .field("completed", &state.outcome.is_some())
            .finish()
    }
}

impl Drop for DownloadTask {
    fn drop(&mut self) {
        trace!(url = %self.url, "download task released");
    }
}

/// Fraction of the body received, or `None` when the length is unknown or zero.
///
/// Clamped to 1.0 for servers that send more than they declared.
fn progress_fraction(received: usize, expected_length: Option<u64>) -> Option<f64> {
    match expected_length {
        Some(expected) if expected > 0 => Some((received as f64 / expected as f64).min(1.0)),
        _ => None,
    }
}
