//! Notification context for subscriber callbacks.
//!
//! Progress and completion callbacks, as well as activity indicator updates,
//! are never invoked on transport threads. They are handed to a [`Dispatcher`],
//! which runs them on one designated execution context. Subscribers therefore
//! never see concurrent callback invocations and need no synchronization of
//! their own.
//!
//! # Architecture
//!
//! ```text
//! transport threads ──► DownloadManager ──► Dispatcher::dispatch(job)
//!                                                 │
//!                                                 ▼
//!                                      ┌────────────────────┐
//!                                      │  SerialDispatcher  │  FIFO, one thread
//!                                      │  "fetchmux-notify" │
//!                                      └────────────────────┘
//!                                                 │
//!                                                 ▼
//!                                      progress / completion / indicator
//! ```
//!
//! Hosts with their own UI loop implement [`Dispatcher`] to forward jobs onto
//! that loop instead.

use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle, ThreadId};

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// Name of the worker thread used by [`SerialDispatcher`].
pub const NOTIFY_THREAD_NAME: &str = "fetchmux-notify";

/// A unit of work scheduled onto the notification context.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// An execution context that runs notification jobs one at a time, in the
/// order they were dispatched.
pub trait Dispatcher: Send + Sync {
    /// Schedules a job. Must not block the caller.
    fn dispatch(&self, job: Job);
}

/// Runs every job on a single dedicated thread, in FIFO order.
pub struct SerialDispatcher {
    sender: mpsc::UnboundedSender<Job>,
    worker: Mutex<Option<JoinHandle<()>>>,
    worker_id: ThreadId,
}

impl SerialDispatcher {
    /// Spawns the notification thread.
    pub fn new() -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Job>();

        let handle = thread::Builder::new()
            .name(NOTIFY_THREAD_NAME.to_string())
            .spawn(move || {
                while let Some(job) = receiver.blocking_recv() {
                    if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                        warn!("notification callback panicked");
                    }
                }
                debug!("notification thread exiting");
            })
            .expect("Failed to spawn notification thread");

        Self {
            sender,
            worker_id: handle.thread().id(),
            worker: Mutex::new(Some(handle)),
        }
    }

    /// Blocks until every job dispatched before this call has run.
    ///
    /// Must not be called from a notification callback (the barrier would be
    /// queued behind the job waiting for it) or from inside an async runtime;
    /// use [`settle`](Self::settle) there.
    pub fn flush(&self) {
        if thread::current().id() == self.worker_id {
            warn!("flush called from the notification thread, ignoring");
            return;
        }
        let (done_tx, done_rx) = oneshot::channel();
        self.dispatch(Box::new(move || {
            let _ = done_tx.send(());
        }));
        let _ = done_rx.blocking_recv();
    }

    /// Waits, without blocking the async runtime, until every job dispatched
    /// before this call has run.
    pub async fn settle(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        self.dispatch(Box::new(move || {
            let _ = done_tx.send(());
        }));
        let _ = done_rx.await;
    }
}

impl Default for SerialDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher for SerialDispatcher {
    fn dispatch(&self, job: Job) {
        if self.sender.send(job).is_err() {
            warn!("notification thread is gone, dropping job");
        }
    }
}

impl Drop for SerialDispatcher {
    fn drop(&mut self) {
        // Replacing the sender closes the channel so the worker drains and exits.
        let (closed, _) = mpsc::unbounded_channel();
        drop(std::mem::replace(&mut self.sender, closed));

        if thread::current().id() == self.worker_id {
            return;
        }
        if let Some(handle) = self.worker.lock().take() {
            handle.join().ok();
        }
    }
}

/// Runs jobs immediately on the calling thread.
///
/// Only suitable when the caller already guarantees serialization, e.g. a
/// single-threaded host or a test driving the transport by hand.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineDispatcher;

impl Dispatcher for InlineDispatcher {
    fn dispatch(&self, job: Job) {
        job();
    }
}
