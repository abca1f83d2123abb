//! Transport boundary.
//!
//! The download manager never talks HTTP itself. It asks a [`Transport`] to
//! create one [`TransportTask`] per distinct URL and receives that task's
//! byte-level events through [`TransportEvents`]:
//!
//! ```text
//!  DownloadManager ── create_task(request, priority, events) ──► Transport
//!        ▲                                                          │
//!        │   on_response(id, expected_length) -> ResponseDisposition│
//!        ├──────────────────────────────────────────────────────────┤
//!        │   on_data(id, chunk)            (zero or more)           │
//!        ├──────────────────────────────────────────────────────────┤
//!        │   on_complete(id, error)        (exactly once)           │
//!        └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Events for a single transport task are delivered sequentially; events of
//! different tasks may interleave on different threads. A cancelled task still
//! reports `on_complete` with [`TransportError::Cancelled`].
//!
//! Two implementations ship with the crate:
//! - [`ReqwestTransport`]: streams real HTTP responses on a tokio runtime
//! - [`ManualTransport`]: records requests and lets the caller inject events,
//!   for tests and for replaying traffic

mod http;
mod manual;

use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;

use crate::error::TransportError;
use crate::request::Request;

pub use http::ReqwestTransport;
pub use manual::{ManualTask, ManualTransport};

/// Priority for background work.
pub const PRIORITY_LOW: f32 = 0.25;

/// Priority used when the caller has no preference.
pub const PRIORITY_DEFAULT: f32 = 0.5;

/// Priority for work the user is waiting on.
pub const PRIORITY_HIGH: f32 = 0.75;

/// Identity of a transport-level task.
///
/// Events are routed by this identity, never by URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransportTaskId(u64);

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

impl TransportTaskId {
    /// Allocates a process-unique identifier.
    pub fn next() -> Self {
        Self(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for TransportTaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Decision returned when response headers arrive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseDisposition {
    /// Keep streaming the body.
    Allow,
    /// Stop the request; the transport completes it with `Cancelled`.
    Cancel,
}

/// Receiver of transport events.
pub trait TransportEvents: Send + Sync {
    /// Response headers arrived. `expected_length` is `None` when the server
    /// did not declare a content length.
    fn on_response(&self, task: TransportTaskId, expected_length: Option<u64>)
        -> ResponseDisposition;

    /// A chunk of the response body arrived.
    fn on_data(&self, task: TransportTaskId, chunk: Bytes);

    /// The task finished, successfully when `error` is `None`.
    fn on_complete(&self, task: TransportTaskId, error: Option<TransportError>);
}

/// Lifecycle controls of one transport-level request.
///
/// `resume` starts a task (or continues a suspended one) and is idempotent.
pub trait TransportTask: Send + Sync {
    fn id(&self) -> TransportTaskId;

    /// The URL this task was created for.
    fn url(&self) -> &str;

    fn resume(&self);

    fn suspend(&self);

    fn cancel(&self);

    fn priority(&self) -> f32;

    /// Updates the scheduling priority. Last writer wins.
    fn set_priority(&self, priority: f32);
}

/// Factory for transport tasks.
pub trait Transport: Send + Sync {
    /// Creates a suspended task for `request`. Nothing is sent until the task
    /// is resumed.
    fn create_task(
        &self,
        request: Request,
        priority: f32,
        events: Arc<dyn TransportEvents>,
    ) -> Arc<dyn TransportTask>;
}

/// An `f32` priority that can be read and replaced from any thread.
#[derive(Debug)]
pub struct AtomicPriority(AtomicU32);

impl AtomicPriority {
    pub fn new(priority: f32) -> Self {
        Self(AtomicU32::new(priority.to_bits()))
    }

    pub fn get(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    pub fn set(&self, priority: f32) {
        self.0.store(priority.to_bits(), Ordering::Relaxed);
    }
}

impl Default for AtomicPriority {
    fn default() -> Self {
        Self::new(PRIORITY_DEFAULT)
    }
}
