//! Hand-driven transport.
//!
//! [`ManualTransport`] performs no I/O. It records every task the manager
//! creates and lets the caller inject response, data and completion events in
//! any order, including late or duplicate events that a real transport would
//! not produce.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use super::{
    AtomicPriority, ResponseDisposition, Transport, TransportEvents, TransportTask, TransportTaskId,
};
use crate::error::TransportError;
use crate::request::Request;

/// A transport whose events are injected by hand.
#[derive(Default)]
pub struct ManualTransport {
    tasks: Mutex<Vec<Arc<ManualTask>>>,
}

impl ManualTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of transport tasks created so far.
    pub fn created_count(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Every task created so far, in creation order.
    pub fn tasks(&self) -> Vec<Arc<ManualTask>> {
        self.tasks.lock().clone()
    }

    /// The most recently created task for `url`.
    pub fn task_for(&self, url: &str) -> Option<Arc<ManualTask>> {
        self.tasks
            .lock()
            .iter()
            .rev()
            .find(|task| task.request.url() == url)
            .cloned()
    }
}

impl Transport for ManualTransport {
    fn create_task(
        &self,
        request: Request,
        priority: f32,
        events: Arc<dyn TransportEvents>,
    ) -> Arc<dyn TransportTask> {
        let task = Arc::new(ManualTask {
            id: TransportTaskId::next(),
            request,
            priority: AtomicPriority::new(priority),
            resume_count: AtomicUsize::new(0),
            running: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
            events,
        });
        self.tasks.lock().push(Arc::clone(&task));
        task
    }
}

/// A task created by [`ManualTransport`].
pub struct ManualTask {
    id: TransportTaskId,
    request: Request,
    priority: AtomicPriority,
    resume_count: AtomicUsize,
    running: AtomicBool,
    cancelled: AtomicBool,
    events: Arc<dyn TransportEvents>,
}

impl ManualTask {
    /// The request the task was created with.
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// How many times `resume` was called.
    pub fn resume_count(&self) -> usize {
        self.resume_count.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Delivers response headers. A `Cancel` answer completes the task with
    /// [`TransportError::Cancelled`], as a real transport would.
    pub fn respond(&self, expected_length: Option<u64>) -> ResponseDisposition {
        let disposition = self.events.on_response(self.id, expected_length);
        if disposition == ResponseDisposition::Cancel {
            self.cancel();
        }
        disposition
    }

    /// Delivers one body chunk.
    pub fn send(&self, chunk: impl Into<Bytes>) {
        self.events.on_data(self.id, chunk.into());
    }

    /// Completes the task successfully.
    pub fn finish(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.events.on_complete(self.id, None);
    }

    /// Completes the task with `error`.
    pub fn fail(&self, error: TransportError) {
        self.running.store(false, Ordering::SeqCst);
        self.events.on_complete(self.id, Some(error));
    }
}

impl TransportTask for ManualTask {
    fn id(&self) -> TransportTaskId {
        self.id
    }

    fn url(&self) -> &str {
        self.request.url()
    }

    fn resume(&self) {
        self.resume_count.fetch_add(1, Ordering::SeqCst);
        if !self.is_cancelled() {
            self.running.store(true, Ordering::SeqCst);
        }
    }

    fn suspend(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        self.fail(TransportError::Cancelled);
    }

    fn priority(&self) -> f32 {
        self.priority.get()
    }

    fn set_priority(&self, priority: f32) {
        self.priority.set(priority);
    }
}
