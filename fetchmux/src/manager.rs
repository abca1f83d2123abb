//! Download manager: coalesces requests and routes transport events.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                         DownloadManager                            │
//! │                                                                    │
//! │  download(request) ──► TaskRegistry::find_or_insert_with(url)      │
//! │                          │                 │                       │
//! │                       existing            new                      │
//! │                          │                 │                       │
//! │                   bump priority    Transport::create_task          │
//! │                          └────────┬────────┘                       │
//! │                                   ▼                                │
//! │                           Arc<DownloadTask>  ◄── caller subscribes │
//! │                                                  and resumes       │
//! │                                                                    │
//! │  transport events (by TransportTaskId)                             │
//! │    on_response ──► task.handle_response   (unknown task: Cancel)   │
//! │    on_data     ──► task.handle_data       (unknown task: dropped)  │
//! │    on_complete ──► registry.remove_and_check_empty                 │
//! │                      └─► task.handle_completion, indicator refresh │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Activity indicator
//!
//! Every `download` call and every completion that empties the registry
//! schedules an indicator refresh on the notification context. The refresh
//! reads the registry when it runs, so once the context has settled the
//! indicator is active exactly when the registry is non-empty.
//!
//! # Teardown
//!
//! Dropping the last manager handle completes every in-flight task with
//! [`TransportError::Cancelled`] and cancels its transport task.

use std::sync::{Arc, Weak};

use bytes::Bytes;
use tracing::{debug, trace, warn};

use crate::dispatch::{Dispatcher, Job, SerialDispatcher};
use crate::error::TransportError;
use crate::indicator::{ActivityIndicator, NoopIndicator};
use crate::registry::{RegistryEntry, TaskRegistry};
use crate::request::Request;
use crate::task::DownloadTask;
use crate::transport::{ResponseDisposition, Transport, TransportEvents, TransportTaskId};

/// State shared between manager handles and transport event routing.
struct ManagerCore {
    transport: Arc<dyn Transport>,
    registry: Arc<TaskRegistry<DownloadTask>>,
    dispatcher: Arc<dyn Dispatcher>,
    indicator: Arc<dyn ActivityIndicator>,
}

impl ManagerCore {
    fn refresh_indicator(&self) {
        let registry = Arc::clone(&self.registry);
        let indicator = Arc::clone(&self.indicator);
        self.dispatcher
            .dispatch(Box::new(move || indicator.set_active(!registry.is_empty())));
    }
}

impl Drop for ManagerCore {
    /// Finishes every in-flight task with `Cancelled` and stops its transport
    /// task. Transport events arriving later cannot reach a dropped manager,
    /// so this is the last chance to notify subscribers.
    fn drop(&mut self) {
        let orphaned = self.registry.drain();
        if orphaned.is_empty() {
            return;
        }
        debug!(tasks = orphaned.len(), "manager dropped, cancelling in-flight tasks");
        for task in orphaned {
            task.handle_completion(Some(TransportError::Cancelled));
            task.cancel();
        }
        self.refresh_indicator();
    }
}

/// Coalescing download manager.
///
/// Cloning yields another handle to the same registry.
#[derive(Clone)]
pub struct DownloadManager {
    core: Arc<ManagerCore>,
}

impl DownloadManager {
    /// Creates a manager with a [`SerialDispatcher`] and no indicator.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::builder(transport).build()
    }

    pub fn builder(transport: Arc<dyn Transport>) -> DownloadManagerBuilder {
        DownloadManagerBuilder {
            transport,
            dispatcher: None,
            indicator: None,
        }
    }

    /// Returns the task for the request's URL, creating it if none is in flight.
    ///
    /// A coalesced call updates the existing task's priority. The returned
    /// task has not been resumed by this call; the caller attaches its
    /// callbacks and then calls [`DownloadTask::resume`].
    pub fn download(&self, request: Request, priority: f32) -> Arc<DownloadTask> {
        let url = request.url().to_string();
        let core = &self.core;

        let (task, created) = core.registry.find_or_insert_with(&url, || {
            let events: Arc<dyn TransportEvents> = Arc::new(ManagerEvents {
                core: Arc::downgrade(core),
            });
            let inner = core.transport.create_task(request, priority, events);
            Arc::new(DownloadTask::new(inner, Arc::clone(&core.dispatcher)))
        });

        if created {
            debug!(url = %url, priority, "download task registered");
        } else {
            debug!(url = %url, priority, "request coalesced into in-flight task");
            task.set_priority(priority);
        }

        core.refresh_indicator();
        task
    }

    /// Updates the priority of the in-flight task for `url`. No-op when none.
    pub fn set_priority(&self, priority: f32, url: &str) {
        match self.core.registry.find_by_url(url) {
            Some(task) => task.set_priority(priority),
            None => trace!(url, "no in-flight task to reprioritize"),
        }
    }

    /// The in-flight task for `url`, if any.
    pub fn task_for(&self, url: &str) -> Option<Arc<DownloadTask>> {
        self.core.registry.find_by_url(url)
    }

    /// Number of in-flight tasks.
    pub fn active_tasks(&self) -> usize {
        self.core.registry.len()
    }

    pub fn is_idle(&self) -> bool {
        self.core.registry.is_empty()
    }

    /// Schedules `job` on the notification context used for callbacks.
    pub fn dispatch(&self, job: Job) {
        self.core.dispatcher.dispatch(job);
    }
}

/// Builder for [`DownloadManager`].
pub struct DownloadManagerBuilder {
    transport: Arc<dyn Transport>,
    dispatcher: Option<Arc<dyn Dispatcher>>,
    indicator: Option<Arc<dyn ActivityIndicator>>,
}

impl DownloadManagerBuilder {
    /// Notification context for callbacks and indicator updates.
    pub fn dispatcher(mut self, dispatcher: Arc<dyn Dispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Sink for the network activity indicator.
    pub fn indicator(mut self, indicator: Arc<dyn ActivityIndicator>) -> Self {
        self.indicator = Some(indicator);
        self
    }

    pub fn build(self) -> DownloadManager {
        DownloadManager {
            core: Arc::new(ManagerCore {
                transport: self.transport,
                registry: Arc::new(TaskRegistry::new()),
                dispatcher: self
                    .dispatcher
                    .unwrap_or_else(|| Arc::new(SerialDispatcher::new())),
                indicator: self.indicator.unwrap_or_else(|| Arc::new(NoopIndicator)),
            }),
        }
    }
}

/// Routes transport events to the owning download task.
///
/// Holds the manager weakly so in-flight transport tasks do not keep a
/// dropped manager alive. Tasks still registered when the manager goes away
/// are completed by its `Drop`.
struct ManagerEvents {
    core: Weak<ManagerCore>,
}

impl TransportEvents for ManagerEvents {
    fn on_response(
        &self,
        task: TransportTaskId,
        expected_length: Option<u64>,
    ) -> ResponseDisposition {
        let Some(core) = self.core.upgrade() else {
            return ResponseDisposition::Cancel;
        };
        match core.registry.find_by_transport_id(task) {
            Some(owner) => {
                trace!(task = %task, url = owner.url(), ?expected_length, "response received");
                owner.handle_response(expected_length);
                ResponseDisposition::Allow
            }
            None => {
                warn!(task = %task, "response for unknown task, cancelling");
                ResponseDisposition::Cancel
            }
        }
    }

    fn on_data(&self, task: TransportTaskId, chunk: Bytes) {
        let Some(core) = self.core.upgrade() else {
            return;
        };
        match core.registry.find_by_transport_id(task) {
            Some(owner) => {
                trace!(task = %task, len = chunk.len(), "data received");
                owner.handle_data(chunk);
            }
            None => debug!(task = %task, len = chunk.len(), "data for unknown task dropped"),
        }
    }

    fn on_complete(&self, task: TransportTaskId, error: Option<TransportError>) {
        let Some(core) = self.core.upgrade() else {
            return;
        };
        let removed = core
            .registry
            .remove_by_transport_id_and_check_empty(task, |owner, is_empty| {
                owner.handle_completion(error);
                if is_empty {
                    core.refresh_indicator();
                }
            });
        if removed.is_none() {
            debug!(task = %task, "completion for unknown task ignored");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::InlineDispatcher;
    use crate::indicator::SharedIndicator;
    use crate::task::DownloadResult;
    use crate::transport::{ManualTransport, TransportTask};
    use parking_lot::Mutex;

    struct Fixture {
        manager: DownloadManager,
        transport: Arc<ManualTransport>,
        indicator: Arc<SharedIndicator>,
    }

    fn fixture() -> Fixture {
        let transport = Arc::new(ManualTransport::new());
        let indicator = Arc::new(SharedIndicator::new());
        let manager = DownloadManager::builder(transport.clone())
            .dispatcher(Arc::new(InlineDispatcher))
            .indicator(indicator.clone())
            .build();
        Fixture {
            manager,
            transport,
            indicator,
        }
    }

    fn collect(task: &DownloadTask) -> Arc<Mutex<Vec<DownloadResult>>> {
        let results = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&results);
        task.on_completion(move |result| sink.lock().push(result));
        results
    }

    #[test]
    fn test_download_creates_one_transport_task_per_url() {
        let f = fixture();
        let a = f.manager.download(Request::get("https://x/a"), 1.0);
        let b = f.manager.download(Request::get("https://x/a"), 5.0);
        let c = f.manager.download(Request::get("https://x/c"), 1.0);

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(f.transport.created_count(), 2);
        assert_eq!(f.manager.active_tasks(), 2);
    }

    #[test]
    fn test_coalesced_download_bumps_priority() {
        let f = fixture();
        f.manager.download(Request::get("https://x/a"), 1.0);
        f.manager.download(Request::get("https://x/a"), 5.0);

        let manual = f.transport.task_for("https://x/a").unwrap();
        assert_eq!(manual.priority(), 5.0);
    }

    #[test]
    fn test_set_priority_on_missing_url_is_noop() {
        let f = fixture();
        f.manager.set_priority(9.0, "https://x/missing");
        assert!(f.manager.is_idle());
    }

    #[test]
    fn test_set_priority_updates_in_flight_task() {
        let f = fixture();
        f.manager.download(Request::get("https://x/a"), 1.0);
        f.manager.set_priority(0.1, "https://x/a");
        assert_eq!(f.transport.task_for("https://x/a").unwrap().priority(), 0.1);
    }

    #[test]
    fn test_events_flow_to_all_subscribers() {
        let f = fixture();
        let first = f.manager.download(Request::get("https://x/a"), 1.0);
        let first_results = collect(&first);
        first.resume();

        let manual = f.transport.task_for("https://x/a").unwrap();
        manual.respond(Some(6));
        manual.send("abc");

        // Joins after the request started.
        let second = f.manager.download(Request::get("https://x/a"), 1.0);
        let second_results = collect(&second);
        second.resume();

        manual.send("def");
        manual.finish();

        let expected: DownloadResult = Ok(Bytes::from_static(b"abcdef"));
        assert_eq!(*first_results.lock(), vec![expected.clone()]);
        assert_eq!(*second_results.lock(), vec![expected]);
        assert!(f.manager.is_idle());
    }

    #[test]
    fn test_completion_removes_task_so_next_request_is_fresh() {
        let f = fixture();
        f.manager.download(Request::get("https://x/a"), 1.0);
        f.transport.task_for("https://x/a").unwrap().finish();
        assert!(f.manager.task_for("https://x/a").is_none());

        f.manager.download(Request::get("https://x/a"), 1.0);
        assert_eq!(f.transport.created_count(), 2);
    }

    #[test]
    fn test_response_for_unknown_task_is_cancelled() {
        let f = fixture();
        f.manager.download(Request::get("https://x/a"), 1.0);
        let manual = f.transport.task_for("https://x/a").unwrap();
        manual.finish();

        // A late response after the task was removed.
        assert_eq!(manual.respond(Some(10)), ResponseDisposition::Cancel);
        assert!(manual.is_cancelled());
    }

    #[test]
    fn test_data_for_unknown_task_is_dropped() {
        let f = fixture();
        let task = f.manager.download(Request::get("https://x/a"), 1.0);
        let manual = f.transport.task_for("https://x/a").unwrap();
        manual.send("abc");
        manual.finish();
        manual.send("late");

        assert_eq!(task.received_len(), 3);
    }

    #[test]
    fn test_duplicate_completion_is_ignored() {
        let f = fixture();
        let task = f.manager.download(Request::get("https://x/a"), 1.0);
        let results = collect(&task);
        let manual = f.transport.task_for("https://x/a").unwrap();

        manual.finish();
        manual.fail(TransportError::Cancelled);

        assert_eq!(results.lock().len(), 1);
        assert!(results.lock()[0].is_ok());
    }

    #[test]
    fn test_cancel_delivers_error_through_completion() {
        let f = fixture();
        let task = f.manager.download(Request::get("https://x/a"), 1.0);
        let results = collect(&task);

        task.cancel();

        assert_eq!(*results.lock(), vec![Err(TransportError::Cancelled)]);
        assert!(f.manager.is_idle());
    }

    #[test]
    fn test_indicator_follows_registry() {
        let f = fixture();
        assert!(!f.indicator.is_active());

        f.manager.download(Request::get("https://x/a"), 1.0);
        f.manager.download(Request::get("https://x/b"), 1.0);
        assert!(f.indicator.is_active());

        f.transport.task_for("https://x/a").unwrap().finish();
        assert!(f.indicator.is_active());

        f.transport.task_for("https://x/b").unwrap().finish();
        assert!(!f.indicator.is_active());
    }

    #[test]
    fn test_coalesced_download_still_signals_activity() {
        let f = fixture();
        f.manager.download(Request::get("https://x/a"), 1.0);
        let before = f.indicator.update_count();

        f.manager.download(Request::get("https://x/a"), 1.0);

        assert_eq!(f.indicator.update_count(), before + 1);
        assert!(f.indicator.is_active());
    }

    #[test]
    fn test_events_after_manager_dropped_are_rejected() {
        let f = fixture();
        f.manager.download(Request::get("https://x/a"), 1.0);
        let manual = f.transport.task_for("https://x/a").unwrap();
        drop(f.manager);

        assert_eq!(manual.respond(Some(1)), ResponseDisposition::Cancel);
    }

    #[test]
    fn test_dropping_manager_completes_in_flight_tasks() {
        let f = fixture();
        let task = f.manager.download(Request::get("https://x/a"), 1.0);
        let results = collect(&task);
        task.resume();
        let manual = f.transport.task_for("https://x/a").unwrap();
        manual.respond(Some(3));
        drop(f.manager);

        manual.send("abc");
        manual.finish();

        assert_eq!(*results.lock(), vec![Err(TransportError::Cancelled)]);
        assert!(task.is_completed());
        assert!(manual.is_cancelled());
        assert!(!f.indicator.is_active());
    }

    #[test]
    fn test_subscriber_after_manager_dropped_gets_stored_outcome() {
        let f = fixture();
        let task = f.manager.download(Request::get("https://x/a"), 1.0);
        drop(f.manager);

        let results = collect(&task);
        assert_eq!(*results.lock(), vec![Err(TransportError::Cancelled)]);
    }

    #[test]
    fn test_dropping_one_handle_keeps_tasks_alive() {
        let f = fixture();
        let other = f.manager.clone();
        let task = f.manager.download(Request::get("https://x/a"), 1.0);
        let results = collect(&task);
        drop(f.manager);

        f.transport.task_for("https://x/a").unwrap().finish();

        assert_eq!(*results.lock(), vec![Ok(Bytes::new())]);
        assert!(other.is_idle());
    }
}
