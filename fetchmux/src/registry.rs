//! Registry of in-flight download tasks.
//!
//! The registry is the only shared mutable state of the download manager. It
//! maps each URL to at most one task, which is what makes coalescing work:
//! every request for a URL that is already in flight joins the existing task.
//!
//! # Locking
//!
//! All reads and writes go through a single mutex. The two compound
//! operations that the manager depends on are performed inside one critical
//! section each:
//!
//! - [`TaskRegistry::find_or_insert_with`]: lookup + insert, so concurrent
//!   first requests for the same URL cannot both create a task
//! - [`TaskRegistry::remove_and_check_empty`]: remove + emptiness check, so
//!   two completions racing each other agree on which one emptied the registry
//!
//! Tasks are also indexed by transport identity under the same lock, so
//! routing a data chunk to its task does not scan the registry.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::transport::TransportTaskId;

/// An entry that can be stored in a [`TaskRegistry`].
pub trait RegistryEntry: Send + Sync {
    /// Coalescing key.
    fn url(&self) -> &str;

    /// Identity of the underlying transport task, used to route events.
    fn transport_id(&self) -> TransportTaskId;
}

/// Thread-safe map from URL to in-flight task.
pub struct TaskRegistry<T> {
    tasks: Mutex<Tasks<T>>,
}

/// Registry contents. `by_id` indexes `by_url` and is updated in the same
/// critical section, so the two never disagree.
struct Tasks<T> {
    by_url: HashMap<String, Arc<T>>,
    by_id: HashMap<TransportTaskId, String>,
}

impl<T: RegistryEntry> Tasks<T> {
    fn insert(&mut self, task: Arc<T>) {
        self.by_id.insert(task.transport_id(), task.url().to_string());
        self.by_url.insert(task.url().to_string(), task);
    }

    fn remove_url(&mut self, url: &str) -> Option<Arc<T>> {
        let task = self.by_url.remove(url)?;
        self.by_id.remove(&task.transport_id());
        Some(task)
    }
}

impl<T: RegistryEntry> TaskRegistry<T> {
    pub fn new() -> Self {
        Self {
            tasks: Mutex::new(Tasks {
                by_url: HashMap::new(),
                by_id: HashMap::new(),
            }),
        }
    }

    /// Returns the task registered for `url`, if any.
    pub fn find_by_url(&self, url: &str) -> Option<Arc<T>> {
        self.tasks.lock().by_url.get(url).cloned()
    }

    /// Returns the task whose transport task has identity `id`, if any.
    pub fn find_by_transport_id(&self, id: TransportTaskId) -> Option<Arc<T>> {
        let tasks = self.tasks.lock();
        let url = tasks.by_id.get(&id)?;
        tasks.by_url.get(url).cloned()
    }

    /// Registers `task`. Returns false, leaving the registry unchanged, if a
    /// task for the same URL is already registered.
    pub fn append(&self, task: Arc<T>) -> bool {
        let mut tasks = self.tasks.lock();
        if tasks.by_url.contains_key(task.url()) {
            return false;
        }
        tasks.insert(task);
        true
    }

    /// Returns the task for `url`, creating and registering one with `create`
    /// if none exists. The boolean is true when a task was created.
    ///
    /// `create` runs while the registry lock is held and must not call back
    /// into the registry.
    pub fn find_or_insert_with<F>(&self, url: &str, create: F) -> (Arc<T>, bool)
    where
        F: FnOnce() -> Arc<T>,
    {
        let mut tasks = self.tasks.lock();
        if let Some(existing) = tasks.by_url.get(url) {
            return (Arc::clone(existing), false);
        }
        let task = create();
        tasks.insert(Arc::clone(&task));
        (task, true)
    }

    /// Removes the first task matching `predicate` and hands it to
    /// `on_removed` together with whether the registry is now empty.
    ///
    /// The emptiness flag is computed in the same critical section as the
    /// removal; `on_removed` itself runs after the lock is released. Removing
    /// an unknown task is a no-op and returns `None`.
    pub fn remove_and_check_empty<P, F, R>(&self, predicate: P, on_removed: F) -> Option<R>
    where
        P: Fn(&T) -> bool,
        F: FnOnce(Arc<T>, bool) -> R,
    {
        let (removed, is_empty) = {
            let mut tasks = self.tasks.lock();
            let url = tasks
                .by_url
                .iter()
                .find(|(_, task)| predicate(task))
                .map(|(url, _)| url.clone())?;
            let removed = tasks.remove_url(&url)?;
            (removed, tasks.by_url.is_empty())
        };
        Some(on_removed(removed, is_empty))
    }

    /// Same as [`remove_and_check_empty`](Self::remove_and_check_empty), keyed
    /// by transport identity through the index instead of a scan.
    pub fn remove_by_transport_id_and_check_empty<F, R>(
        &self,
        id: TransportTaskId,
        on_removed: F,
    ) -> Option<R>
    where
        F: FnOnce(Arc<T>, bool) -> R,
    {
        let (removed, is_empty) = {
            let mut tasks = self.tasks.lock();
            let url = tasks.by_id.get(&id)?.clone();
            let removed = tasks.remove_url(&url)?;
            (removed, tasks.by_url.is_empty())
        };
        Some(on_removed(removed, is_empty))
    }

    /// Removes every task, returning them in no particular order.
    pub fn drain(&self) -> Vec<Arc<T>> {
        let mut tasks = self.tasks.lock();
        tasks.by_id.clear();
        tasks.by_url.drain().map(|(_, task)| task).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.lock().by_url.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().by_url.len()
    }

    /// Snapshot of the registered URLs.
    pub fn urls(&self) -> Vec<String> {
        self.tasks.lock().by_url.keys().cloned().collect()
    }
}

impl<T: RegistryEntry> Default for TaskRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}
