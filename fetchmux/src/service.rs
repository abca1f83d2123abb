//! Request service: builds requests, submits them and decodes responses.
//!
//! Every operation comes in two shapes:
//!
//! - raw: the completion receives the response bytes
//! - decoded: the completion receives a value deserialized from JSON, or
//!   [`NetworkError::Decode`] if the bytes do not match the target type
//!
//! Requests go through the [`DownloadManager`], so concurrent requests for the
//! same URL share one transport request. The service attaches the caller's
//! callbacks and resumes the task.
//!
//! # Example
//!
//! ```ignore
//! use fetchmux::{NetworkService, HeaderFields};
//!
//! service.get_decoded::<Manifest, _>(
//!     "https://example.com/manifest.json",
//!     HeaderFields::new(),
//!     0.5,
//!     None,
//!     |result| match result {
//!         Ok(manifest) => println!("{} entries", manifest.entries.len()),
//!         Err(e) => eprintln!("failed: {}", e),
//!     },
//! );
//! ```

use std::sync::Arc;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::codec;
use crate::config::ServiceConfig;
use crate::error::{NetworkError, NetworkResult};
use crate::manager::DownloadManager;
use crate::request::{FormFields, HeaderFields, Request, CONTENT_TYPE_FORM, CONTENT_TYPE_JSON};
use crate::task::{DownloadTask, ProgressCallback};

/// Request service on top of a [`DownloadManager`].
#[derive(Clone)]
pub struct NetworkService {
    manager: DownloadManager,
    config: ServiceConfig,
}

impl NetworkService {
    pub fn new(manager: DownloadManager) -> Self {
        Self::with_config(manager, ServiceConfig::default())
    }

    pub fn with_config(manager: DownloadManager, config: ServiceConfig) -> Self {
        Self { manager, config }
    }

    pub fn manager(&self) -> &DownloadManager {
        &self.manager
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Submits `request` and delivers the raw response bytes.
    ///
    /// `progress` replaces the task's progress callback; `None` clears it.
    /// The completion is appended to the task's subscribers.
    pub fn perform<F>(
        &self,
        request: Request,
        priority: f32,
        progress: Option<ProgressCallback>,
        completion: F,
    ) -> Arc<DownloadTask>
    where
        F: FnOnce(NetworkResult<Bytes>) + Send + 'static,
    {
        let task = self.manager.download(request, priority);
        task.set_progress_handler(progress);
        self.subscribe_and_resume(&task, completion);
        task
    }

    /// Submits `request` and decodes the response into `T`.
    pub fn perform_decoded<T, F>(
        &self,
        request: Request,
        priority: f32,
        progress: Option<ProgressCallback>,
        completion: F,
    ) -> Arc<DownloadTask>
    where
        T: DeserializeOwned + 'static,
        F: FnOnce(NetworkResult<T>) + Send + 'static,
    {
        self.perform(request, priority, progress, decoding(completion))
    }

    /// GET `url`, raw bytes.
    pub fn get<F>(
        &self,
        url: &str,
        headers: HeaderFields,
        priority: f32,
        progress: Option<ProgressCallback>,
        completion: F,
    ) -> Arc<DownloadTask>
    where
        F: FnOnce(NetworkResult<Bytes>) + Send + 'static,
    {
        let request = Request::get(url).with_headers(headers);
        self.perform(request, priority, progress, completion)
    }

    /// GET `url`, decoded into `T`.
    pub fn get_decoded<T, F>(
        &self,
        url: &str,
        headers: HeaderFields,
        priority: f32,
        progress: Option<ProgressCallback>,
        completion: F,
    ) -> Arc<DownloadTask>
    where
        T: DeserializeOwned + 'static,
        F: FnOnce(NetworkResult<T>) + Send + 'static,
    {
        self.get(url, headers, priority, progress, decoding(completion))
    }

    /// POST `body` encoded as JSON, raw bytes.
    ///
    /// If `body` cannot be encoded nothing is submitted, the completion
    /// receives [`NetworkError::Encode`] and `None` is returned.
    pub fn post_json<B, F>(
        &self,
        url: &str,
        headers: HeaderFields,
        body: &B,
        priority: f32,
        progress: Option<ProgressCallback>,
        completion: F,
    ) -> Option<Arc<DownloadTask>>
    where
        B: Serialize + ?Sized,
        F: FnOnce(NetworkResult<Bytes>) + Send + 'static,
    {
        let request = match Request::post(url).with_headers(headers).with_json(body) {
            Ok(request) => self.with_content_type(request, CONTENT_TYPE_JSON),
            Err(e) => {
                warn!(url, error = %e, "request body encoding failed");
                self.manager.dispatch(Box::new(move || completion(Err(e))));
                return None;
            }
        };
        Some(self.perform(request, priority, progress, completion))
    }

    /// POST `body` encoded as JSON, response decoded into `T`.
    pub fn post_json_decoded<B, T, F>(
        &self,
        url: &str,
        headers: HeaderFields,
        body: &B,
        priority: f32,
        progress: Option<ProgressCallback>,
        completion: F,
    ) -> Option<Arc<DownloadTask>>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned + 'static,
        F: FnOnce(NetworkResult<T>) + Send + 'static,
    {
        self.post_json(url, headers, body, priority, progress, decoding(completion))
    }

    /// POST without a body, raw bytes.
    pub fn post<F>(
        &self,
        url: &str,
        headers: HeaderFields,
        priority: f32,
        progress: Option<ProgressCallback>,
        completion: F,
    ) -> Arc<DownloadTask>
    where
        F: FnOnce(NetworkResult<Bytes>) + Send + 'static,
    {
        let request = Request::post(url).with_headers(headers);
        self.perform(request, priority, progress, completion)
    }

    /// POST without a body, response decoded into `T`.
    pub fn post_decoded<T, F>(
        &self,
        url: &str,
        headers: HeaderFields,
        priority: f32,
        progress: Option<ProgressCallback>,
        completion: F,
    ) -> Arc<DownloadTask>
    where
        T: DeserializeOwned + 'static,
        F: FnOnce(NetworkResult<T>) + Send + 'static,
    {
        self.post(url, headers, priority, progress, decoding(completion))
    }

    /// POST `fields` form-encoded, raw bytes.
    ///
    /// Takes no progress callback and leaves the task's current one in place.
    pub fn post_form<F>(
        &self,
        url: &str,
        headers: HeaderFields,
        fields: &FormFields,
        priority: f32,
        completion: F,
    ) -> Arc<DownloadTask>
    where
        F: FnOnce(NetworkResult<Bytes>) + Send + 'static,
    {
        let request = Request::post(url).with_headers(headers).with_form(fields);
        let request = self.with_content_type(request, CONTENT_TYPE_FORM);
        let task = self.manager.download(request, priority);
        self.subscribe_and_resume(&task, completion);
        task
    }

    /// Updates the priority of the in-flight request for `url`, if any.
    pub fn set_priority(&self, priority: f32, url: &str) {
        self.manager.set_priority(priority, url);
    }

    /// Submits `request` at the configured default priority and waits for
    /// the raw response.
    ///
    /// Resolves to [`NetworkError::Unknown`] if the completion is dropped
    /// without being called, e.g. when the notification context shut down.
    pub async fn fetch(&self, request: Request) -> NetworkResult<Bytes> {
        let (tx, rx) = oneshot::channel();
        self.perform(request, self.config.default_priority, None, move |result| {
            let _ = tx.send(result);
        });
        rx.await.unwrap_or(Err(NetworkError::Unknown))
    }

    /// Like [`fetch`](Self::fetch), decoding the response into `T`.
    pub async fn fetch_decoded<T>(&self, request: Request) -> NetworkResult<T>
    where
        T: DeserializeOwned,
    {
        let bytes = self.fetch(request).await?;
        codec::decode(&bytes)
    }

    fn subscribe_and_resume<F>(&self, task: &DownloadTask, completion: F)
    where
        F: FnOnce(NetworkResult<Bytes>) + Send + 'static,
    {
        task.on_completion(move |result| completion(result.map_err(NetworkError::from)));
        debug!(url = task.url(), "resuming download task");
        task.resume();
    }

    fn with_content_type(&self, request: Request, content_type: &str) -> Request {
        if self.config.inject_content_type {
            request.with_default_content_type(content_type)
        } else {
            request
        }
    }
}

/// Adapts a typed completion into a raw-bytes completion.
fn decoding<T, F>(completion: F) -> impl FnOnce(NetworkResult<Bytes>) + Send + 'static
where
    T: DeserializeOwned + 'static,
    F: FnOnce(NetworkResult<T>) + Send + 'static,
{
    move |result| completion(result.and_then(|bytes| codec::decode(&bytes)))
}
