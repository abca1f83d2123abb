//! HTTP transport backed by reqwest.
//!
//! Each transport task owns one HTTP exchange that runs as a tokio task once
//! resumed. The response body is streamed chunk by chunk into
//! [`TransportEvents::on_data`]; nothing is buffered here.
//!
//! Lifecycle controls map onto the running exchange:
//! - `resume` starts the exchange on first call and un-pauses it afterwards
//! - `suspend` pauses body streaming between chunks
//! - `cancel` aborts the exchange at its next await point and reports
//!   [`TransportError::Cancelled`]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use reqwest::{Client, Method};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::{
    AtomicPriority, ResponseDisposition, Transport, TransportEvents, TransportTask, TransportTaskId,
};
use crate::config::TransportConfig;
use crate::error::{TransportError, TransportResult};
use crate::request::{HttpMethod, Request};

/// Transport that performs real HTTP requests with reqwest on a tokio runtime.
pub struct ReqwestTransport {
    client: Client,
    config: TransportConfig,
    runtime: Handle,
}

impl ReqwestTransport {
    /// Creates a transport that spawns its exchanges on the current tokio runtime.
    pub fn new(config: TransportConfig) -> TransportResult<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| TransportError::Setup(format!("no tokio runtime: {}", e)))?;
        Self::with_runtime(config, runtime)
    }

    /// Creates a transport that spawns its exchanges on `runtime`.
    pub fn with_runtime(config: TransportConfig, runtime: Handle) -> TransportResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| TransportError::Setup(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            runtime,
        })
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }
}

impl Transport for ReqwestTransport {
    fn create_task(
        &self,
        request: Request,
        priority: f32,
        events: Arc<dyn TransportEvents>,
    ) -> Arc<dyn TransportTask> {
        let id = TransportTaskId::next();
        debug!(
            task = %id,
            url = request.url(),
            method = %request.method(),
            priority,
            "transport task created"
        );

        let (state, _) = watch::channel(RunState::Suspended);
        Arc::new(ReqwestTask {
            id,
            url: request.url().to_string(),
            pending: Mutex::new(Some(request)),
            priority: AtomicPriority::new(priority),
            started: AtomicBool::new(false),
            state,
            cancel: CancellationToken::new(),
            events,
            client: self.client.clone(),
            error_for_status: self.config.error_for_status,
            timeout_secs: self.config.timeout.as_secs(),
            runtime: self.runtime.clone(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Suspended,
    Running,
}

struct ReqwestTask {
    id: TransportTaskId,
    url: String,
    /// Taken when the exchange starts.
    pending: Mutex<Option<Request>>,
    priority: AtomicPriority,
    started: AtomicBool,
    state: watch::Sender<RunState>,
    cancel: CancellationToken,
    events: Arc<dyn TransportEvents>,
    client: Client,
    error_for_status: bool,
    timeout_secs: u64,
    runtime: Handle,
}

impl ReqwestTask {
    fn start(&self) {
        let Some(request) = self.pending.lock().take() else {
            return;
        };

        let exchange = Exchange {
            id: self.id,
            request,
            client: self.client.clone(),
            events: Arc::clone(&self.events),
            state: self.state.subscribe(),
            cancel: self.cancel.clone(),
            error_for_status: self.error_for_status,
            timeout_secs: self.timeout_secs,
        };
        self.runtime.spawn(exchange.run());
    }
}

impl TransportTask for ReqwestTask {
    fn id(&self) -> TransportTaskId {
        self.id
    }

    fn url(&self) -> &str {
        &self.url
    }

    fn resume(&self) {
        self.state.send_replace(RunState::Running);
        if !self.started.swap(true, Ordering::SeqCst) {
            self.start();
        }
    }

    fn suspend(&self) {
        self.state.send_replace(RunState::Suspended);
    }

    fn cancel(&self) {
        self.cancel.cancel();
        if !self.started.swap(true, Ordering::SeqCst) {
            // Never started: still report completion through the normal path.
            let id = self.id;
            let events = Arc::clone(&self.events);
            self.runtime.spawn(async move {
                events.on_complete(id, Some(TransportError::Cancelled));
            });
        }
    }

    fn priority(&self) -> f32 {
        self.priority.get()
    }

    fn set_priority(&self, priority: f32) {
        trace!(task = %self.id, priority, "transport priority updated");
        self.priority.set(priority);
    }
}

/// One running HTTP exchange.
struct Exchange {
    id: TransportTaskId,
    request: Request,
    client: Client,
    events: Arc<dyn TransportEvents>,
    state: watch::Receiver<RunState>,
    cancel: CancellationToken,
    error_for_status: bool,
    timeout_secs: u64,
}

impl Exchange {
    async fn run(mut self) {
        let cancel = self.cancel.clone();
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TransportError::Cancelled),
            result = self.stream() => result,
        };

        match &outcome {
            Ok(()) => debug!(task = %self.id, url = self.request.url(), "exchange finished"),
            Err(e) => {
                debug!(task = %self.id, url = self.request.url(), error = %e, "exchange failed")
            }
        }
        self.events.on_complete(self.id, outcome.err());
    }

    async fn stream(&mut self) -> TransportResult<()> {
        self.wait_until_running().await;

        let url = reqwest::Url::parse(self.request.url()).map_err(|e| TransportError::InvalidUrl {
            url: self.request.url().to_string(),
            reason: e.to_string(),
        })?;
        let method = match self.request.method() {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
        };

        let mut builder = self.client.request(method, url);
        for (name, value) in self.request.headers() {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = self.request.body() {
            builder = builder.body(body.clone());
        }

        let mut response = builder.send().await.map_err(|e| self.request_error(e))?;

        let status = response.status();
        if self.error_for_status && !status.is_success() {
            return Err(TransportError::Status {
                url: self.request.url().to_string(),
                status: status.as_u16(),
            });
        }

        let expected_length = response.content_length();
        trace!(task = %self.id, status = status.as_u16(), ?expected_length, "response headers");
        if self.events.on_response(self.id, expected_length) == ResponseDisposition::Cancel {
            return Err(TransportError::Cancelled);
        }

        loop {
            self.wait_until_running().await;
            let chunk = response.chunk().await.map_err(|e| self.body_error(e))?;
            match chunk {
                Some(chunk) => self.events.on_data(self.id, chunk),
                None => return Ok(()),
            }
        }
    }

    async fn wait_until_running(&mut self) {
        // A closed channel means the task handle is gone; keep going rather than hang.
        let _ = self.state.wait_for(|s| *s == RunState::Running).await;
    }

    fn request_error(&self, e: reqwest::Error) -> TransportError {
        if e.is_timeout() {
            return self.timeout_error();
        }
        TransportError::Request {
            url: self.request.url().to_string(),
            reason: e.to_string(),
        }
    }

    fn body_error(&self, e: reqwest::Error) -> TransportError {
        if e.is_timeout() {
            return self.timeout_error();
        }
        TransportError::Body {
            url: self.request.url().to_string(),
            reason: e.to_string(),
        }
    }

    fn timeout_error(&self) -> TransportError {
        TransportError::Timeout {
            url: self.request.url().to_string(),
            timeout_secs: self.timeout_secs,
        }
    }
}
