//! fetchmux - client-side HTTP download coalescing
//!
//! Concurrent requests for the same URL share one transport request. Each
//! in-flight download buffers its body, reports progress to one subscriber
//! and fans the final result out to every completion subscriber, in
//! registration order, on a single notification context.
//!
//! # Layers
//!
//! ```text
//! NetworkService      request building, JSON/form bodies, typed decoding
//!       │
//! DownloadManager     coalescing, priority, activity indicator
//!       │
//! TaskRegistry ─ DownloadTask     per-URL buffer and subscribers
//!       │
//! Transport           reqwest (ReqwestTransport) or hand-driven (ManualTransport)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use fetchmux::{DownloadManager, NetworkService, ReqwestTransport, Request, TransportConfig};
//!
//! let transport = Arc::new(ReqwestTransport::new(TransportConfig::default())?);
//! let service = NetworkService::new(DownloadManager::new(transport));
//! let body = service.fetch(Request::get("https://example.com/data.json")).await?;
//! ```

pub mod codec;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod indicator;
pub mod manager;
pub mod registry;
pub mod request;
pub mod service;
pub mod task;
pub mod transport;

pub use bytes::Bytes;

pub use config::{ServiceConfig, TransportConfig};
pub use dispatch::{Dispatcher, InlineDispatcher, SerialDispatcher};
pub use error::{NetworkError, NetworkResult, TransportError, TransportResult};
pub use indicator::{ActivityIndicator, LogIndicator, NoopIndicator, SharedIndicator};
pub use manager::{DownloadManager, DownloadManagerBuilder};
pub use registry::{RegistryEntry, TaskRegistry};
pub use request::{FormFields, HeaderFields, HttpMethod, Request};
pub use service::NetworkService;
pub use task::{DownloadResult, DownloadTask, ProgressCallback};
pub use transport::{
    ManualTask, ManualTransport, ReqwestTransport, ResponseDisposition, Transport,
    TransportEvents, TransportTask, TransportTaskId, PRIORITY_DEFAULT, PRIORITY_HIGH,
    PRIORITY_LOW,
};
