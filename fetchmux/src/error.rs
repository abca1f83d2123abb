//! Error types for fetchmux.
//!
//! Two layers of errors exist:
//!
//! - [`TransportError`] is produced by a [`Transport`](crate::transport::Transport)
//!   when a request cannot be completed. It is surfaced verbatim to every
//!   completion subscriber of the failed task.
//! - [`NetworkError`] is what callers of the
//!   [`NetworkService`](crate::service::NetworkService) receive. It wraps
//!   transport failures and adds the serialization failures that happen while
//!   building request bodies or decoding responses.
//!
//! Both types are `Clone`: a single failure of a coalesced task is delivered
//! to every subscriber that joined it.

use thiserror::Error;

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Result type for request service operations.
pub type NetworkResult<T> = Result<T, NetworkError>;

/// Errors reported by the transport when a request completes unsuccessfully.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The request was cancelled before it completed.
    #[error("request cancelled")]
    Cancelled,

    /// The transport could not be set up (client construction, missing runtime).
    #[error("transport setup failed: {0}")]
    Setup(String),

    /// The request URL could not be parsed.
    #[error("invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// The request could not be sent (connection, TLS, redirect failure).
    #[error("request to {url} failed: {reason}")]
    Request { url: String, reason: String },

    /// The server answered with a non-success status and the transport is
    /// configured to treat that as a failure.
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    /// The response body could not be read to the end.
    #[error("failed to read response body from {url}: {reason}")]
    Body { url: String, reason: String },

    /// The request exceeded the configured timeout.
    #[error("request to {url} timed out after {timeout_secs}s")]
    Timeout { url: String, timeout_secs: u64 },
}

impl TransportError {
    /// Returns true if this error is the result of cancelling the request.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Errors delivered to request service callers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkError {
    /// The transport failed to complete the request.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The response bytes could not be decoded into the requested type.
    #[error("decode error: {0}")]
    Decode(String),

    /// The request body could not be encoded.
    #[error("encode error: {0}")]
    Encode(String),

    /// No result could be produced (the completion was dropped unanswered).
    #[error("unknown network error")]
    Unknown,
}

impl NetworkError {
    /// Returns true if the error came from the transport layer.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Returns true if the error came from decoding a response.
    pub fn is_decode(&self) -> bool {
        matches!(self, Self::Decode(_))
    }
}
