//! Configuration for the HTTP transport and the request service.
//!
//! Both structs follow the same shape: a `Default` with sensible values and
//! chainable `with_*` setters.
//!
//! ```ignore
//! use std::time::Duration;
//! use fetchmux::config::TransportConfig;
//!
//! let config = TransportConfig::default()
//!     .with_timeout(Duration::from_secs(10))
//!     .with_error_for_status(true);
//! ```

use std::time::Duration;

use crate::transport::PRIORITY_DEFAULT;

/// Default overall request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Default connect timeout in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default `User-Agent` header.
pub const DEFAULT_USER_AGENT: &str = concat!("fetchmux/", env!("CARGO_PKG_VERSION"));

/// Settings for [`ReqwestTransport`](crate::transport::ReqwestTransport).
#[derive(Clone, Debug)]
pub struct TransportConfig {
    /// Overall timeout for one request, including the body.
    pub timeout: Duration,

    /// Timeout for establishing the connection.
    pub connect_timeout: Duration,

    /// Value of the `User-Agent` header.
    pub user_agent: String,

    /// Complete with [`TransportError::Status`](crate::error::TransportError::Status)
    /// on non-2xx responses instead of delivering the body.
    pub error_for_status: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            error_for_status: false,
        }
    }
}

impl TransportConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_error_for_status(mut self, enabled: bool) -> Self {
        self.error_for_status = enabled;
        self
    }
}

/// Settings for [`NetworkService`](crate::service::NetworkService).
#[derive(Clone, Debug)]
pub struct ServiceConfig {
    /// Priority used by the `fetch*` helpers.
    pub default_priority: f32,

    /// Add a `Content-Type` header to JSON and form bodies when the caller
    /// did not supply one.
    pub inject_content_type: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            default_priority: PRIORITY_DEFAULT,
            inject_content_type: true,
        }
    }
}

impl ServiceConfig {
    pub fn with_default_priority(mut self, priority: f32) -> Self {
        self.default_priority = priority;
        self
    }

    pub fn with_inject_content_type(mut self, enabled: bool) -> Self {
        self.inject_content_type = enabled;
        self
    }
}
