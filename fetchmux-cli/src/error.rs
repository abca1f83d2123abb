//! CLI error type.

use std::fmt;

use fetchmux::{NetworkError, TransportError};

/// Errors reported by CLI commands.
#[derive(Debug)]
pub enum CliError {
    /// Invalid or inconsistent command-line arguments.
    InvalidArgument(String),
    /// The transport or runtime could not be set up.
    Setup(TransportError),
    /// A request failed.
    Network { url: String, error: NetworkError },
    /// Writing the response failed.
    Io(std::io::Error),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::InvalidArgument(msg) => write!(f, "{}", msg),
            CliError::Setup(e) => write!(f, "setup failed: {}", e),
            CliError::Network { url, error } => write!(f, "{}: {}", url, error),
            CliError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Setup(e) => Some(e),
            CliError::Network { error, .. } => Some(error),
            CliError::Io(e) => Some(e),
            CliError::InvalidArgument(_) => None,
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        CliError::Io(e)
    }
}

impl From<TransportError> for CliError {
    fn from(e: TransportError) -> Self {
        CliError::Setup(e)
    }
}
