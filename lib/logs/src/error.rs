//! Error types for the log stream crate.

use amber_relay_api::ApiError;
use std::fmt;

/// Errors from the event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// The handshake was rejected; `retry_after_ms` carries the server's
    /// retry hint when it sent one.
    BadStatus {
        status: u16,
        retry_after_ms: Option<u64>,
    },
    /// The connection dropped or could not be established.
    Transport { message: String },
    /// The server closed the stream cleanly.
    Closed,
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadStatus { status, .. } => write!(f, "stream rejected with status {status}"),
            Self::Transport { message } => write!(f, "stream transport error: {message}"),
            Self::Closed => write!(f, "stream closed by server"),
        }
    }
}

impl std::error::Error for StreamError {}

impl From<ApiError> for StreamError {
    fn from(e: ApiError) -> Self {
        match e {
            ApiError::Status { status, .. } => Self::BadStatus {
                status,
                retry_after_ms: None,
            },
            other => Self::Transport {
                message: other.to_string(),
            },
        }
    }
}
