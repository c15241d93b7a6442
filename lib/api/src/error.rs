//! Error types for the transport layer.

use std::fmt;

/// Errors from talking to the console backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// The request never completed (connection refused, DNS, timeout).
    Transport { message: String },
    /// The backend answered with a non-success status.
    ///
    /// `message` is the surfaced message extracted from the error body,
    /// already prefixed with the domain code when the body carried one.
    Status { status: u16, message: String },
    /// The response body could not be decoded as the expected shape.
    Decode { message: String },
}

impl ApiError {
    /// Returns the HTTP status code, when the server answered at all.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns true for a 404 response.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport { message } => write!(f, "transport error: {message}"),
            Self::Status { message, .. } => f.write_str(message),
            Self::Decode { message } => write!(f, "failed to decode response: {message}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Decode {
                message: e.to_string(),
            }
        } else {
            Self::Transport {
                message: e.to_string(),
            }
        }
    }
}
