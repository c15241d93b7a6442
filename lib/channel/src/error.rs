//! Error types for the channel crate.

use amber_relay_api::ApiError;
use std::fmt;

/// Errors from channel policy operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// A field failed client-side validation; nothing was sent.
    Validation { field: &'static str, message: String },
    /// The test-send throttle is active.
    Throttled { retry_after_ms: u64 },
    /// No workflow is selected or no policy is loaded.
    NoPolicy,
    /// The backend rejected or never received the request.
    Api(ApiError),
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation { field, message } => write!(f, "{field}: {message}"),
            Self::Throttled { retry_after_ms } => {
                write!(
                    f,
                    "too many test messages; retry in {}s",
                    retry_after_ms.div_ceil(1000)
                )
            }
            Self::NoPolicy => write!(f, "no channel policy loaded"),
            Self::Api(e) => e.fmt(f),
        }
    }
}

impl std::error::Error for ChannelError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Api(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ApiError> for ChannelError {
    fn from(e: ApiError) -> Self {
        Self::Api(e)
    }
}
