//! Error types for the workflow crate.
//!
//! Client-side validation failures are distinct variants so callers can
//! match on the condition (`NodeSequenceRequired` carries the
//! `WORKFLOW_NODE_REQUIRED` domain code) instead of string-matching
//! messages.

use amber_relay_api::ApiError;
use std::fmt;

/// Errors from draft lifecycle operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DraftError {
    /// The draft has no pipeline nodes; a workflow is only savable and
    /// publishable with a non-empty node sequence.
    NodeSequenceRequired,
    /// The operation requires a selected workflow.
    NoSelection,
    /// Editing is blocked until prerequisite catalog entries exist.
    EditingBlocked { reason: String },
    /// The backend rejected or never received the request.
    Api(ApiError),
}

impl DraftError {
    /// Returns the domain error code, when the variant maps to one.
    #[must_use]
    pub fn code(&self) -> Option<&'static str> {
        match self {
            Self::NodeSequenceRequired => Some("WORKFLOW_NODE_REQUIRED"),
            _ => None,
        }
    }
}

impl fmt::Display for DraftError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NodeSequenceRequired => write!(f, "workflow needs at least one node"),
            Self::NoSelection => write!(f, "no workflow selected"),
            Self::EditingBlocked { reason } => f.write_str(reason),
            Self::Api(e) => e.fmt(f),
        }
    }
}

impl std::error::Error for DraftError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Api(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ApiError> for DraftError {
    fn from(e: ApiError) -> Self {
        Self::Api(e)
    }
}
