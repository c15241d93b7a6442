//! Strongly-typed ID types for domain entities.
//!
//! All entity IDs in this system are assigned by the backend, so each ID
//! type wraps an opaque non-empty string rather than minting its own
//! identifiers. The newtypes exist so a workflow ID can never be handed to
//! an API that expects a node ID.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Error returned when parsing an ID from a string fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    /// The type of ID that failed to parse.
    pub id_type: &'static str,
}

impl fmt::Display for ParseIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} must be a non-empty string", self.id_type)
    }
}

impl std::error::Error for ParseIdError {}

/// Macro to generate a strongly-typed ID wrapper around a server-assigned string.
macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wraps a raw identifier, trimming surrounding whitespace.
            ///
            /// Returns `None` when the trimmed value is empty.
            #[must_use]
            pub fn new(raw: impl AsRef<str>) -> Option<Self> {
                let trimmed = raw.as_ref().trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(Self(trimmed.to_string()))
                }
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s).ok_or(ParseIdError {
                    id_type: stringify!($name),
                })
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_id!(
    /// Unique identifier for a workflow.
    WorkflowId
);

define_id!(
    /// Unique identifier for a pipeline node.
    NodeId
);

define_id!(
    /// Unique identifier for a prompt template.
    PromptId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_trims_and_accepts() {
        let id = WorkflowId::new("  wf-001  ").expect("should accept");
        assert_eq!(id.as_str(), "wf-001");
    }

    #[test]
    fn new_rejects_empty() {
        assert!(WorkflowId::new("").is_none());
        assert!(WorkflowId::new("   ").is_none());
    }

    #[test]
    fn parse_invalid_id() {
        let result: Result<NodeId, _> = "".parse();
        let err = result.unwrap_err();
        assert_eq!(err.id_type, "NodeId");
    }

    #[test]
    fn id_equality_and_hash() {
        use std::collections::HashSet;

        let a = NodeId::new("n1").unwrap();
        let b = NodeId::new("n1").unwrap();
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        set.insert(b);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn id_serde_roundtrip() {
        let id = WorkflowId::new("wf-passport").unwrap();
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, "\"wf-passport\"");
        let parsed: WorkflowId = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(id, parsed);
    }
}
