//! The workflow draft model and its normalization rules.
//!
//! A draft is an ordered sequence of pipeline nodes with per-node prompt
//! bindings. Normalization enforces the structural invariants before any
//! payload reaches the wire:
//!
//! - node ids are unique, first occurrence wins
//! - every prompt binding refers to a node present in the sequence;
//!   bindings for removed nodes are pruned, not retained
//! - `retry_limit` is clamped to 0..=5

use amber_relay_core::{NodeId, PromptId, WorkflowId, WorkflowStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::DraftError;

/// Upper bound for [`Strategy::retry_limit`].
pub const MAX_RETRY_LIMIT: u32 = 5;

/// Execution strategy attached to a draft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Strategy {
    /// Retry attempts per node, 0..=5.
    pub retry_limit: u32,
    /// Per-run timeout in milliseconds; 0 disables the timeout.
    pub timeout_ms: u64,
}

impl Default for Strategy {
    fn default() -> Self {
        Self {
            retry_limit: 2,
            timeout_ms: 0,
        }
    }
}

/// Binds a prompt template to a node of the sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptBinding {
    pub node_id: NodeId,
    #[serde(default)]
    pub prompt_id: Option<PromptId>,
}

/// Free-form descriptive metadata.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DraftMetadata {
    pub description: String,
    pub tags: Vec<String>,
}

/// Delivery mode of the bound channel, mirrored into coverage runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    #[default]
    Webhook,
    Polling,
}

/// Aggregate status of the latest coverage run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverageStatus {
    #[default]
    Unknown,
    Pending,
    Yellow,
    Green,
    Red,
}

/// Snapshot of the server-side coverage test state for a workflow.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CoverageSnapshot {
    pub status: CoverageStatus,
    pub updated_at: Option<DateTime<Utc>>,
    pub scenarios: Vec<String>,
    pub mode: DeliveryMode,
    pub last_error: Option<String>,
}

/// One entry of a workflow's publish history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionRecord {
    pub version: u32,
    #[serde(default)]
    pub status: WorkflowStatus,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// A workflow draft as edited in the console.
///
/// `id` is `None` for a draft that has never been persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkflowDraft {
    pub id: Option<WorkflowId>,
    pub name: String,
    pub status: WorkflowStatus,
    pub version: u32,
    pub node_sequence: Vec<NodeId>,
    pub prompt_bindings: Vec<PromptBinding>,
    pub strategy: Strategy,
    pub metadata: DraftMetadata,
    pub history: Vec<VersionRecord>,
    pub test_coverage: CoverageSnapshot,
}

impl Default for WorkflowDraft {
    fn default() -> Self {
        Self {
            id: None,
            name: String::new(),
            status: WorkflowStatus::Draft,
            version: 0,
            node_sequence: Vec::new(),
            prompt_bindings: Vec::new(),
            strategy: Strategy::default(),
            metadata: DraftMetadata::default(),
            history: Vec::new(),
            test_coverage: CoverageSnapshot::default(),
        }
    }
}

impl WorkflowDraft {
    /// A blank in-memory draft, the state after "new workflow".
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// A draft is publishable only with a non-empty node sequence.
    #[must_use]
    pub fn is_publishable(&self) -> bool {
        !self.node_sequence.is_empty()
    }

    /// Appends a node to the sequence, ignoring duplicates.
    pub fn add_node(&mut self, node_id: NodeId) {
        if !self.node_sequence.contains(&node_id) {
            self.node_sequence.push(node_id);
        }
    }

    /// Removes a node and prunes its prompt binding.
    ///
    /// Re-adding the same node id later starts with no binding; the old
    /// binding is not resurrected.
    pub fn remove_node(&mut self, node_id: &NodeId) {
        self.node_sequence.retain(|id| id != node_id);
        self.prompt_bindings.retain(|b| &b.node_id != node_id);
    }

    /// Binds (or rebinds) a prompt to a node of the sequence.
    ///
    /// Ignored when the node is not part of the sequence.
    pub fn bind_prompt(&mut self, node_id: NodeId, prompt_id: Option<PromptId>) {
        if !self.node_sequence.contains(&node_id) {
            return;
        }
        if let Some(existing) = self
            .prompt_bindings
            .iter_mut()
            .find(|b| b.node_id == node_id)
        {
            existing.prompt_id = prompt_id;
        } else {
            self.prompt_bindings.push(PromptBinding { node_id, prompt_id });
        }
    }
}

/// Normalizes a draft into canonical form.
///
/// Idempotent: normalizing an already-normalized draft changes nothing.
#[must_use]
pub fn normalize(mut draft: WorkflowDraft) -> WorkflowDraft {
    let mut seen = HashSet::new();
    draft.node_sequence.retain(|id| seen.insert(id.clone()));

    let node_set: HashSet<&NodeId> = draft.node_sequence.iter().collect();
    let mut bound = HashSet::new();
    draft
        .prompt_bindings
        .retain(|b| node_set.contains(&b.node_id) && bound.insert(b.node_id.clone()));

    draft.strategy.retry_limit = draft.strategy.retry_limit.min(MAX_RETRY_LIMIT);
    draft.name = draft.name.trim().to_string();
    draft
}

/// The wire body for create/update requests.
///
/// Server-computed fields (id, version, history, coverage) are never sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowPayload {
    pub name: String,
    pub status: WorkflowStatus,
    pub node_sequence: Vec<NodeId>,
    pub prompt_bindings: Vec<PromptBinding>,
    pub strategy: Strategy,
    pub metadata: DraftMetadata,
}

/// Builds the create/update payload from a draft.
///
/// Fails with [`DraftError::NodeSequenceRequired`] when the normalized node
/// sequence is empty; this check runs before any network call.
pub fn build_payload(draft: &WorkflowDraft) -> Result<WorkflowPayload, DraftError> {
    let normalized = normalize(draft.clone());
    if normalized.node_sequence.is_empty() {
        return Err(DraftError::NodeSequenceRequired);
    }
    Ok(WorkflowPayload {
        name: normalized.name,
        status: normalized.status,
        node_sequence: normalized.node_sequence,
        prompt_bindings: normalized.prompt_bindings,
        strategy: normalized.strategy,
        metadata: normalized.metadata,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str) -> NodeId {
        NodeId::new(id).unwrap()
    }

    fn prompt(id: &str) -> PromptId {
        PromptId::new(id).unwrap()
    }

    #[test]
    fn normalize_dedupes_nodes_keeping_first() {
        let draft = WorkflowDraft {
            node_sequence: vec![node("n1"), node("n2"), node("n1")],
            ..WorkflowDraft::empty()
        };
        let normalized = normalize(draft);
        assert_eq!(normalized.node_sequence, vec![node("n1"), node("n2")]);
    }

    #[test]
    fn normalize_prunes_bindings_for_missing_nodes() {
        let draft = WorkflowDraft {
            node_sequence: vec![node("n1")],
            prompt_bindings: vec![
                PromptBinding {
                    node_id: node("n1"),
                    prompt_id: Some(prompt("p1")),
                },
                PromptBinding {
                    node_id: node("gone"),
                    prompt_id: Some(prompt("p2")),
                },
            ],
            ..WorkflowDraft::empty()
        };
        let normalized = normalize(draft);
        assert_eq!(normalized.prompt_bindings.len(), 1);
        assert_eq!(normalized.prompt_bindings[0].node_id, node("n1"));
    }

    #[test]
    fn normalize_clamps_retry_limit() {
        let draft = WorkflowDraft {
            strategy: Strategy {
                retry_limit: 9,
                timeout_ms: 1000,
            },
            ..WorkflowDraft::empty()
        };
        assert_eq!(normalize(draft).strategy.retry_limit, MAX_RETRY_LIMIT);
    }

    #[test]
    fn normalize_is_idempotent() {
        let draft = WorkflowDraft {
            name: "  passport flow  ".to_string(),
            node_sequence: vec![node("n1"), node("n1"), node("n2")],
            prompt_bindings: vec![PromptBinding {
                node_id: node("n2"),
                prompt_id: None,
            }],
            strategy: Strategy {
                retry_limit: 7,
                timeout_ms: 0,
            },
            ..WorkflowDraft::empty()
        };
        let once = normalize(draft);
        let twice = normalize(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn build_payload_matches_normalized_draft() {
        let draft = normalize(WorkflowDraft {
            name: "flow".to_string(),
            node_sequence: vec![node("n1"), node("n2")],
            prompt_bindings: vec![PromptBinding {
                node_id: node("n1"),
                prompt_id: Some(prompt("p1")),
            }],
            ..WorkflowDraft::empty()
        });
        let payload = build_payload(&draft).expect("should build");
        assert_eq!(payload.name, draft.name);
        assert_eq!(payload.node_sequence, draft.node_sequence);
        assert_eq!(payload.prompt_bindings, draft.prompt_bindings);
        assert_eq!(payload.strategy, draft.strategy);
        assert_eq!(payload.metadata, draft.metadata);
    }

    #[test]
    fn build_payload_rejects_empty_sequence() {
        let err = build_payload(&WorkflowDraft::empty()).unwrap_err();
        assert_eq!(err, DraftError::NodeSequenceRequired);
    }

    #[test]
    fn remove_node_prunes_binding_and_readd_does_not_resurrect() {
        let mut draft = WorkflowDraft::empty();
        draft.add_node(node("n1"));
        draft.bind_prompt(node("n1"), Some(prompt("p1")));

        draft.remove_node(&node("n1"));
        assert!(draft.prompt_bindings.is_empty());

        draft.add_node(node("n1"));
        assert!(draft.prompt_bindings.is_empty());
    }

    #[test]
    fn bind_prompt_ignores_unknown_node() {
        let mut draft = WorkflowDraft::empty();
        draft.bind_prompt(node("nope"), Some(prompt("p1")));
        assert!(draft.prompt_bindings.is_empty());
    }

    #[test]
    fn draft_deserializes_partial_server_payload() {
        let draft: WorkflowDraft = serde_json::from_str(
            r#"{"id": "wf-1", "name": "flow", "status": "published", "version": 3, "nodeSequence": ["n1"]}"#,
        )
        .expect("deserialize");
        assert_eq!(draft.id.unwrap().as_str(), "wf-1");
        assert_eq!(draft.status, WorkflowStatus::Published);
        assert_eq!(draft.version, 3);
        assert!(draft.history.is_empty());
        assert_eq!(draft.test_coverage.status, CoverageStatus::Unknown);
    }

    #[test]
    fn empty_draft_is_not_publishable() {
        assert!(!WorkflowDraft::empty().is_publishable());
        let mut draft = WorkflowDraft::empty();
        draft.add_node(node("n1"));
        assert!(draft.is_publishable());
    }
}
