//! Workspace selection model.
//!
//! The pair (selected workflow, active tab) is the single source of truth
//! that every reactive subsystem observes: the channel policy controller,
//! the log stream controller, and the catalog meta loader all react to it,
//! and only the draft lifecycle controller may change it.

use serde::{Deserialize, Serialize};

use crate::id::WorkflowId;

/// Publication status of a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// Freely editable, not yet servable to a channel.
    #[default]
    Draft,
    /// Frozen versioned snapshot servable to the channel.
    Published,
}

impl WorkflowStatus {
    /// Returns true for published workflows.
    #[must_use]
    pub fn is_published(&self) -> bool {
        matches!(self, Self::Published)
    }
}

/// The tabs of the workflow workspace that drive resource lifecycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkspaceTab {
    /// Draft editor.
    #[default]
    Editor,
    /// Channel policy configuration.
    Channel,
    /// Live log stream.
    Logs,
    /// Variables and tools catalog.
    Catalog,
}

/// A lightweight reference to the currently selected workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowRef {
    /// The workflow identifier.
    pub id: WorkflowId,
    /// Its publication status at selection time.
    pub status: WorkflowStatus,
}

/// The observed workspace state: which workflow is selected and which tab
/// is active.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Selection {
    /// The selected workflow, if any.
    pub workflow: Option<WorkflowRef>,
    /// The active workspace tab.
    pub tab: WorkspaceTab,
}

impl Selection {
    /// Returns the selected workflow id, if any.
    #[must_use]
    pub fn workflow_id(&self) -> Option<&WorkflowId> {
        self.workflow.as_ref().map(|w| &w.id)
    }

    /// Returns true when the selected workflow is published.
    #[must_use]
    pub fn is_published(&self) -> bool {
        self.workflow
            .as_ref()
            .is_some_and(|w| w.status.is_published())
    }
}
