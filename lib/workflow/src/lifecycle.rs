//! Draft lifecycle controller.
//!
//! Owns the workflow list, the currently edited draft, and the workspace
//! selection broadcast that every other subsystem observes. Destructive
//! transitions (discarding unsaved edits, publishing over unsaved edits,
//! rolling back) pass through a [`ConfirmGate`] before any network call.

use std::sync::{Arc, Mutex, PoisonError};

use amber_relay_core::{Selection, WorkflowId, WorkflowRef, WorkspaceTab};
use async_trait::async_trait;
use tokio::sync::watch;

use crate::draft::{build_payload, normalize, CoverageSnapshot, WorkflowDraft};
use crate::error::DraftError;
use crate::gateway::{WorkflowGateway, WorkflowSummary};

/// The destructive transitions an operator must confirm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmPrompt {
    /// Leaving the current draft would discard unsaved edits.
    DiscardUnsaved,
    /// Publishing while unsaved edits exist; the published snapshot will
    /// not include them.
    PublishWithUnsaved,
    /// Rolling the workflow back to the named version.
    Rollback { version: u32 },
}

/// Asks the operator to confirm a destructive transition.
#[async_trait]
pub trait ConfirmGate: Send + Sync {
    async fn confirm(&self, prompt: ConfirmPrompt) -> bool;
}

/// A gate that approves everything, for headless use.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysConfirm;

#[async_trait]
impl ConfirmGate for AlwaysConfirm {
    async fn confirm(&self, _prompt: ConfirmPrompt) -> bool {
        true
    }
}

/// In-flight operation flags, one per lifecycle transition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BusyFlags {
    pub list_loading: bool,
    pub detail_loading: bool,
    pub saving: bool,
    pub deleting: bool,
    pub publishing: bool,
    pub rolling_back: bool,
}

/// Catalog entry counts surfaced in the workspace header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CatalogCounts {
    pub variables: usize,
    pub tools: usize,
}

/// Counts of the building blocks the editor has to offer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EditorCatalog {
    /// Pipeline node kinds available for the sequence.
    pub nodes: usize,
    /// Prompt templates available for binding.
    pub prompts: usize,
}

/// The reason editing is disabled for a reported catalog, if any.
///
/// `None` until the catalogs have been reported; an unreported catalog
/// does not block.
fn editing_blocked(catalog: Option<EditorCatalog>) -> Option<String> {
    let catalog = catalog?;
    let message = match (catalog.nodes == 0, catalog.prompts == 0) {
        (false, false) => return None,
        (true, false) => "no pipeline nodes are available; editing is disabled",
        (false, true) => "no prompt templates are available; editing is disabled",
        (true, true) => "no pipeline nodes or prompt templates are available; editing is disabled",
    };
    Some(message.to_string())
}

#[derive(Debug, Default)]
struct LifecycleState {
    workflows: Vec<WorkflowSummary>,
    selected_id: Option<WorkflowId>,
    current: WorkflowDraft,
    busy: BusyFlags,
    error: Option<String>,
    warning: Option<String>,
    draft_dirty: bool,
    channel_dirty: bool,
    catalog: CatalogCounts,
    editor_catalog: Option<EditorCatalog>,
    search: String,
}

/// A read-only view of the controller state for rendering.
#[derive(Debug, Clone)]
pub struct LifecycleSnapshot {
    pub workflows: Vec<WorkflowSummary>,
    pub selected_id: Option<WorkflowId>,
    pub current: WorkflowDraft,
    pub busy: BusyFlags,
    pub error: Option<String>,
    pub warning: Option<String>,
    pub draft_dirty: bool,
    pub channel_dirty: bool,
    pub catalog: CatalogCounts,
}

/// Controller for the draft/publish lifecycle of workflows.
pub struct DraftLifecycle {
    gateway: Arc<dyn WorkflowGateway>,
    confirm: Arc<dyn ConfirmGate>,
    state: Mutex<LifecycleState>,
    selection_tx: watch::Sender<Selection>,
    coverage_tx: watch::Sender<Option<CoverageSnapshot>>,
}

impl DraftLifecycle {
    #[must_use]
    pub fn new(gateway: Arc<dyn WorkflowGateway>, confirm: Arc<dyn ConfirmGate>) -> Arc<Self> {
        let (selection_tx, _) = watch::channel(Selection::default());
        let (coverage_tx, _) = watch::channel(None);
        Arc::new(Self {
            gateway,
            confirm,
            state: Mutex::new(LifecycleState::default()),
            selection_tx,
            coverage_tx,
        })
    }

    /// Subscribes to workspace selection changes.
    #[must_use]
    pub fn subscribe_selection(&self) -> watch::Receiver<Selection> {
        self.selection_tx.subscribe()
    }

    /// Subscribes to coverage snapshot changes of the selected workflow.
    #[must_use]
    pub fn subscribe_coverage(&self) -> watch::Receiver<Option<CoverageSnapshot>> {
        self.coverage_tx.subscribe()
    }

    /// Returns a copy of the current controller state.
    #[must_use]
    pub fn snapshot(&self) -> LifecycleSnapshot {
        let state = self.lock();
        LifecycleSnapshot {
            workflows: state.workflows.clone(),
            selected_id: state.selected_id.clone(),
            current: state.current.clone(),
            busy: state.busy,
            error: state.error.clone(),
            warning: state.warning.clone(),
            draft_dirty: state.draft_dirty,
            channel_dirty: state.channel_dirty,
            catalog: state.catalog,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LifecycleState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn broadcast_from(&self, state: &LifecycleState) {
        let workflow = state.selected_id.clone().map(|id| WorkflowRef {
            id,
            status: state.current.status,
        });
        self.selection_tx.send_modify(|sel| sel.workflow = workflow);
        self.coverage_tx
            .send_replace(if state.selected_id.is_some() {
                Some(state.current.test_coverage.clone())
            } else {
                None
            });
    }

    /// Switches the active workspace tab.
    pub fn set_active_tab(&self, tab: WorkspaceTab) {
        self.selection_tx.send_modify(|sel| sel.tab = tab);
    }

    /// Updates the sidebar search filter.
    pub fn set_search(&self, search: impl Into<String>) {
        self.lock().search = search.into();
    }

    /// The workflow list filtered by the sidebar search, name match,
    /// case-insensitive.
    #[must_use]
    pub fn filtered_workflows(&self) -> Vec<WorkflowSummary> {
        let state = self.lock();
        let needle = state.search.trim().to_lowercase();
        state
            .workflows
            .iter()
            .filter(|w| needle.is_empty() || w.name.to_lowercase().contains(&needle))
            .cloned()
            .collect()
    }

    /// Records the catalog entry counts once the meta loader has them.
    pub fn set_catalog_counts(&self, counts: CatalogCounts) {
        self.lock().catalog = counts;
    }

    /// Records unsaved channel-policy edits so workflow switches prompt
    /// for them too.
    pub fn set_channel_dirty(&self, dirty: bool) {
        self.lock().channel_dirty = dirty;
    }

    /// Reports the available node and prompt catalogs.
    ///
    /// An empty catalog disables every mutating action and resets the
    /// editor to a blank draft until a non-empty catalog is reported.
    pub fn set_editor_catalog(&self, catalog: EditorCatalog) {
        let mut state = self.lock();
        state.editor_catalog = Some(catalog);
        if let Some(reason) = editing_blocked(state.editor_catalog) {
            state.selected_id = None;
            state.current = WorkflowDraft::empty();
            state.draft_dirty = false;
            state.warning = Some(reason);
            self.broadcast_from(&state);
        }
    }

    /// The reason editing is currently disabled, if any.
    #[must_use]
    pub fn editing_guard_message(&self) -> Option<String> {
        editing_blocked(self.lock().editor_catalog)
    }

    /// Returns the reason coverage tests cannot run, if any.
    ///
    /// The message names what is missing: nodes, prompts, or both.
    #[must_use]
    pub fn coverage_guard_message(&self) -> Option<String> {
        let state = self.lock();
        let has_nodes = !state.current.node_sequence.is_empty();
        let has_prompts = state
            .current
            .prompt_bindings
            .iter()
            .any(|b| b.prompt_id.is_some());
        match (has_nodes, has_prompts) {
            (true, true) => None,
            (false, true) => Some("add at least one pipeline node before running tests".to_string()),
            (true, false) => Some("bind at least one prompt before running tests".to_string()),
            (false, false) => Some(
                "add pipeline nodes and bind prompts before running tests".to_string(),
            ),
        }
    }

    /// Applies an edit to the current draft and marks it dirty.
    ///
    /// Rejected while the editor catalog is empty; the guard message lands
    /// in the error slot and the draft is left untouched.
    pub fn edit(&self, apply: impl FnOnce(&mut WorkflowDraft)) {
        let mut state = self.lock();
        if let Some(reason) = editing_blocked(state.editor_catalog) {
            state.error = Some(reason);
            return;
        }
        apply(&mut state.current);
        state.draft_dirty = true;
    }

    /// Reloads the workflow list.
    ///
    /// When nothing is selected yet the first workflow returned is
    /// auto-selected. When the selection no longer exists in the fresh list
    /// the editor falls back to a blank draft.
    pub async fn refresh_list(&self) -> Result<(), DraftError> {
        self.lock().busy.list_loading = true;
        let result = self.gateway.list().await;
        let follow_up = {
            let mut state = self.lock();
            state.busy.list_loading = false;
            match result {
                Ok(workflows) => {
                    state.workflows = workflows;
                    state.error = None;
                    match &state.selected_id {
                        None => state.workflows.first().map(|w| w.id.clone()),
                        Some(selected) => {
                            if state.workflows.iter().any(|w| &w.id == selected) {
                                None
                            } else {
                                state.selected_id = None;
                                state.current = WorkflowDraft::empty();
                                state.draft_dirty = false;
                                self.broadcast_from(&state);
                                None
                            }
                        }
                    }
                }
                Err(err) => {
                    state.error = Some(err.to_string());
                    return Err(err.into());
                }
            }
        };
        if let Some(id) = follow_up {
            self.load_detail(&id).await?;
        }
        Ok(())
    }

    /// Selects a workflow, confirming first when unsaved edits would be
    /// discarded.
    pub async fn select(&self, id: &WorkflowId) -> Result<(), DraftError> {
        {
            let state = self.lock();
            if state.selected_id.as_ref() == Some(id) {
                return Ok(());
            }
            if state.draft_dirty || state.channel_dirty {
                drop(state);
                if !self.confirm.confirm(ConfirmPrompt::DiscardUnsaved).await {
                    return Ok(());
                }
            }
        }
        self.load_detail(id).await
    }

    /// Starts a fresh blank draft, confirming first when unsaved edits
    /// would be discarded.
    pub async fn create_new(&self) -> Result<(), DraftError> {
        let dirty = {
            let state = self.lock();
            if let Some(reason) = editing_blocked(state.editor_catalog) {
                return Err(DraftError::EditingBlocked { reason });
            }
            state.draft_dirty || state.channel_dirty
        };
        if dirty && !self.confirm.confirm(ConfirmPrompt::DiscardUnsaved).await {
            return Ok(());
        }
        let mut state = self.lock();
        state.selected_id = None;
        state.current = WorkflowDraft::empty();
        state.draft_dirty = false;
        state.warning = None;
        self.broadcast_from(&state);
        Ok(())
    }

    async fn load_detail(&self, id: &WorkflowId) -> Result<(), DraftError> {
        self.lock().busy.detail_loading = true;
        let result = self.gateway.get(id).await;
        let mut state = self.lock();
        state.busy.detail_loading = false;
        match result {
            Ok(draft) => {
                state.selected_id = draft.id.clone().or_else(|| Some(id.clone()));
                state.current = normalize(draft);
                state.draft_dirty = false;
                state.error = None;
                self.broadcast_from(&state);
                Ok(())
            }
            Err(err) => {
                state.error = Some(err.to_string());
                Err(err.into())
            }
        }
    }

    /// Persists the current draft, creating or updating as appropriate.
    ///
    /// Validation runs before any network call: an empty node sequence is
    /// rejected locally. A successful save reloads the detail so
    /// server-computed fields (version, history) land in the editor.
    pub async fn save(&self) -> Result<(), DraftError> {
        let (payload, existing_id) = {
            let mut state = self.lock();
            if let Some(reason) = editing_blocked(state.editor_catalog) {
                state.error = Some(reason.clone());
                return Err(DraftError::EditingBlocked { reason });
            }
            let payload = match build_payload(&state.current) {
                Ok(payload) => payload,
                Err(err) => {
                    state.error = Some(err.to_string());
                    return Err(err);
                }
            };
            state.busy.saving = true;
            (payload, state.current.id.clone())
        };

        let result = match &existing_id {
            Some(id) => self.gateway.update(id, &payload).await,
            None => self.gateway.create(&payload).await,
        };

        let follow_up = {
            let mut state = self.lock();
            state.busy.saving = false;
            match result {
                Ok(saved) => {
                    if let Some(summary) = WorkflowSummary::from_draft(&saved) {
                        match state.workflows.iter_mut().find(|w| w.id == summary.id) {
                            Some(slot) => *slot = summary,
                            None => state.workflows.insert(0, summary),
                        }
                    }
                    state.selected_id = saved.id.clone();
                    state.current = normalize(saved);
                    state.draft_dirty = false;
                    state.error = None;
                    self.broadcast_from(&state);
                    state.selected_id.clone()
                }
                Err(err) => {
                    state.error = Some(err.to_string());
                    return Err(err.into());
                }
            }
        };
        if let Some(id) = follow_up {
            self.load_detail(&id).await?;
        }
        Ok(())
    }

    /// Publishes the selected workflow as a new frozen version.
    pub async fn publish(&self, notes: Option<&str>) -> Result<(), DraftError> {
        let id = {
            let state = self.lock();
            if let Some(reason) = editing_blocked(state.editor_catalog) {
                return Err(DraftError::EditingBlocked { reason });
            }
            let id = state.selected_id.clone().ok_or(DraftError::NoSelection)?;
            if !state.current.is_publishable() {
                return Err(DraftError::NodeSequenceRequired);
            }
            if state.draft_dirty {
                drop(state);
                if !self.confirm.confirm(ConfirmPrompt::PublishWithUnsaved).await {
                    return Ok(());
                }
            }
            id
        };

        self.lock().busy.publishing = true;
        let result = self.gateway.publish(&id, notes).await;
        self.apply_version_change(result, |busy| busy.publishing = false)
    }

    /// Rolls the selected workflow back to a previous version.
    pub async fn rollback(&self, version: u32) -> Result<(), DraftError> {
        let id = {
            let state = self.lock();
            if let Some(reason) = editing_blocked(state.editor_catalog) {
                return Err(DraftError::EditingBlocked { reason });
            }
            state.selected_id.clone().ok_or(DraftError::NoSelection)?
        };
        if !self.confirm.confirm(ConfirmPrompt::Rollback { version }).await {
            return Ok(());
        }

        self.lock().busy.rolling_back = true;
        let result = self.gateway.rollback(&id, version).await;
        self.apply_version_change(result, |busy| busy.rolling_back = false)
    }

    fn apply_version_change(
        &self,
        result: Result<WorkflowDraft, amber_relay_api::ApiError>,
        clear_busy: impl FnOnce(&mut BusyFlags),
    ) -> Result<(), DraftError> {
        let mut state = self.lock();
        clear_busy(&mut state.busy);
        match result {
            Ok(updated) => {
                if let Some(summary) = WorkflowSummary::from_draft(&updated) {
                    if let Some(slot) = state.workflows.iter_mut().find(|w| w.id == summary.id) {
                        *slot = summary;
                    }
                }
                state.current = normalize(updated);
                state.draft_dirty = false;
                state.error = None;
                self.broadcast_from(&state);
                Ok(())
            }
            Err(err) => {
                state.error = Some(err.to_string());
                Err(err.into())
            }
        }
    }

    /// Runs the coverage test suite for the selected workflow.
    ///
    /// Blocked until the draft has nodes and at least one bound prompt;
    /// the delivery mode mirrors the bound channel's configuration.
    pub async fn run_coverage_tests(
        &self,
        scenarios: &[String],
        mode: crate::draft::DeliveryMode,
    ) -> Result<CoverageSnapshot, DraftError> {
        if let Some(reason) = self.coverage_guard_message() {
            return Err(DraftError::EditingBlocked { reason });
        }
        let id = self
            .lock()
            .selected_id
            .clone()
            .ok_or(DraftError::NoSelection)?;

        let result = self.gateway.run_coverage_tests(&id, scenarios, mode).await;
        let mut state = self.lock();
        match result {
            Ok(snapshot) => {
                state.current.test_coverage = snapshot.clone();
                state.error = None;
                self.broadcast_from(&state);
                Ok(snapshot)
            }
            Err(err) => {
                state.error = Some(err.to_string());
                Err(err.into())
            }
        }
    }

    /// Deletes the selected workflow.
    ///
    /// Published workflows are never deleted: the attempt sets a warning
    /// and returns without touching the backend.
    pub async fn delete(&self) -> Result<(), DraftError> {
        let id = {
            let mut state = self.lock();
            if let Some(reason) = editing_blocked(state.editor_catalog) {
                return Err(DraftError::EditingBlocked { reason });
            }
            let id = state.selected_id.clone().ok_or(DraftError::NoSelection)?;
            if state.current.status.is_published() {
                state.warning =
                    Some("published workflows cannot be deleted; roll back first".to_string());
                return Ok(());
            }
            state.busy.deleting = true;
            id
        };

        let result = self.gateway.delete(&id).await;
        let follow_up = {
            let mut state = self.lock();
            state.busy.deleting = false;
            match result {
                Ok(()) => {
                    state.workflows.retain(|w| w.id != id);
                    state.selected_id = None;
                    state.current = WorkflowDraft::empty();
                    state.draft_dirty = false;
                    state.error = None;
                    let next = state.workflows.first().map(|w| w.id.clone());
                    if next.is_none() {
                        self.broadcast_from(&state);
                    }
                    next
                }
                Err(err) => {
                    state.error = Some(err.to_string());
                    return Err(err.into());
                }
            }
        };
        if let Some(next) = follow_up {
            self.load_detail(&next).await?;
        }
        Ok(())
    }
}
