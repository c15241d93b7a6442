//! Catalog metadata loader.
//!
//! Watches the workspace selection and fetches the variable and tool
//! catalogs whenever the catalog tab becomes active for a selected
//! workflow. Both catalogs load concurrently with independent loading
//! flags; results feed the lifecycle controller's catalog counts.

use std::sync::{Arc, Mutex, PoisonError};

use amber_relay_core::{Selection, WorkflowId, WorkspaceTab};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::gateway::{CatalogTool, CatalogVariable, WorkflowGateway};
use crate::lifecycle::{CatalogCounts, DraftLifecycle};

/// The loaded catalog contents and their loading flags.
#[derive(Debug, Clone, Default)]
pub struct CatalogState {
    pub variables: Vec<CatalogVariable>,
    pub tools: Vec<CatalogTool>,
    pub variables_loading: bool,
    pub tools_loading: bool,
    pub error: Option<String>,
}

/// Handle to the spawned catalog loader task.
pub struct MetaLoader {
    state: Arc<Mutex<CatalogState>>,
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl MetaLoader {
    /// Spawns the loader against a selection feed.
    ///
    /// When `enabled` is false the loader stays idle; the catalog tab then
    /// simply shows nothing.
    #[must_use]
    pub fn spawn(
        gateway: Arc<dyn WorkflowGateway>,
        lifecycle: Arc<DraftLifecycle>,
        mut selection_rx: watch::Receiver<Selection>,
        enabled: bool,
    ) -> Self {
        let state = Arc::new(Mutex::new(CatalogState::default()));
        let token = CancellationToken::new();

        let task_state = Arc::clone(&state);
        let task_token = token.clone();
        let task = tokio::spawn(async move {
            let mut last_loaded: Option<WorkflowId> = None;
            loop {
                let selection = selection_rx.borrow_and_update().clone();
                if enabled {
                    if let Some(target) = catalog_target(&selection) {
                        if last_loaded.as_ref() != Some(&target) {
                            load_catalog(&gateway, &lifecycle, &task_state, &target).await;
                            last_loaded = Some(target);
                        }
                    }
                }
                tokio::select! {
                    _ = task_token.cancelled() => break,
                    changed = selection_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        Self { state, token, task }
    }

    /// Returns a copy of the loaded catalog state.
    #[must_use]
    pub fn state(&self) -> CatalogState {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Stops the loader task.
    pub async fn shutdown(self) {
        self.token.cancel();
        let _ = self.task.await;
    }
}

fn catalog_target(selection: &Selection) -> Option<WorkflowId> {
    if selection.tab != WorkspaceTab::Catalog {
        return None;
    }
    selection.workflow_id().cloned()
}

async fn load_catalog(
    gateway: &Arc<dyn WorkflowGateway>,
    lifecycle: &Arc<DraftLifecycle>,
    state: &Arc<Mutex<CatalogState>>,
    id: &WorkflowId,
) {
    {
        let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
        state.variables_loading = true;
        state.tools_loading = true;
        state.error = None;
    }

    let (variables, tools) = tokio::join!(gateway.list_variables(id), gateway.list_tools(id));

    let mut guard = state.lock().unwrap_or_else(PoisonError::into_inner);
    guard.variables_loading = false;
    guard.tools_loading = false;
    match variables {
        Ok(variables) => guard.variables = variables,
        Err(err) => {
            tracing::warn!(workflow = %id, error = %err, "variable catalog load failed");
            guard.error = Some(err.to_string());
        }
    }
    match tools {
        Ok(tools) => guard.tools = tools,
        Err(err) => {
            tracing::warn!(workflow = %id, error = %err, "tool catalog load failed");
            guard.error = Some(err.to_string());
        }
    }
    lifecycle.set_catalog_counts(CatalogCounts {
        variables: guard.variables.len(),
        tools: guard.tools.len(),
    });
}
