//! Log panel controller.
//!
//! Streaming is gated on the workspace selection: the logs tab with a
//! selected workflow streams, anything else does not. The operator can
//! pause streaming without leaving the tab; switching workflows clears
//! the ring before the new stream starts.

use std::sync::{Arc, Mutex, PoisonError};

use amber_relay_core::{Selection, WorkflowId, WorkspaceTab};
use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::client::{EventSource, LogStreamClient, LogStreamState};
use crate::ring::{LogEntry, LogRing};

#[derive(Debug, Default)]
struct ControlState {
    paused: bool,
    level_filter: Option<String>,
    last_selection: Selection,
    /// The workflow whose entries the ring currently holds.
    last_streamed: Option<WorkflowId>,
}

/// Controller for the live log panel of the selected workflow.
pub struct LogStreamController {
    source: Arc<dyn EventSource>,
    ring: Arc<Mutex<LogRing>>,
    client: tokio::sync::Mutex<Option<(WorkflowId, LogStreamClient)>>,
    state: Mutex<ControlState>,
    enabled: bool,
}

impl LogStreamController {
    #[must_use]
    pub fn new(source: Arc<dyn EventSource>, enabled: bool) -> Arc<Self> {
        Arc::new(Self {
            source,
            ring: Arc::new(Mutex::new(LogRing::new())),
            client: tokio::sync::Mutex::new(None),
            state: Mutex::new(ControlState::default()),
            enabled,
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ControlState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn allowed_workflow(&self) -> Option<WorkflowId> {
        if !self.enabled {
            return None;
        }
        let state = self.lock();
        if state.paused || state.last_selection.tab != WorkspaceTab::Logs {
            return None;
        }
        state.last_selection.workflow_id().cloned()
    }

    /// Reconciles the running stream with the gating state.
    async fn apply(&self) {
        let target = self.allowed_workflow();
        let mut client = self.client.lock().await;
        match (&target, client.as_ref()) {
            (Some(id), Some((running, _))) if id == running => {}
            (Some(id), _) => {
                if let Some((_, old)) = client.take() {
                    old.shutdown().await;
                }
                // resuming the workflow already in the ring keeps it;
                // only a different workflow starts from scratch
                let fresh_target = {
                    let mut state = self.lock();
                    let fresh = state.last_streamed.as_ref() != Some(id);
                    state.last_streamed = Some(id.clone());
                    fresh
                };
                if fresh_target {
                    self.ring
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .clear();
                    self.backfill(id).await;
                }
                let stream = LogStreamClient::spawn(
                    Arc::clone(&self.source),
                    id.clone(),
                    Arc::clone(&self.ring),
                );
                *client = Some((id.clone(), stream));
            }
            (None, _) => {
                if let Some((_, old)) = client.take() {
                    old.shutdown().await;
                }
            }
        }
    }

    /// Seeds the ring with recent entries before the stream opens.
    /// Failures are non-fatal; the stream still starts.
    async fn backfill(&self, workflow_id: &WorkflowId) {
        match self.source.fetch_recent(workflow_id).await {
            Ok(recent) => {
                let received_at = Utc::now();
                let mut ring = self.ring.lock().unwrap_or_else(PoisonError::into_inner);
                for payload in &recent {
                    ring.push(LogEntry::from_wire(payload, received_at));
                }
            }
            Err(err) => {
                tracing::debug!(workflow = %workflow_id, error = %err, "log backfill failed");
            }
        }
    }

    /// Pauses or resumes streaming without losing the ring.
    pub async fn set_paused(&self, paused: bool) {
        self.lock().paused = paused;
        self.apply().await;
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.lock().paused
    }

    /// Sets the level filter applied by [`entries`](Self::entries).
    pub fn set_level_filter(&self, level: Option<String>) {
        self.lock().level_filter = level.map(|l| l.to_lowercase());
    }

    /// The ring contents under the active level filter, oldest first.
    #[must_use]
    pub fn entries(&self) -> Vec<LogEntry> {
        let filter = self.lock().level_filter.clone();
        self.ring
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries(filter.as_deref())
    }

    /// Plain-text export of the whole ring, unfiltered.
    #[must_use]
    pub fn export_text(&self) -> String {
        self.ring
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .export_text()
    }

    /// Empties the ring.
    pub fn clear(&self) {
        self.ring
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// The running stream's state, if one is active.
    pub async fn stream_state(&self) -> Option<LogStreamState> {
        self.client
            .lock()
            .await
            .as_ref()
            .map(|(_, client)| client.state())
    }

    /// Stops streaming, if active.
    pub async fn stop(&self) {
        if let Some((_, client)) = self.client.lock().await.take() {
            client.shutdown().await;
        }
    }

    /// Spawns the selection watcher enforcing the streaming gate.
    #[must_use]
    pub fn watch(self: &Arc<Self>, mut selection_rx: watch::Receiver<Selection>) -> LogWatch {
        let controller = Arc::clone(self);
        let token = CancellationToken::new();
        let task_token = token.clone();
        let task = tokio::spawn(async move {
            loop {
                let selection = selection_rx.borrow_and_update().clone();
                controller.lock().last_selection = selection;
                controller.apply().await;
                tokio::select! {
                    _ = task_token.cancelled() => break,
                    changed = selection_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
            controller.stop().await;
        });
        LogWatch { token, task }
    }
}

/// Handle to the spawned selection watcher.
pub struct LogWatch {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl LogWatch {
    /// Stops the watcher and the stream it manages.
    pub async fn shutdown(self) {
        self.token.cancel();
        let _ = self.task.await;
    }
}
