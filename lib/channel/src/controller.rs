//! Channel policy controller.
//!
//! Watches the workspace selection: entering the channel tab for a
//! selected workflow loads its policy (once per workflow) and starts the
//! health poller; leaving the tab stops the poller. Saving runs
//! client-side validation and the security gate before any write.

use std::sync::{Arc, Mutex, PoisonError};

use amber_relay_api::{unwrap_data, ApiClient, ApiError};
use amber_relay_core::{Selection, WorkflowId, WorkspaceTab};
use amber_relay_workflow::{CoverageSnapshot, DeliveryMode, DraftLifecycle};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use ulid::Ulid;

use crate::error::ChannelError;
use crate::health::{HealthConfig, HealthProbe, HealthReport, HealthScheduler, HealthState};
use crate::policy::{
    from_wire, to_wire, validate, validate_test_message, ChannelPolicy, PolicyForm,
};
use crate::security::{requires_retest, SecuritySnapshot};
use crate::throttle::{TestRecord, ThrottleLedger};

/// Result of one test send.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TestOutcome {
    pub ok: bool,
    pub message_id: Option<String>,
    pub description: Option<String>,
}

/// Request body of the security validation endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityProbeRequest {
    pub workflow_id: WorkflowId,
    pub secret_token: String,
    pub certificate: Option<String>,
    pub webhook_url: String,
}

/// Request body of the test send endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestSendRequest {
    pub workflow_id: WorkflowId,
    /// Chat the test message is delivered to.
    pub chat_id: String,
    pub payload_text: String,
    /// Mirrors the policy's acknowledgement setting.
    pub wait_for_result: bool,
    /// Fresh ULID per attempt, for correlating the delivery report.
    pub correlation_id: String,
}

/// Backend operations on the Telegram channel binding.
#[async_trait]
pub trait ChannelGateway: Send + Sync {
    /// Loads the policy bound to a workflow; `None` when unbound.
    async fn load(&self, workflow_id: &WorkflowId) -> Result<Option<ChannelPolicy>, ApiError>;

    /// Persists the policy and returns the stored version.
    async fn save(
        &self,
        workflow_id: &WorkflowId,
        policy: &ChannelPolicy,
    ) -> Result<ChannelPolicy, ApiError>;

    /// Unbinds the channel from a workflow.
    async fn remove(&self, workflow_id: &WorkflowId) -> Result<(), ApiError>;

    /// Fetches one health report.
    async fn health(
        &self,
        workflow_id: &WorkflowId,
        include_metrics: bool,
    ) -> Result<HealthReport, ApiError>;

    /// Sends a test message through the channel.
    async fn send_test(&self, request: &TestSendRequest) -> Result<TestOutcome, ApiError>;

    /// Validates secret uniqueness and certificate health.
    async fn validate_security(
        &self,
        request: &SecurityProbeRequest,
    ) -> Result<SecuritySnapshot, ApiError>;
}

/// [`ChannelGateway`] over the console backend HTTP API.
#[derive(Debug, Clone)]
pub struct HttpChannelGateway {
    client: ApiClient,
}

impl HttpChannelGateway {
    #[must_use]
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    fn decode<T: serde::de::DeserializeOwned>(
        body: Option<serde_json::Value>,
    ) -> Result<T, ApiError> {
        let data = unwrap_data(body.unwrap_or(serde_json::Value::Null));
        serde_json::from_value(data).map_err(|e| ApiError::Decode {
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl ChannelGateway for HttpChannelGateway {
    async fn load(&self, workflow_id: &WorkflowId) -> Result<Option<ChannelPolicy>, ApiError> {
        let result = self
            .client
            .get_json(
                &format!("/api/workflow-channels/{workflow_id}"),
                &[("channel", "telegram".to_string())],
            )
            .await;
        match result {
            Ok(body) => Ok(body.map(|b| from_wire(&unwrap_data(b)))),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn save(
        &self,
        workflow_id: &WorkflowId,
        policy: &ChannelPolicy,
    ) -> Result<ChannelPolicy, ApiError> {
        let body = self
            .client
            .put_json(
                &format!("/api/workflow-channels/{workflow_id}"),
                &to_wire(policy),
            )
            .await?;
        Ok(from_wire(&unwrap_data(body.unwrap_or(serde_json::Value::Null))))
    }

    async fn remove(&self, workflow_id: &WorkflowId) -> Result<(), ApiError> {
        self.client
            .delete(
                &format!("/api/workflow-channels/{workflow_id}"),
                &[("channel", "telegram".to_string())],
            )
            .await
    }

    async fn health(
        &self,
        workflow_id: &WorkflowId,
        include_metrics: bool,
    ) -> Result<HealthReport, ApiError> {
        let body = self
            .client
            .get_json(
                "/api/channels/telegram/health",
                &[
                    ("workflowId", workflow_id.to_string()),
                    ("includeMetrics", include_metrics.to_string()),
                ],
            )
            .await?;
        Self::decode(body)
    }

    async fn send_test(&self, request: &TestSendRequest) -> Result<TestOutcome, ApiError> {
        let body = self
            .client
            .post_json("/api/channels/telegram/test", request)
            .await?;
        Self::decode(body)
    }

    async fn validate_security(
        &self,
        request: &SecurityProbeRequest,
    ) -> Result<SecuritySnapshot, ApiError> {
        let body = self
            .client
            .post_json("/api/channels/telegram/security/validate", request)
            .await?;
        Self::decode(body)
    }
}

/// Adapts the gateway's health call to the scheduler's probe seam.
struct GatewayProbe(Arc<dyn ChannelGateway>);

#[async_trait]
impl HealthProbe for GatewayProbe {
    async fn probe(
        &self,
        workflow_id: &WorkflowId,
        include_metrics: bool,
    ) -> Result<HealthReport, ApiError> {
        self.0.health(workflow_id, include_metrics).await
    }
}

#[derive(Debug, Default)]
struct ChannelState {
    form: PolicyForm,
    loaded_for: Option<WorkflowId>,
    throttle: ThrottleLedger,
    security: Option<SecuritySnapshot>,
    loading: bool,
    saving: bool,
    testing: bool,
    error: Option<String>,
}

/// A read-only view of the controller state for rendering.
#[derive(Debug, Clone)]
pub struct ChannelSnapshot {
    pub form: PolicyForm,
    pub loaded_for: Option<WorkflowId>,
    pub history: Vec<TestRecord>,
    pub security: Option<SecuritySnapshot>,
    pub loading: bool,
    pub saving: bool,
    pub testing: bool,
    pub error: Option<String>,
}

/// Controller for the Telegram channel binding of the selected workflow.
pub struct ChannelPolicyController {
    gateway: Arc<dyn ChannelGateway>,
    lifecycle: Arc<DraftLifecycle>,
    state: Mutex<ChannelState>,
    health: tokio::sync::Mutex<Option<(WorkflowId, HealthScheduler)>>,
    health_config: HealthConfig,
    include_metrics: bool,
}

impl ChannelPolicyController {
    #[must_use]
    pub fn new(
        gateway: Arc<dyn ChannelGateway>,
        lifecycle: Arc<DraftLifecycle>,
        health_config: HealthConfig,
        include_metrics: bool,
    ) -> Arc<Self> {
        Arc::new(Self {
            gateway,
            lifecycle,
            state: Mutex::new(ChannelState::default()),
            health: tokio::sync::Mutex::new(None),
            health_config,
            include_metrics,
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ChannelState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns a copy of the controller state.
    #[must_use]
    pub fn snapshot(&self) -> ChannelSnapshot {
        let state = self.lock();
        ChannelSnapshot {
            form: state.form.clone(),
            loaded_for: state.loaded_for.clone(),
            history: state.throttle.history().to_vec(),
            security: state.security.clone(),
            loading: state.loading,
            saving: state.saving,
            testing: state.testing,
            error: state.error.clone(),
        }
    }

    /// The latest health scheduler state, if polling is active.
    pub async fn health_state(&self) -> Option<HealthState> {
        self.health
            .lock()
            .await
            .as_ref()
            .map(|(_, scheduler)| scheduler.state())
    }

    /// Polls channel health immediately, resuming a paused schedule.
    pub async fn refresh_health(&self) {
        if let Some((_, scheduler)) = self.health.lock().await.as_ref() {
            scheduler.refresh().await;
        }
    }

    /// Applies an edit to the policy form.
    ///
    /// The dirty flag is mirrored into the lifecycle so workflow switches
    /// prompt for unsaved channel edits as well.
    pub fn edit(&self, apply: impl FnOnce(&mut PolicyForm)) {
        let dirty = {
            let mut state = self.lock();
            apply(&mut state.form);
            state.form.dirty
        };
        self.lifecycle.set_channel_dirty(dirty);
    }

    /// Loads the policy for a workflow unless it is already loaded.
    ///
    /// An unbound workflow settles the form on the default policy.
    pub async fn ensure_loaded(&self, workflow_id: &WorkflowId) -> Result<(), ChannelError> {
        {
            let mut state = self.lock();
            if state.loaded_for.as_ref() == Some(workflow_id) {
                return Ok(());
            }
            state.loading = true;
        }
        let result = self.gateway.load(workflow_id).await;
        {
            let mut state = self.lock();
            state.loading = false;
            match result {
                Ok(policy) => {
                    state.form.settle(policy.unwrap_or_default());
                    state.loaded_for = Some(workflow_id.clone());
                    state.security = None;
                    state.error = None;
                }
                Err(err) => {
                    state.error = Some(err.to_string());
                    return Err(err.into());
                }
            }
        }
        self.lifecycle.set_channel_dirty(false);
        Ok(())
    }

    /// Validates and persists the policy for the loaded workflow.
    ///
    /// Local validation runs first, then the security gate: a reused
    /// secret or an expiring certificate blocks the save. On success
    /// health is re-polled.
    pub async fn save(&self) -> Result<(), ChannelError> {
        let (workflow_id, policy) = {
            let mut state = self.lock();
            let workflow_id = state.loaded_for.clone().ok_or(ChannelError::NoPolicy)?;
            let token_entered = state.form.is_editing_token();
            if let Err(err) = validate(&state.form.policy, token_entered) {
                state.error = Some(err.to_string());
                return Err(err);
            }
            state.saving = true;
            let mut policy = state.form.policy.clone();
            if !token_entered {
                // never echo a stored (masked) token back to the backend
                policy.bot_token.clear();
            }
            (workflow_id, policy)
        };

        let probe = SecurityProbeRequest {
            workflow_id: workflow_id.clone(),
            secret_token: policy.secret_token.clone(),
            certificate: policy.certificate.clone(),
            webhook_url: policy.webhook_url.clone(),
        };
        let security = self.gateway.validate_security(&probe).await;
        {
            let mut state = self.lock();
            match security {
                Ok(snapshot) => {
                    let blocking = snapshot.blocking_message();
                    state.security = Some(snapshot);
                    if let Some(message) = blocking {
                        state.saving = false;
                        state.error = Some(message.clone());
                        return Err(ChannelError::Validation {
                            field: "security",
                            message,
                        });
                    }
                }
                Err(err) => {
                    state.saving = false;
                    state.error = Some(err.to_string());
                    return Err(err.into());
                }
            }
        }

        let result = self.gateway.save(&workflow_id, &policy).await;
        {
            let mut state = self.lock();
            state.saving = false;
            match result {
                Ok(stored) => {
                    state.form.settle(stored);
                    state.error = None;
                }
                Err(err) => {
                    state.error = Some(err.to_string());
                    return Err(err.into());
                }
            }
        }
        self.lifecycle.set_channel_dirty(false);
        self.refresh_health().await;
        Ok(())
    }

    /// Unbinds the channel, resets the form, and stops health polling.
    pub async fn remove(&self) -> Result<(), ChannelError> {
        let workflow_id = self.lock().loaded_for.clone().ok_or(ChannelError::NoPolicy)?;
        let result = self.gateway.remove(&workflow_id).await;
        {
            let mut state = self.lock();
            match result {
                Ok(()) => {
                    state.form.settle(ChannelPolicy::default());
                    state.security = None;
                    state.error = None;
                }
                Err(err) => {
                    state.error = Some(err.to_string());
                    return Err(err.into());
                }
            }
        }
        self.lifecycle.set_channel_dirty(false);
        self.stop_health().await;
        Ok(())
    }

    /// Sends a test message to a chat, subject to the sliding-window
    /// throttle.
    ///
    /// The attempt is recorded at dispatch, success or not.
    pub async fn send_test(
        &self,
        chat_id: &str,
        message: &str,
    ) -> Result<TestOutcome, ChannelError> {
        validate_test_message(message)?;
        let chat_id = chat_id.trim();
        if chat_id.is_empty() {
            return Err(ChannelError::Validation {
                field: "chatId",
                message: "a target chat id is required".to_string(),
            });
        }
        let now_ms = Utc::now().timestamp_millis();
        let request = {
            let mut state = self.lock();
            let workflow_id = state.loaded_for.clone().ok_or(ChannelError::NoPolicy)?;
            if state.throttle.is_throttled(now_ms) {
                return Err(ChannelError::Throttled {
                    retry_after_ms: state.throttle.retry_after_ms(now_ms),
                });
            }
            state.throttle.record_attempt(now_ms);
            state.testing = true;
            TestSendRequest {
                workflow_id,
                chat_id: chat_id.to_string(),
                payload_text: message.trim().to_string(),
                wait_for_result: state.form.policy.wait_for_result,
                correlation_id: Ulid::new().to_string(),
            }
        };

        let result = self.gateway.send_test(&request).await;
        let mut state = self.lock();
        state.testing = false;
        match result {
            Ok(outcome) => {
                state.throttle.record_result(TestRecord {
                    at_ms: now_ms,
                    ok: outcome.ok,
                    message: message.trim().to_string(),
                    detail: outcome.description.clone(),
                });
                Ok(outcome)
            }
            Err(err) => {
                let channel_err = if err.status() == Some(429) {
                    ChannelError::Throttled {
                        retry_after_ms: state.throttle.retry_after_ms(now_ms),
                    }
                } else {
                    ChannelError::Api(err)
                };
                state.throttle.record_result(TestRecord {
                    at_ms: now_ms,
                    ok: false,
                    message: message.trim().to_string(),
                    detail: Some(channel_err.to_string()),
                });
                state.error = Some(channel_err.to_string());
                Err(channel_err)
            }
        }
    }

    /// Runs coverage tests with the delivery mode of the loaded policy.
    pub async fn run_coverage_tests(
        &self,
        scenarios: &[String],
    ) -> Result<CoverageSnapshot, ChannelError> {
        let mode = if self.lock().form.policy.use_polling {
            DeliveryMode::Polling
        } else {
            DeliveryMode::Webhook
        };
        self.lifecycle
            .run_coverage_tests(scenarios, mode)
            .await
            .map_err(|err| ChannelError::Validation {
                field: "coverage",
                message: err.to_string(),
            })
    }

    /// Whether the current policy demands a fresh coverage run.
    #[must_use]
    pub fn requires_retest(&self) -> bool {
        let state = self.lock();
        let coverage = self
            .lifecycle
            .subscribe_coverage()
            .borrow()
            .as_ref()
            .map(|c| c.status)
            .unwrap_or_default();
        requires_retest(state.security.as_ref(), coverage, state.form.policy.secret_version)
    }

    async fn start_health(self: &Arc<Self>, workflow_id: &WorkflowId) {
        let mut health = self.health.lock().await;
        if health.as_ref().is_some_and(|(id, _)| id == workflow_id) {
            return;
        }
        if let Some((_, old)) = health.take() {
            old.shutdown().await;
        }
        let scheduler = HealthScheduler::spawn(
            Arc::new(GatewayProbe(Arc::clone(&self.gateway))),
            workflow_id.clone(),
            self.include_metrics,
            self.health_config,
        );
        *health = Some((workflow_id.clone(), scheduler));
    }

    /// Stops health polling, if running.
    pub async fn stop_health(&self) {
        if let Some((_, scheduler)) = self.health.lock().await.take() {
            scheduler.shutdown().await;
        }
    }

    /// Drops the loaded policy and settles the form on defaults.
    fn reset_policy(&self) {
        {
            let mut state = self.lock();
            state.form.settle(ChannelPolicy::default());
            state.loaded_for = None;
            state.security = None;
        }
        self.lifecycle.set_channel_dirty(false);
    }

    /// Spawns the selection watcher implementing the binding rule: the
    /// channel tab with a selected published workflow loads the policy
    /// and polls health; other tabs keep the policy but stop polling; an
    /// unpublished or missing selection resets the form to defaults.
    /// Drafts have no servable channel yet.
    #[must_use]
    pub fn watch(self: &Arc<Self>, mut selection_rx: watch::Receiver<Selection>) -> ChannelWatch {
        let controller = Arc::clone(self);
        let token = CancellationToken::new();
        let task_token = token.clone();
        let task = tokio::spawn(async move {
            loop {
                let selection = selection_rx.borrow_and_update().clone();
                match selection.workflow_id().filter(|_| selection.is_published()) {
                    Some(id) if selection.tab == WorkspaceTab::Channel => {
                        if let Err(err) = controller.ensure_loaded(id).await {
                            tracing::warn!(workflow = %id, error = %err, "channel policy load failed");
                        }
                        controller.start_health(id).await;
                    }
                    Some(_) => controller.stop_health().await,
                    None => {
                        controller.reset_policy();
                        controller.stop_health().await;
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
        ChannelWatch { token, task }
    }
}

/// Handle to the spawned selection watcher.
pub struct ChannelWatch {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl ChannelWatch {
    /// Stops the watcher task.
    pub async fn shutdown(self) {
        self.token.cancel();
        let _ = self.task.await;
    }
}
