//! Channel health polling with exponential backoff.
//!
//! Polls the channel health endpoint on an interval that doubles after
//! each consecutive failure, capped at [`HealthConfig::max_interval`].
//! After [`HealthConfig::max_failures`] consecutive failures the scheduler
//! pauses; a manual refresh polls immediately and, on success, resumes the
//! schedule. Scheduled polls are silent; only manual refreshes raise the
//! `checking` flag.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use amber_relay_api::ApiError;
use amber_relay_core::WorkflowId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Polling cadence and failure tolerance.
#[derive(Debug, Clone, Copy)]
pub struct HealthConfig {
    pub base_interval: Duration,
    pub max_interval: Duration,
    pub max_failures: u32,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            base_interval: Duration::from_millis(30_000),
            max_interval: Duration::from_millis(120_000),
            max_failures: 3,
        }
    }
}

/// Reported status of the channel link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Up,
    Degraded,
    Down,
    #[default]
    Unknown,
}

/// One health endpoint response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    #[serde(default)]
    pub status: HealthStatus,
    #[serde(default)]
    pub latency_ms: Option<u64>,
    #[serde(default)]
    pub metrics: Option<Value>,
    #[serde(default)]
    pub checked_at: Option<DateTime<Utc>>,
}

/// Fetches one health report.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn probe(
        &self,
        workflow_id: &WorkflowId,
        include_metrics: bool,
    ) -> Result<HealthReport, ApiError>;
}

/// Callbacks fired as the scheduler transitions. All methods are no-ops
/// by default so observers implement only what they care about.
pub trait HealthObserver: Send + Sync {
    /// A poll returned a report.
    fn on_report(&self, _report: &HealthReport) {}
    /// A poll failed; `failure_count` includes this failure.
    fn on_failure(&self, _failure_count: u32) {}
    /// The scheduler gave up polling until the next manual refresh.
    fn on_pause(&self) {}
}

/// Observable scheduler state.
#[derive(Debug, Clone, Default)]
pub struct HealthState {
    pub status: HealthStatus,
    pub report: Option<HealthReport>,
    pub failure_count: u32,
    pub paused: bool,
    /// True only while a manual refresh is in flight.
    pub checking: bool,
    pub last_error: Option<String>,
}

/// The delay before the next scheduled poll: base for a clean slate,
/// doubled per consecutive failure, capped at the max.
#[must_use]
pub fn next_interval(config: &HealthConfig, failure_count: u32) -> Duration {
    if failure_count == 0 {
        return config.base_interval;
    }
    let factor = 2u32.saturating_pow(failure_count.saturating_sub(1));
    config
        .base_interval
        .saturating_mul(factor)
        .min(config.max_interval)
}

enum Command {
    Refresh,
}

/// Handle to the spawned polling task for one workflow's channel.
pub struct HealthScheduler {
    state: Arc<Mutex<HealthState>>,
    commands: mpsc::Sender<Command>,
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl HealthScheduler {
    /// Spawns the poller. The first poll fires immediately.
    #[must_use]
    pub fn spawn(
        probe: Arc<dyn HealthProbe>,
        workflow_id: WorkflowId,
        include_metrics: bool,
        config: HealthConfig,
    ) -> Self {
        Self::spawn_with_observer(probe, workflow_id, include_metrics, config, None)
    }

    /// Like [`spawn`](Self::spawn), with transition callbacks.
    #[must_use]
    pub fn spawn_with_observer(
        probe: Arc<dyn HealthProbe>,
        workflow_id: WorkflowId,
        include_metrics: bool,
        config: HealthConfig,
        observer: Option<Arc<dyn HealthObserver>>,
    ) -> Self {
        let state = Arc::new(Mutex::new(HealthState::default()));
        let token = CancellationToken::new();
        let (commands, mut command_rx) = mpsc::channel(8);

        let task_state = Arc::clone(&state);
        let task_token = token.clone();
        let task = tokio::spawn(async move {
            let poll = Poll {
                probe,
                workflow_id,
                include_metrics,
                config,
                state: task_state,
                observer,
            };
            poll.once(false).await;
            loop {
                let (paused, failure_count) = {
                    let s = lock(&poll.state);
                    (s.paused, s.failure_count)
                };
                let delay = next_interval(&poll.config, failure_count);
                tokio::select! {
                    _ = task_token.cancelled() => break,
                    command = command_rx.recv() => match command {
                        Some(Command::Refresh) => poll.once(true).await,
                        None => break,
                    },
                    _ = tokio::time::sleep(delay), if !paused => poll.once(false).await,
                }
            }
        });

        Self {
            state,
            commands,
            token,
            task,
        }
    }

    /// Polls immediately, resuming a paused schedule on success.
    pub async fn refresh(&self) {
        let _ = self.commands.send(Command::Refresh).await;
    }

    /// Returns a copy of the scheduler state.
    #[must_use]
    pub fn state(&self) -> HealthState {
        lock(&self.state).clone()
    }

    /// Stops the polling task.
    pub async fn shutdown(self) {
        self.token.cancel();
        let _ = self.task.await;
    }
}

fn lock(state: &Arc<Mutex<HealthState>>) -> std::sync::MutexGuard<'_, HealthState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Poll {
    probe: Arc<dyn HealthProbe>,
    workflow_id: WorkflowId,
    include_metrics: bool,
    config: HealthConfig,
    state: Arc<Mutex<HealthState>>,
    observer: Option<Arc<dyn HealthObserver>>,
}

impl Poll {
    async fn once(&self, manual: bool) {
        if manual {
            lock(&self.state).checking = true;
        }
        let result = self.probe.probe(&self.workflow_id, self.include_metrics).await;
        let mut s = lock(&self.state);
        s.checking = false;
        match result {
            Ok(report) => {
                s.status = report.status;
                s.failure_count = 0;
                s.paused = false;
                s.last_error = None;
                if let Some(observer) = &self.observer {
                    observer.on_report(&report);
                }
                s.report = Some(report);
            }
            Err(err) => {
                s.failure_count += 1;
                s.last_error = Some(err.to_string());
                if let Some(observer) = &self.observer {
                    observer.on_failure(s.failure_count);
                }
                if s.failure_count >= self.config.max_failures {
                    if !s.paused {
                        tracing::warn!(
                            workflow = %self.workflow_id,
                            failures = s.failure_count,
                            "health polling paused after repeated failures"
                        );
                        if let Some(observer) = &self.observer {
                            observer.on_pause();
                        }
                    }
                    s.paused = true;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct ScriptedProbe {
        calls: AtomicUsize,
        healthy: AtomicBool,
    }

    impl ScriptedProbe {
        fn failing() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                healthy: AtomicBool::new(false),
            })
        }

        fn healthy() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                healthy: AtomicBool::new(true),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl HealthProbe for ScriptedProbe {
        async fn probe(
            &self,
            _workflow_id: &WorkflowId,
            _include_metrics: bool,
        ) -> Result<HealthReport, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.healthy.load(Ordering::SeqCst) {
                Ok(HealthReport {
                    status: HealthStatus::Up,
                    latency_ms: Some(40),
                    metrics: None,
                    checked_at: None,
                })
            } else {
                Err(ApiError::Status {
                    status: 503,
                    message: "health endpoint unavailable".to_string(),
                })
            }
        }
    }

    fn wf() -> WorkflowId {
        WorkflowId::new("wf-1").unwrap()
    }

    #[test]
    fn interval_doubles_per_failure_and_caps() {
        let config = HealthConfig::default();
        assert_eq!(next_interval(&config, 0), Duration::from_millis(30_000));
        assert_eq!(next_interval(&config, 1), Duration::from_millis(30_000));
        assert_eq!(next_interval(&config, 2), Duration::from_millis(60_000));
        assert_eq!(next_interval(&config, 3), Duration::from_millis(120_000));
        assert_eq!(next_interval(&config, 4), Duration::from_millis(120_000));
    }

    #[tokio::test(start_paused = true)]
    async fn pauses_after_max_failures_and_never_fires_again() {
        let probe = ScriptedProbe::failing();
        let scheduler = HealthScheduler::spawn(
            Arc::clone(&probe) as _,
            wf(),
            false,
            HealthConfig::default(),
        );

        // immediate poll, then backed-off polls at +30s and +60s
        tokio::time::sleep(Duration::from_secs(100)).await;
        assert_eq!(probe.calls(), 3);
        let state = scheduler.state();
        assert!(state.paused);
        assert_eq!(state.failure_count, 3);

        // paused: no fourth scheduled poll, however long we wait
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(probe.calls(), 3);
        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn manual_refresh_resumes_paused_schedule() {
        let probe = ScriptedProbe::failing();
        let scheduler = HealthScheduler::spawn(
            Arc::clone(&probe) as _,
            wf(),
            false,
            HealthConfig::default(),
        );
        tokio::time::sleep(Duration::from_secs(100)).await;
        assert!(scheduler.state().paused);

        probe.healthy.store(true, Ordering::SeqCst);
        scheduler.refresh().await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        let state = scheduler.state();
        assert!(!state.paused);
        assert_eq!(state.failure_count, 0);
        assert_eq!(state.status, HealthStatus::Up);

        // schedule resumed at the base interval
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(probe.calls(), 5);
        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn success_resets_failure_backoff() {
        let probe = ScriptedProbe::failing();
        let scheduler = HealthScheduler::spawn(
            Arc::clone(&probe) as _,
            wf(),
            false,
            HealthConfig::default(),
        );

        // one failure at t=0, next poll at +30s
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(scheduler.state().failure_count, 1);

        probe.healthy.store(true, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(30)).await;
        let state = scheduler.state();
        assert_eq!(state.failure_count, 0);
        assert_eq!(state.status, HealthStatus::Up);
        assert!(state.last_error.is_none());
        scheduler.shutdown().await;
    }

    #[derive(Default)]
    struct RecordingObserver {
        reports: AtomicUsize,
        failures: AtomicUsize,
        pauses: AtomicUsize,
    }

    impl HealthObserver for RecordingObserver {
        fn on_report(&self, _report: &HealthReport) {
            self.reports.fetch_add(1, Ordering::SeqCst);
        }
        fn on_failure(&self, _failure_count: u32) {
            self.failures.fetch_add(1, Ordering::SeqCst);
        }
        fn on_pause(&self) {
            self.pauses.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn observer_sees_failures_and_a_single_pause() {
        let probe = ScriptedProbe::failing();
        let observer = Arc::new(RecordingObserver::default());
        let scheduler = HealthScheduler::spawn_with_observer(
            Arc::clone(&probe) as _,
            wf(),
            false,
            HealthConfig::default(),
            Some(Arc::clone(&observer) as _),
        );
        tokio::time::sleep(Duration::from_secs(100)).await;
        assert_eq!(observer.failures.load(Ordering::SeqCst), 3);
        assert_eq!(observer.pauses.load(Ordering::SeqCst), 1);

        probe.healthy.store(true, Ordering::SeqCst);
        scheduler.refresh().await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(observer.reports.load(Ordering::SeqCst), 1);
        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn scheduled_polls_are_silent() {
        let probe = ScriptedProbe::healthy();
        let scheduler = HealthScheduler::spawn(
            Arc::clone(&probe) as _,
            wf(),
            false,
            HealthConfig::default(),
        );
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!scheduler.state().checking);
        scheduler.shutdown().await;
    }
}
