//! Live log stream client with reconnection.
//!
//! Opens the SSE endpoint, feeds decoded events into the shared ring, and
//! reconnects after drops. The delay before a reconnect honors the
//! server's retry hint when the handshake was rejected, otherwise the
//! exponential backoff curve. A stream that stays silent past the
//! heartbeat window counts as dead and reconnects.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use amber_relay_api::{unwrap_data, ApiClient};
use amber_relay_core::WorkflowId;
use async_trait::async_trait;
use chrono::Utc;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::StreamError;
use crate::retry::{backoff_delay_ms, parse_retry_after};
use crate::ring::{LogEntry, LogRing};
use crate::sse::SseParser;

/// A connection is considered dead after this much silence. Server
/// heartbeat comments arrive inside this window on a healthy stream.
pub const HEARTBEAT_TIMEOUT_MS: u64 = 15_000;

/// Countdown granularity while waiting to reconnect.
pub const COUNTDOWN_TICK_MS: u64 = 1_000;

/// An open byte stream from the log endpoint.
pub struct EventStreamHandle {
    pub stream: BoxStream<'static, Result<Vec<u8>, StreamError>>,
}

/// Opens log event streams; the seam tests stand in for.
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn open(&self, workflow_id: &WorkflowId) -> Result<EventStreamHandle, StreamError>;

    /// Recent entries to seed the ring with before the stream opens.
    async fn fetch_recent(&self, _workflow_id: &WorkflowId) -> Result<Vec<Value>, StreamError> {
        Ok(Vec::new())
    }
}

/// [`EventSource`] over the console backend.
#[derive(Debug, Clone)]
pub struct HttpEventSource {
    client: ApiClient,
}

impl HttpEventSource {
    #[must_use]
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl EventSource for HttpEventSource {
    async fn open(&self, workflow_id: &WorkflowId) -> Result<EventStreamHandle, StreamError> {
        let response = self
            .client
            .event_stream(&format!("/api/workflows/{workflow_id}/logs/stream"))
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(StreamError::BadStatus {
                status: status.as_u16(),
                retry_after_ms: parse_retry_after(response.headers(), Utc::now()),
            });
        }
        let stream = response
            .bytes_stream()
            .map(|chunk| {
                chunk.map(|b| b.to_vec()).map_err(|e| StreamError::Transport {
                    message: e.to_string(),
                })
            })
            .boxed();
        Ok(EventStreamHandle { stream })
    }

    async fn fetch_recent(&self, workflow_id: &WorkflowId) -> Result<Vec<Value>, StreamError> {
        let body = self
            .client
            .get_json(&format!("/api/workflows/{workflow_id}/logs"), &[])
            .await?;
        let data = unwrap_data(body.unwrap_or(Value::Null));
        Ok(data.as_array().cloned().unwrap_or_default())
    }
}

/// Connection phase, observable for rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPhase {
    Idle,
    Connecting,
    Open,
    /// Waiting to reconnect; `countdown_ms` ticks down once per second.
    Retrying { attempt: u32, countdown_ms: u64 },
    Stopped,
}

/// Observable client state.
#[derive(Debug, Clone)]
pub struct LogStreamState {
    pub phase: StreamPhase,
    pub last_error: Option<String>,
    pub reconnects: u32,
}

impl Default for LogStreamState {
    fn default() -> Self {
        Self {
            phase: StreamPhase::Idle,
            last_error: None,
            reconnects: 0,
        }
    }
}

/// Handle to the spawned stream task for one workflow.
pub struct LogStreamClient {
    state: Arc<Mutex<LogStreamState>>,
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl LogStreamClient {
    /// Spawns the stream loop, appending entries to the shared ring.
    #[must_use]
    pub fn spawn(
        source: Arc<dyn EventSource>,
        workflow_id: WorkflowId,
        ring: Arc<Mutex<LogRing>>,
    ) -> Self {
        let state = Arc::new(Mutex::new(LogStreamState::default()));
        let token = CancellationToken::new();

        let task_state = Arc::clone(&state);
        let task_token = token.clone();
        let task = tokio::spawn(async move {
            run_stream(source, workflow_id, ring, task_state, task_token).await;
        });

        Self { state, token, task }
    }

    /// Returns a copy of the client state.
    #[must_use]
    pub fn state(&self) -> LogStreamState {
        lock(&self.state).clone()
    }

    /// Stops the stream task.
    pub async fn shutdown(self) {
        self.token.cancel();
        let _ = self.task.await;
    }
}

fn lock<T>(mutex: &Arc<Mutex<T>>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn set_phase(state: &Arc<Mutex<LogStreamState>>, phase: StreamPhase) {
    lock(state).phase = phase;
}

async fn run_stream(
    source: Arc<dyn EventSource>,
    workflow_id: WorkflowId,
    ring: Arc<Mutex<LogRing>>,
    state: Arc<Mutex<LogStreamState>>,
    token: CancellationToken,
) {
    let mut attempt: u32 = 0;
    loop {
        if token.is_cancelled() {
            break;
        }
        set_phase(&state, StreamPhase::Connecting);

        let mut retry_hint = None;
        match source.open(&workflow_id).await {
            Ok(handle) => {
                set_phase(&state, StreamPhase::Open);
                let (error, received_any) = read_until_drop(handle, &ring, &token).await;
                if token.is_cancelled() {
                    break;
                }
                // a connection that never delivered anything does not
                // count as recovered, so its backoff keeps growing
                if received_any {
                    attempt = 0;
                }
                tracing::debug!(workflow = %workflow_id, error = %error, "log stream dropped");
                lock(&state).last_error = Some(error.to_string());
            }
            Err(err) => {
                if let StreamError::BadStatus { retry_after_ms, .. } = &err {
                    retry_hint = *retry_after_ms;
                }
                lock(&state).last_error = Some(err.to_string());
            }
        }

        attempt += 1;
        lock(&state).reconnects = attempt;
        let delay_ms = retry_hint.unwrap_or_else(|| backoff_delay_ms(attempt));
        if countdown(&state, &token, attempt, delay_ms).await.is_err() {
            break;
        }
    }
    set_phase(&state, StreamPhase::Stopped);
}

/// Reads the stream until it drops, goes stale, or is cancelled.
/// The boolean reports whether any bytes arrived before the drop.
async fn read_until_drop(
    mut handle: EventStreamHandle,
    ring: &Arc<Mutex<LogRing>>,
    token: &CancellationToken,
) -> (StreamError, bool) {
    let mut parser = SseParser::new();
    let mut received_any = false;
    loop {
        let next = tokio::select! {
            _ = token.cancelled() => return (StreamError::Closed, received_any),
            next = tokio::time::timeout(
                Duration::from_millis(HEARTBEAT_TIMEOUT_MS),
                handle.stream.next(),
            ) => next,
        };
        match next {
            Err(_) => {
                return (
                    StreamError::Transport {
                        message: "no heartbeat within 15s".to_string(),
                    },
                    received_any,
                )
            }
            Ok(None) => return (StreamError::Closed, received_any),
            Ok(Some(Err(err))) => return (err, received_any),
            Ok(Some(Ok(bytes))) => {
                received_any = true;
                let received_at = Utc::now();
                let mut ring = lock(ring);
                for event in parser.push(&bytes) {
                    match serde_json::from_str::<Value>(&event.data) {
                        Ok(payload) => ring.push(LogEntry::from_wire(&payload, received_at)),
                        Err(err) => {
                            // one bad event never tears the stream down
                            tracing::warn!(error = %err, "undecodable log event");
                            ring.push(LogEntry::malformed(&event.data, received_at));
                        }
                    }
                }
            }
        }
    }
}

/// Ticks the retry countdown down to zero; `Err` on cancellation.
async fn countdown(
    state: &Arc<Mutex<LogStreamState>>,
    token: &CancellationToken,
    attempt: u32,
    delay_ms: u64,
) -> Result<(), ()> {
    let mut remaining = delay_ms;
    loop {
        set_phase(
            state,
            StreamPhase::Retrying {
                attempt,
                countdown_ms: remaining,
            },
        );
        if remaining == 0 {
            return Ok(());
        }
        let tick = remaining.min(COUNTDOWN_TICK_MS);
        tokio::select! {
            _ = token.cancelled() => return Err(()),
            _ = tokio::time::sleep(Duration::from_millis(tick)) => remaining -= tick,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::channel::mpsc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedSource {
        opens: AtomicUsize,
        reject_first_with: Option<(u16, Option<u64>)>,
        feeds: Mutex<Vec<mpsc::UnboundedReceiver<Result<Vec<u8>, StreamError>>>>,
    }

    impl ScriptedSource {
        fn new(
            reject_first_with: Option<(u16, Option<u64>)>,
            feeds: Vec<mpsc::UnboundedReceiver<Result<Vec<u8>, StreamError>>>,
        ) -> Arc<Self> {
            Arc::new(Self {
                opens: AtomicUsize::new(0),
                reject_first_with,
                feeds: Mutex::new(feeds),
            })
        }

        fn opens(&self) -> usize {
            self.opens.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl EventSource for ScriptedSource {
        async fn open(&self, _id: &WorkflowId) -> Result<EventStreamHandle, StreamError> {
            let n = self.opens.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                if let Some((status, retry_after_ms)) = self.reject_first_with {
                    return Err(StreamError::BadStatus {
                        status,
                        retry_after_ms,
                    });
                }
            }
            let mut feeds = self.feeds.lock().unwrap();
            if feeds.is_empty() {
                return Err(StreamError::Transport {
                    message: "no more scripted streams".to_string(),
                });
            }
            Ok(EventStreamHandle {
                stream: feeds.remove(0).boxed(),
            })
        }
    }

    fn wf() -> WorkflowId {
        WorkflowId::new("wf-1").unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_handshake_honors_retry_hint_with_ticking_countdown() {
        let (tx, rx) = mpsc::unbounded();
        let source = ScriptedSource::new(Some((429, Some(5_000))), vec![rx]);
        let ring = Arc::new(Mutex::new(LogRing::new()));
        let client = LogStreamClient::spawn(Arc::clone(&source) as _, wf(), Arc::clone(&ring));

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(source.opens(), 1);
        let StreamPhase::Retrying { attempt, countdown_ms } = client.state().phase else {
            panic!("expected retrying phase, got {:?}", client.state().phase);
        };
        assert_eq!(attempt, 1);
        assert_eq!(countdown_ms, 5_000);

        // countdown is monotonic, one tick per second
        let mut last = countdown_ms;
        for _ in 0..4 {
            tokio::time::sleep(Duration::from_millis(1_000)).await;
            if let StreamPhase::Retrying { countdown_ms, .. } = client.state().phase {
                assert!(countdown_ms < last);
                last = countdown_ms;
            }
        }

        tokio::time::sleep(Duration::from_millis(1_100)).await;
        // exactly one reconnect, now held open by the scripted stream
        assert_eq!(source.opens(), 2);
        assert_eq!(client.state().phase, StreamPhase::Open);

        drop(tx);
        client.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn events_are_decoded_into_the_ring() {
        let (tx, rx) = mpsc::unbounded();
        let source = ScriptedSource::new(None, vec![rx]);
        let ring = Arc::new(Mutex::new(LogRing::new()));
        let client = LogStreamClient::spawn(Arc::clone(&source) as _, wf(), Arc::clone(&ring));
        tokio::time::sleep(Duration::from_millis(10)).await;

        tx.unbounded_send(Ok(
            b"data: {\"level\":\"ERROR\",\"message\":\"node failed\"}\n\n".to_vec(),
        ))
        .unwrap();
        tx.unbounded_send(Ok(b": heartbeat\n\n".to_vec())).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let entries = lock(&ring).entries(None);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].level, "error");
        assert_eq!(entries[0].message, "node failed");

        drop(tx);
        client.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn undecodable_event_becomes_warn_entry_without_dropping_stream() {
        let (tx, rx) = mpsc::unbounded();
        let source = ScriptedSource::new(None, vec![rx]);
        let ring = Arc::new(Mutex::new(LogRing::new()));
        let client = LogStreamClient::spawn(Arc::clone(&source) as _, wf(), Arc::clone(&ring));
        tokio::time::sleep(Duration::from_millis(10)).await;

        tx.unbounded_send(Ok(b"data: {not json at all\n\n".to_vec())).unwrap();
        tx.unbounded_send(Ok(b"data: {\"message\":\"still here\"}\n\n".to_vec()))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let entries = lock(&ring).entries(None);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].level, "warn");
        assert!(entries[0].message.contains("{not json at all"));
        assert_eq!(entries[1].message, "still here");
        // the bad event did not cost the connection
        assert_eq!(source.opens(), 1);
        assert_eq!(client.state().phase, StreamPhase::Open);

        drop(tx);
        client.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn silent_stream_reconnects_after_heartbeat_window() {
        let (_tx_keep, rx1) = mpsc::unbounded::<Result<Vec<u8>, StreamError>>();
        let (tx2, rx2) = mpsc::unbounded();
        let source = ScriptedSource::new(None, vec![rx1, rx2]);
        let ring = Arc::new(Mutex::new(LogRing::new()));
        let client = LogStreamClient::spawn(Arc::clone(&source) as _, wf(), Arc::clone(&ring));

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(source.opens(), 1);

        // heartbeat window (15s) plus first backoff delay (2s)
        tokio::time::sleep(Duration::from_millis(17_100)).await;
        assert_eq!(source.opens(), 2);
        assert!(client
            .state()
            .last_error
            .is_some_and(|e| e.contains("heartbeat")));

        // the second stream is silent too, so the backoff keeps
        // growing: next reconnect after 15s + 4s
        tokio::time::sleep(Duration::from_millis(19_100)).await;
        assert_eq!(source.opens(), 3);

        drop(tx2);
        client.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_the_loop() {
        let (tx, rx) = mpsc::unbounded();
        let source = ScriptedSource::new(None, vec![rx]);
        let ring = Arc::new(Mutex::new(LogRing::new()));
        let client = LogStreamClient::spawn(Arc::clone(&source) as _, wf(), ring);
        tokio::time::sleep(Duration::from_millis(10)).await;

        client.shutdown().await;
        drop(tx);
        assert_eq!(source.opens(), 1);
    }
}
