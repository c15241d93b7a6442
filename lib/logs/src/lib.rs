//! Live log streaming: SSE decoding, reconnect with backoff, and the
//! bounded in-memory ring behind the log panel.

pub mod client;
pub mod controller;
pub mod error;
pub mod retry;
pub mod ring;
pub mod sse;

pub use client::{
    EventSource, EventStreamHandle, HttpEventSource, LogStreamClient, LogStreamState, StreamPhase,
    COUNTDOWN_TICK_MS, HEARTBEAT_TIMEOUT_MS,
};
pub use controller::{LogStreamController, LogWatch};
pub use error::StreamError;
pub use retry::{backoff_delay_ms, parse_retry_after, BASE_DELAY_MS, MAX_DELAY_MS};
pub use ring::{LogEntry, LogRing, RING_CAP};
pub use sse::{SseEvent, SseParser};
