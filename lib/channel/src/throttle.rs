//! Client-side test-send throttle.
//!
//! At most [`MAX_ATTEMPTS`] test messages per sliding [`WINDOW_MS`] window.
//! Attempts are recorded at dispatch time, whether or not the send
//! ultimately succeeds. Callers inject the clock as epoch milliseconds.

/// Maximum test sends per window.
pub const MAX_ATTEMPTS: usize = 3;

/// Sliding window length in milliseconds.
pub const WINDOW_MS: i64 = 60_000;

/// Test history entries retained, newest first.
pub const HISTORY_CAP: usize = 10;

/// Outcome of one test send, kept for the history panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestRecord {
    pub at_ms: i64,
    pub ok: bool,
    pub message: String,
    pub detail: Option<String>,
}

/// Sliding-window attempt ledger plus bounded result history.
#[derive(Debug, Clone, Default)]
pub struct ThrottleLedger {
    attempts: Vec<i64>,
    history: Vec<TestRecord>,
}

impl ThrottleLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn prune(&mut self, now_ms: i64) {
        self.attempts.retain(|t| now_ms - t < WINDOW_MS);
    }

    /// True when the window already holds [`MAX_ATTEMPTS`] attempts.
    #[must_use]
    pub fn is_throttled(&mut self, now_ms: i64) -> bool {
        self.prune(now_ms);
        self.attempts.len() >= MAX_ATTEMPTS
    }

    /// The instant the throttle lifts: oldest in-window attempt plus the
    /// window, or 0 when not throttled.
    #[must_use]
    pub fn cooldown_until(&mut self, now_ms: i64) -> i64 {
        self.prune(now_ms);
        if self.attempts.len() >= MAX_ATTEMPTS {
            self.attempts[0] + WINDOW_MS
        } else {
            0
        }
    }

    /// Milliseconds until the throttle lifts, 0 when it already has.
    #[must_use]
    pub fn retry_after_ms(&mut self, now_ms: i64) -> u64 {
        (self.cooldown_until(now_ms) - now_ms).max(0) as u64
    }

    /// Records a dispatched attempt.
    pub fn record_attempt(&mut self, now_ms: i64) {
        self.prune(now_ms);
        self.attempts.push(now_ms);
    }

    /// Prepends a result to the history, evicting the oldest past the cap.
    pub fn record_result(&mut self, record: TestRecord) {
        self.history.insert(0, record);
        self.history.truncate(HISTORY_CAP);
    }

    /// Test results, newest first.
    #[must_use]
    pub fn history(&self) -> &[TestRecord] {
        &self.history
    }
}
