//! Normalized log entries and the bounded in-memory ring.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use ulid::Ulid;

/// Entries retained before the oldest are evicted.
pub const RING_CAP: usize = 1_000;

/// A normalized log line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    /// Server id when present, otherwise a freshly minted ULID.
    pub id: String,
    /// Lowercased severity.
    pub level: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    /// Emitting pipeline node, when the event named one.
    pub node: Option<String>,
}

impl LogEntry {
    /// Normalizes one stream event payload.
    ///
    /// Non-object payloads become an `info` entry with the raw text as the
    /// message. Missing ids are minted locally; unparsable timestamps fall
    /// back to the arrival time.
    #[must_use]
    pub fn from_wire(payload: &Value, received_at: DateTime<Utc>) -> Self {
        let Some(map) = payload.as_object() else {
            return Self {
                id: Ulid::new().to_string(),
                level: "info".to_string(),
                message: payload.as_str().map_or_else(|| payload.to_string(), str::to_string),
                timestamp: received_at,
                node: None,
            };
        };

        let id = map
            .get("id")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map_or_else(|| Ulid::new().to_string(), str::to_string);
        let level = map
            .get("level")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .unwrap_or("info")
            .to_lowercase();
        let message = map
            .get("message")
            .and_then(Value::as_str)
            .map_or_else(|| payload.to_string(), str::to_string);
        let timestamp = map
            .get("timestamp")
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map_or(received_at, |t| t.with_timezone(&Utc));
        let node = map
            .get("node")
            .and_then(Value::as_str)
            .map(str::to_string);

        Self {
            id,
            level,
            message,
            timestamp,
            node,
        }
    }

    /// Entry for an event whose payload failed to decode.
    ///
    /// The raw text is preserved in the message at `warn` level so bad
    /// events stay visible instead of silently vanishing.
    #[must_use]
    pub fn malformed(raw: &str, received_at: DateTime<Utc>) -> Self {
        Self {
            id: Ulid::new().to_string(),
            level: "warn".to_string(),
            message: format!("undecodable log event: {raw}"),
            timestamp: received_at,
            node: None,
        }
    }
}

/// Bounded FIFO of log entries, oldest evicted first.
#[derive(Debug, Default)]
pub struct LogRing {
    entries: VecDeque<LogEntry>,
}

impl LogRing {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: LogEntry) {
        if self.entries.len() == RING_CAP {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in arrival order, optionally filtered by level.
    #[must_use]
    pub fn entries(&self, level: Option<&str>) -> Vec<LogEntry> {
        self.entries
            .iter()
            .filter(|e| level.is_none_or(|level| e.level == level))
            .cloned()
            .collect()
    }

    /// Renders the ring as plain text, one line per entry.
    #[must_use]
    pub fn export_text(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            out.push_str(&format!(
                "{} [{}] {}\n",
                entry.timestamp.to_rfc3339(),
                entry.level,
                entry.message
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(level: &str, message: &str) -> LogEntry {
        LogEntry::from_wire(
            &json!({"level": level, "message": message}),
            Utc::now(),
        )
    }

    #[test]
    fn normalizes_full_payload() {
        let received = Utc::now();
        let entry = LogEntry::from_wire(
            &json!({
                "id": "evt-1",
                "level": "WARN",
                "message": "slow node",
                "timestamp": "2026-08-30T10:00:00Z",
                "node": "classify",
            }),
            received,
        );
        assert_eq!(entry.id, "evt-1");
        assert_eq!(entry.level, "warn");
        assert_eq!(entry.message, "slow node");
        assert_eq!(entry.timestamp.to_rfc3339(), "2026-08-30T10:00:00+00:00");
        assert_eq!(entry.node.as_deref(), Some("classify"));
    }

    #[test]
    fn mints_ulid_when_id_missing() {
        let entry = LogEntry::from_wire(&json!({"message": "hi"}), Utc::now());
        assert_eq!(entry.id.len(), 26);
        assert_eq!(entry.level, "info");
    }

    #[test]
    fn bad_timestamp_falls_back_to_arrival_time() {
        let received = Utc::now();
        let entry = LogEntry::from_wire(
            &json!({"message": "hi", "timestamp": "yesterday-ish"}),
            received,
        );
        assert_eq!(entry.timestamp, received);
    }

    #[test]
    fn malformed_entry_keeps_raw_text_at_warn_level() {
        let received = Utc::now();
        let entry = LogEntry::malformed("::garbage::", received);
        assert_eq!(entry.level, "warn");
        assert!(entry.message.contains("::garbage::"));
        assert_eq!(entry.timestamp, received);
        assert_eq!(entry.id.len(), 26);
    }

    #[test]
    fn non_object_payload_becomes_info_entry() {
        let entry = LogEntry::from_wire(&json!("plain text line"), Utc::now());
        assert_eq!(entry.level, "info");
        assert_eq!(entry.message, "plain text line");
    }

    #[test]
    fn ring_evicts_oldest_past_cap() {
        let mut ring = LogRing::new();
        for i in 0..(RING_CAP + 5) {
            ring.push(entry("info", &format!("line {i}")));
        }
        assert_eq!(ring.len(), RING_CAP);
        assert_eq!(ring.entries(None)[0].message, "line 5");
    }

    #[test]
    fn level_filter_matches_exactly() {
        let mut ring = LogRing::new();
        ring.push(entry("info", "a"));
        ring.push(entry("error", "b"));
        ring.push(entry("info", "c"));
        let errors = ring.entries(Some("error"));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "b");
    }

    #[test]
    fn export_renders_one_line_per_entry() {
        let mut ring = LogRing::new();
        ring.push(entry("info", "first"));
        ring.push(entry("warn", "second"));
        let text = ring.export_text();
        assert_eq!(text.lines().count(), 2);
        assert!(text.contains("[warn] second"));
    }
}
