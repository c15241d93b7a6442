//! Incremental `text/event-stream` parser.
//!
//! Fed raw byte chunks as they arrive; emits complete events on each
//! blank-line dispatch. Comment lines (leading `:`) are heartbeats and
//! produce no event but do count as traffic for staleness tracking.

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// The `event:` field, when the server sent one.
    pub event: Option<String>,
    /// Concatenated `data:` lines, newline-joined.
    pub data: String,
}

/// Streaming parser retaining partial lines and the open event between
/// chunks.
#[derive(Debug, Default)]
pub struct SseParser {
    tail: Vec<u8>,
    event_name: Option<String>,
    data_lines: Vec<String>,
}

impl SseParser {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes a chunk and returns every event completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.tail.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(pos) = self.tail.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.tail.drain(..=pos).collect();
            let mut line = String::from_utf8_lossy(&line).into_owned();
            while line.ends_with('\n') || line.ends_with('\r') {
                line.pop();
            }
            if let Some(event) = self.take_line(&line) {
                events.push(event);
            }
        }
        events
    }

    fn take_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            // dispatch
            if self.data_lines.is_empty() {
                self.event_name = None;
                return None;
            }
            let event = SseEvent {
                event: self.event_name.take(),
                data: self.data_lines.join("\n"),
            };
            self.data_lines.clear();
            return Some(event);
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event_name = Some(value.to_string()),
            "data" => self.data_lines.push(value.to_string()),
            // id and retry fields are ignored; reconnect state is ours
            _ => {}
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_event() {
        let mut parser = SseParser::new();
        let events = parser.push(b"event: log\ndata: {\"level\":\"info\"}\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event.as_deref(), Some("log"));
        assert_eq!(events[0].data, "{\"level\":\"info\"}");
    }

    #[test]
    fn reassembles_event_split_across_chunks() {
        let mut parser = SseParser::new();
        assert!(parser.push(b"data: first ha").is_empty());
        assert!(parser.push(b"lf\nda").is_empty());
        let events = parser.push(b"ta: second\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "first half\nsecond");
    }

    #[test]
    fn handles_crlf_line_endings() {
        let mut parser = SseParser::new();
        let events = parser.push(b"data: hello\r\n\r\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "hello");
    }

    #[test]
    fn comment_lines_emit_nothing() {
        let mut parser = SseParser::new();
        assert!(parser.push(b": keep-alive\n\n").is_empty());
    }

    #[test]
    fn multiple_events_in_one_chunk() {
        let mut parser = SseParser::new();
        let events = parser.push(b"data: one\n\ndata: two\n\n");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].data, "one");
        assert_eq!(events[1].data, "two");
    }

    #[test]
    fn blank_line_without_data_is_silent() {
        let mut parser = SseParser::new();
        assert!(parser.push(b"event: log\n\n").is_empty());
        // the dangling event name does not leak into the next event
        let events = parser.push(b"data: x\n\n");
        assert_eq!(events[0].event, None);
    }
}
