//! Response envelopes and error body extraction.
//!
//! The backend wraps successful payloads as `{data, meta}` and reports
//! errors in several historical shapes. `extract_error_message` collapses
//! those shapes into the single message surfaced to the operator.

use serde::Deserialize;
use serde_json::Value;

/// Request metadata echoed by the backend.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiMeta {
    /// The server-side request/trace id.
    #[serde(rename = "requestId", default)]
    pub request_id: Option<String>,
    /// Non-fatal warning codes attached to the response.
    #[serde(default)]
    pub warnings: Vec<String>,
}

/// Extracts the surfaced error message from an error body.
///
/// Known shapes, in precedence order for the message:
/// `{code, message}`, `{detail: {code?, message}}`, `{detail: [{msg}, ..]}`,
/// `{error}`. When both a code and a message are present the result is
/// `"{code}: {message}"`. Returns `None` when the body carries none of
/// these, in which case the caller falls back to a status-based message.
#[must_use]
pub fn extract_error_message(body: &Value) -> Option<String> {
    let detail = body.get("detail");

    let code = non_empty(body.get("code"))
        .or_else(|| non_empty(detail.and_then(|d| d.get("code"))));

    let message = non_empty(body.get("message"))
        .or_else(|| non_empty(detail.and_then(|d| d.get("message"))))
        .or_else(|| non_empty(detail.and_then(|d| d.get(0)).and_then(|d| d.get("msg"))))
        .or_else(|| non_empty(body.get("error")));

    match (code, message) {
        (Some(code), Some(message)) => Some(format!("{code}: {message}")),
        (_, Some(message)) => Some(message),
        _ => None,
    }
}

/// The fallback message when no error body could be interpreted.
#[must_use]
pub fn fallback_message(status: u16) -> String {
    format!("request failed: {status}")
}

fn non_empty(value: Option<&Value>) -> Option<String> {
    let s = value?.as_str()?.trim();
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn code_and_message_are_combined() {
        let body = json!({"code": "WORKFLOW_NODE_REQUIRED", "message": "node sequence is empty"});
        assert_eq!(
            extract_error_message(&body).unwrap(),
            "WORKFLOW_NODE_REQUIRED: node sequence is empty"
        );
    }

    #[test]
    fn nested_detail_message() {
        let body = json!({"detail": {"code": "CHANNEL_POLICY_NOT_FOUND", "message": "Channel configuration not found"}});
        assert_eq!(
            extract_error_message(&body).unwrap(),
            "CHANNEL_POLICY_NOT_FOUND: Channel configuration not found"
        );
    }

    #[test]
    fn detail_list_uses_first_msg() {
        let body = json!({"detail": [{"msg": "chatId must not be empty"}, {"msg": "other"}]});
        assert_eq!(
            extract_error_message(&body).unwrap(),
            "chatId must not be empty"
        );
    }

    #[test]
    fn bare_error_field() {
        let body = json!({"error": "boom"});
        assert_eq!(extract_error_message(&body).unwrap(), "boom");
    }

    #[test]
    fn message_without_code_is_unprefixed() {
        let body = json!({"message": "nope"});
        assert_eq!(extract_error_message(&body).unwrap(), "nope");
    }

    #[test]
    fn empty_body_yields_none() {
        assert!(extract_error_message(&json!({})).is_none());
        assert!(extract_error_message(&json!({"message": "  "})).is_none());
        assert_eq!(fallback_message(502), "request failed: 502");
    }

    #[test]
    fn meta_deserializes_with_missing_fields() {
        let meta: ApiMeta = serde_json::from_value(json!({})).expect("deserialize");
        assert!(meta.request_id.is_none());
        assert!(meta.warnings.is_empty());

        let meta: ApiMeta = serde_json::from_value(json!({
            "requestId": "req-1",
            "warnings": ["CHANNEL_POLICY_DEPRECATED_FIELD"],
        }))
        .expect("deserialize");
        assert_eq!(meta.request_id.as_deref(), Some("req-1"));
        assert_eq!(meta.warnings.len(), 1);
    }
}
