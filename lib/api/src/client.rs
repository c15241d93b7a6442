//! JSON client for the console backend.
//!
//! Every request carries the operator's actor identity headers so the
//! backend can attribute mutations and enforce tenancy. Responses are
//! surfaced either as decoded JSON or as an [`ApiError`] whose message has
//! already been extracted from the error body.

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use serde::Serialize;
use serde_json::Value;

use crate::envelope::{extract_error_message, fallback_message, ApiMeta};
use crate::error::ApiError;

/// The operator identity attached to every request.
#[derive(Debug, Clone, Default)]
pub struct ActorIdentity {
    /// Value for the `X-Actor-Id` header.
    pub actor_id: String,
    /// Value for the `X-Actor-Roles` header (comma-separated).
    pub roles: String,
    /// Value for the `X-Tenant-Id` header.
    pub tenant: String,
}

impl ActorIdentity {
    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in [
            ("x-actor-id", &self.actor_id),
            ("x-actor-roles", &self.roles),
            ("x-tenant-id", &self.tenant),
        ] {
            if value.is_empty() {
                continue;
            }
            if let Ok(value) = HeaderValue::from_str(value) {
                headers.insert(name, value);
            }
        }
        headers
    }
}

/// A thin JSON client over reqwest.
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    actor: ActorIdentity,
    http: reqwest::Client,
}

impl ApiClient {
    /// Creates a client for the given backend base URL (no trailing slash).
    #[must_use]
    pub fn new(base_url: impl Into<String>, actor: ActorIdentity) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            base_url,
            actor,
            http: reqwest::Client::new(),
        }
    }

    /// The configured backend base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Performs a GET and returns the decoded JSON body, if any.
    pub async fn get_json(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Option<Value>, ApiError> {
        let request = self
            .http
            .get(self.url(path))
            .query(query)
            .headers(self.actor.headers());
        self.execute(request).await
    }

    /// Performs a POST with a JSON body.
    pub async fn post_json<B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Option<Value>, ApiError> {
        let request = self
            .http
            .post(self.url(path))
            .headers(self.actor.headers())
            .header(CONTENT_TYPE, "application/json")
            .json(body);
        self.execute(request).await
    }

    /// Performs a PUT with a JSON body.
    pub async fn put_json<B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Option<Value>, ApiError> {
        let request = self
            .http
            .put(self.url(path))
            .headers(self.actor.headers())
            .header(CONTENT_TYPE, "application/json")
            .json(body);
        self.execute(request).await
    }

    /// Performs a DELETE, discarding any response body.
    pub async fn delete(&self, path: &str, query: &[(&str, String)]) -> Result<(), ApiError> {
        let request = self
            .http
            .delete(self.url(path))
            .query(query)
            .headers(self.actor.headers());
        self.execute(request).await.map(|_| ())
    }

    /// Opens a `text/event-stream` response.
    ///
    /// The response is returned regardless of status so the caller can read
    /// retry hints (`retry-after-ms` / `retry-after`) from the headers of a
    /// rejected handshake.
    pub async fn event_stream(&self, path: &str) -> Result<reqwest::Response, ApiError> {
        let response = self
            .http
            .get(self.url(path))
            .headers(self.actor.headers())
            .header(ACCEPT, "text/event-stream")
            .send()
            .await?;
        Ok(response)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn execute(&self, request: reqwest::RequestBuilder) -> Result<Option<Value>, ApiError> {
        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let message = match response.json::<Value>().await {
                Ok(body) => {
                    extract_error_message(&body).unwrap_or_else(|| fallback_message(status.as_u16()))
                }
                Err(_) => fallback_message(status.as_u16()),
            };
            tracing::debug!(status = status.as_u16(), %message, "backend request rejected");
            return Err(ApiError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.contains("application/json"));
        if !is_json {
            return Ok(None);
        }

        let body = response.json::<Value>().await.map_err(|e| ApiError::Decode {
            message: e.to_string(),
        })?;
        if let Some(meta) = body.get("meta") {
            let meta: ApiMeta = serde_json::from_value(meta.clone()).unwrap_or_default();
            for warning in &meta.warnings {
                tracing::warn!(request_id = ?meta.request_id, %warning, "backend warning");
            }
        }
        Ok(Some(body))
    }
}

/// Unwraps the `{data, meta}` envelope, tolerating bare payloads from older
/// backend revisions.
#[must_use]
pub fn unwrap_data(body: Value) -> Value {
    match body {
        Value::Object(mut map) if map.contains_key("data") => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn actor_headers_skip_empty_values() {
        let actor = ActorIdentity {
            actor_id: "ops-1".to_string(),
            roles: String::new(),
            tenant: "acme".to_string(),
        };
        let headers = actor.headers();
        assert_eq!(headers.get("x-actor-id").unwrap(), "ops-1");
        assert!(headers.get("x-actor-roles").is_none());
        assert_eq!(headers.get("x-tenant-id").unwrap(), "acme");
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client = ApiClient::new("http://localhost:8000/", ActorIdentity::default());
        assert_eq!(client.base_url(), "http://localhost:8000");
        assert_eq!(client.url("/api/workflows"), "http://localhost:8000/api/workflows");
    }

    #[test]
    fn unwrap_data_handles_both_shapes() {
        let wrapped = json!({"data": {"id": "wf-1"}, "meta": {}});
        assert_eq!(unwrap_data(wrapped), json!({"id": "wf-1"}));

        let bare = json!({"id": "wf-1"});
        assert_eq!(unwrap_data(bare.clone()), bare);
    }
}
