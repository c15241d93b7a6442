//! Backend gateway for workflow CRUD, lifecycle, and catalog operations.
//!
//! The [`WorkflowGateway`] trait is the seam controllers program against;
//! [`HttpWorkflowGateway`] is the production implementation over the JSON
//! client. Tests substitute in-memory gateways.

use amber_relay_api::{unwrap_data, ApiClient, ApiError};
use amber_relay_core::{WorkflowId, WorkflowStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};

use crate::draft::{CoverageSnapshot, DeliveryMode, WorkflowDraft, WorkflowPayload};

/// A workflow as it appears in the sidebar list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSummary {
    pub id: WorkflowId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: WorkflowStatus,
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl WorkflowSummary {
    /// Derives a list entry from a full draft; `None` for unsaved drafts.
    #[must_use]
    pub fn from_draft(draft: &WorkflowDraft) -> Option<Self> {
        Some(Self {
            id: draft.id.clone()?,
            name: draft.name.clone(),
            status: draft.status,
            version: draft.version,
            updated_at: None,
        })
    }
}

/// A pipeline variable available to drafts, from the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogVariable {
    pub name: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub description: String,
}

/// A tool callable from pipeline nodes, from the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogTool {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// Backend operations on workflows.
#[async_trait]
pub trait WorkflowGateway: Send + Sync {
    /// Lists all workflows visible to the operator.
    async fn list(&self) -> Result<Vec<WorkflowSummary>, ApiError>;

    /// Fetches the full draft for one workflow.
    async fn get(&self, id: &WorkflowId) -> Result<WorkflowDraft, ApiError>;

    /// Creates a new workflow and returns the persisted draft.
    async fn create(&self, payload: &WorkflowPayload) -> Result<WorkflowDraft, ApiError>;

    /// Updates an existing workflow and returns the persisted draft.
    async fn update(
        &self,
        id: &WorkflowId,
        payload: &WorkflowPayload,
    ) -> Result<WorkflowDraft, ApiError>;

    /// Deletes a workflow. Published workflows are rejected client-side
    /// before this is ever called.
    async fn delete(&self, id: &WorkflowId) -> Result<(), ApiError>;

    /// Publishes the current draft as a new frozen version.
    async fn publish(
        &self,
        id: &WorkflowId,
        notes: Option<&str>,
    ) -> Result<WorkflowDraft, ApiError>;

    /// Rolls back to a previous published version.
    async fn rollback(&self, id: &WorkflowId, version: u32) -> Result<WorkflowDraft, ApiError>;

    /// Lists catalog variables for the workflow.
    async fn list_variables(&self, id: &WorkflowId) -> Result<Vec<CatalogVariable>, ApiError>;

    /// Lists catalog tools for the workflow.
    async fn list_tools(&self, id: &WorkflowId) -> Result<Vec<CatalogTool>, ApiError>;

    /// Runs the coverage test suite and returns the resulting snapshot.
    async fn run_coverage_tests(
        &self,
        id: &WorkflowId,
        scenarios: &[String],
        mode: DeliveryMode,
    ) -> Result<CoverageSnapshot, ApiError>;
}

/// [`WorkflowGateway`] over the console backend HTTP API.
#[derive(Debug, Clone)]
pub struct HttpWorkflowGateway {
    client: ApiClient,
}

impl HttpWorkflowGateway {
    #[must_use]
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    fn decode<T: DeserializeOwned>(body: Option<Value>) -> Result<T, ApiError> {
        let data = unwrap_data(body.unwrap_or(Value::Null));
        serde_json::from_value(data).map_err(|e| ApiError::Decode {
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl WorkflowGateway for HttpWorkflowGateway {
    async fn list(&self) -> Result<Vec<WorkflowSummary>, ApiError> {
        let body = self.client.get_json("/api/workflows", &[]).await?;
        Self::decode(body)
    }

    async fn get(&self, id: &WorkflowId) -> Result<WorkflowDraft, ApiError> {
        let body = self
            .client
            .get_json(&format!("/api/workflows/{id}"), &[])
            .await?;
        Self::decode(body)
    }

    async fn create(&self, payload: &WorkflowPayload) -> Result<WorkflowDraft, ApiError> {
        let body = self.client.post_json("/api/workflows", payload).await?;
        Self::decode(body)
    }

    async fn update(
        &self,
        id: &WorkflowId,
        payload: &WorkflowPayload,
    ) -> Result<WorkflowDraft, ApiError> {
        let body = self
            .client
            .put_json(&format!("/api/workflows/{id}"), payload)
            .await?;
        Self::decode(body)
    }

    async fn delete(&self, id: &WorkflowId) -> Result<(), ApiError> {
        self.client.delete(&format!("/api/workflows/{id}"), &[]).await
    }

    async fn publish(
        &self,
        id: &WorkflowId,
        notes: Option<&str>,
    ) -> Result<WorkflowDraft, ApiError> {
        let body = self
            .client
            .post_json(&format!("/api/workflows/{id}/publish"), &json!({ "notes": notes }))
            .await?;
        Self::decode(body)
    }

    async fn rollback(&self, id: &WorkflowId, version: u32) -> Result<WorkflowDraft, ApiError> {
        let body = self
            .client
            .post_json(
                &format!("/api/workflows/{id}/rollback"),
                &json!({ "version": version }),
            )
            .await?;
        Self::decode(body)
    }

    async fn list_variables(&self, id: &WorkflowId) -> Result<Vec<CatalogVariable>, ApiError> {
        let body = self
            .client
            .get_json(&format!("/api/workflows/{id}/variables"), &[])
            .await?;
        Self::decode(body)
    }

    async fn list_tools(&self, id: &WorkflowId) -> Result<Vec<CatalogTool>, ApiError> {
        let body = self
            .client
            .get_json(&format!("/api/workflows/{id}/tools"), &[])
            .await?;
        Self::decode(body)
    }

    async fn run_coverage_tests(
        &self,
        id: &WorkflowId,
        scenarios: &[String],
        mode: DeliveryMode,
    ) -> Result<CoverageSnapshot, ApiError> {
        let body = self
            .client
            .post_json(
                &format!("/api/workflows/{id}/tests/run"),
                &json!({ "scenarios": scenarios, "mode": mode }),
            )
            .await?;
        Self::decode(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decode_unwraps_envelope() {
        let body = json!({"data": [{"id": "wf-1", "name": "flow", "status": "draft"}]});
        let list: Vec<WorkflowSummary> =
            HttpWorkflowGateway::decode(Some(body)).expect("decode");
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].id.as_str(), "wf-1");
    }

    #[test]
    fn decode_rejects_missing_body() {
        let result: Result<WorkflowDraft, _> = HttpWorkflowGateway::decode(None);
        assert!(matches!(result, Err(ApiError::Decode { .. })));
    }

    #[test]
    fn summary_from_unsaved_draft_is_none() {
        assert!(WorkflowSummary::from_draft(&WorkflowDraft::empty()).is_none());
    }
}
