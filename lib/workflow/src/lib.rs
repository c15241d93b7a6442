//! Workflow draft editing, publish lifecycle, and catalog metadata.

pub mod draft;
pub mod error;
pub mod gateway;
pub mod lifecycle;
pub mod meta;

pub use draft::{
    build_payload, normalize, CoverageSnapshot, CoverageStatus, DeliveryMode, DraftMetadata,
    PromptBinding, Strategy, VersionRecord, WorkflowDraft, WorkflowPayload,
};
pub use error::DraftError;
pub use gateway::{
    CatalogTool, CatalogVariable, HttpWorkflowGateway, WorkflowGateway, WorkflowSummary,
};
pub use lifecycle::{
    AlwaysConfirm, BusyFlags, CatalogCounts, ConfirmGate, ConfirmPrompt, DraftLifecycle,
    EditorCatalog, LifecycleSnapshot,
};
pub use meta::{CatalogState, MetaLoader};
