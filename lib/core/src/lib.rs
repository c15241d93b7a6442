//! Core domain types and utilities for the amber-relay console.
//!
//! This crate provides the foundational types shared by every other crate:
//! opaque entity identifiers and the workspace selection model that the
//! reactive controllers observe.

pub mod id;
pub mod selection;

pub use id::{NodeId, ParseIdError, PromptId, WorkflowId};
pub use selection::{Selection, WorkflowRef, WorkflowStatus, WorkspaceTab};
