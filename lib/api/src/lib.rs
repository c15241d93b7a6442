//! HTTP transport layer for the amber-relay console.
//!
//! This crate provides:
//!
//! - **`ApiClient`**: a thin JSON client over reqwest that attaches actor
//!   identity headers to every request and unwraps the backend's
//!   `{data, meta}` envelope
//! - **Error extraction**: the backend's several error body shapes are
//!   collapsed into one surfaced message
//! - **SSE handshake**: `event_stream` opens a `text/event-stream` response
//!   for the log stream client to consume
//!
//! Typed endpoint wrappers live in the domain crates; this crate knows
//! nothing about workflows or channels.

pub mod client;
pub mod envelope;
pub mod error;

pub use client::{unwrap_data, ActorIdentity, ApiClient};
pub use envelope::ApiMeta;
pub use error::ApiError;
