// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Courier bot runtime.
//!
//! This crate provides the error taxonomy, the message and turn model,
//! and the adapter traits the runtime consumes from its external
//! collaborators (chat transport, LLM provider, tool catalog, KV store).

pub mod error;
pub mod traits;
pub mod types;

pub use error::CourierError;
pub use types::{CorrelationId, SessionId};

pub use traits::{
    ChatTransport, DraftSink, KvStore, ModelProvider, NoopDraftSink, Tool, ToolContext,
};
