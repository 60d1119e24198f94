// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter traits the core consumes from external collaborators.

pub mod chat;
pub mod kv;
pub mod provider;
pub mod tool;

pub use chat::{
    Button, ChatTransport, DraftSink, DraftSinkFactory, Keyboard, NoopDraftFactory, NoopDraftSink,
    SendOptions,
};
pub use kv::{Counter, KvStore};
pub use provider::{
    ModelProvider, ProviderEvent, ProviderEventStream, ProviderMessage, ProviderRequest, ToolSpec,
};
pub use tool::{Tool, ToolContext};
