// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Model provider trait for streaming LLM backends.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde_json::Value;

use crate::error::CourierError;
use crate::types::{MessagePart, Role};

/// One message in the provider request transcript.
#[derive(Debug, Clone)]
pub struct ProviderMessage {
    pub role: Role,
    pub parts: Vec<MessagePart>,
}

/// Declaration of a tool offered to the model.
#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// A fully assembled provider request.
#[derive(Debug, Clone)]
pub struct ProviderRequest {
    pub model: String,
    pub system: String,
    pub messages: Vec<ProviderMessage>,
    pub tools: Vec<ToolSpec>,
    pub max_tokens: u32,
}

/// Events emitted by a streaming provider.
#[derive(Debug, Clone)]
pub enum ProviderEvent {
    /// Incremental assistant text.
    TextDelta(String),
    /// A complete tool invocation request from the model.
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    /// The stream finished normally.
    Stop { stop_reason: Option<String> },
}

/// Boxed provider event stream.
pub type ProviderEventStream =
    Pin<Box<dyn Stream<Item = Result<ProviderEvent, CourierError>> + Send>>;

/// Adapter for an LLM backend capable of streaming a single model turn.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Stable provider name used in audit events and logs.
    fn name(&self) -> &str;

    /// Open a streaming turn. Errors before the first `TextDelta` are
    /// eligible for provider fallback; errors after are not.
    async fn stream(&self, request: ProviderRequest) -> Result<ProviderEventStream, CourierError>;
}
