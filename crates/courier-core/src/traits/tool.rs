// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tool trait: the seam between the agent executor and the domain
//! tool catalog.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::CourierError;
use crate::types::CorrelationId;

/// Execution context handed to every tool invocation.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub chat_id: i64,
    pub session_id: String,
    pub network: String,
    pub wallet_address: Option<String>,
    pub correlation_id: CorrelationId,
}

/// A callable tool exposed to the model.
///
/// Implementations describe themselves (name, description, JSON input
/// schema) and may gate execution behind human approval via
/// [`Tool::needs_approval`].
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema for the tool input.
    fn input_schema(&self) -> Value;

    /// Read-only tools are cacheable and allowed in non-private chats.
    fn read_only(&self) -> bool {
        false
    }

    /// Whether this invocation requires explicit human approval before
    /// executing. May depend on the concrete input.
    fn needs_approval(&self, _input: &Value) -> bool {
        false
    }

    /// Run the tool. Implementations should return structured JSON.
    async fn execute(&self, input: Value, ctx: &ToolContext) -> Result<Value, CourierError>;
}
