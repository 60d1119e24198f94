// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock LLM provider for deterministic testing.
//!
//! Scripts are popped FIFO, one per stream call. An exhausted queue
//! yields a default text response, so simple tests stay terse.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use courier_core::traits::provider::{
    ModelProvider, ProviderEvent, ProviderEventStream, ProviderRequest,
};
use courier_core::CourierError;
use serde_json::Value;

/// One scripted stream event.
#[derive(Debug, Clone)]
pub enum ScriptEvent {
    Text(String),
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    Stop,
    /// Stream error; position in the script decides whether it counts
    /// as pre-stream (fallback-eligible) or mid-stream.
    Error(String),
}

/// Scripted provider: each `stream` call plays the next script.
pub struct MockProvider {
    provider_name: String,
    scripts: Mutex<VecDeque<Vec<ScriptEvent>>>,
}

impl MockProvider {
    pub fn new(provider_name: impl Into<String>) -> Self {
        Self {
            provider_name: provider_name.into(),
            scripts: Mutex::new(VecDeque::new()),
        }
    }

    /// Pre-load plain text responses, one per turn.
    pub fn with_responses(provider_name: impl Into<String>, responses: Vec<&str>) -> Self {
        let provider = Self::new(provider_name);
        for response in responses {
            provider.push_text(response);
        }
        provider
    }

    /// Queue a plain text response.
    pub fn push_text(&self, text: &str) {
        self.push_script(vec![ScriptEvent::Text(text.to_string()), ScriptEvent::Stop]);
    }

    /// Queue a tool call followed by nothing (the executor loops).
    pub fn push_tool_call(&self, id: &str, name: &str, input: Value) {
        self.push_script(vec![
            ScriptEvent::ToolUse {
                id: id.to_string(),
                name: name.to_string(),
                input,
            },
            ScriptEvent::Stop,
        ]);
    }

    /// Queue an arbitrary script.
    pub fn push_script(&self, script: Vec<ScriptEvent>) {
        self.scripts.lock().unwrap().push_back(script);
    }

    /// Scripts not yet consumed.
    pub fn remaining(&self) -> usize {
        self.scripts.lock().unwrap().len()
    }
}

#[async_trait]
impl ModelProvider for MockProvider {
    fn name(&self) -> &str {
        &self.provider_name
    }

    async fn stream(&self, _request: ProviderRequest) -> Result<ProviderEventStream, CourierError> {
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| vec![ScriptEvent::Text("mock response".into()), ScriptEvent::Stop]);

        let events: Vec<Result<ProviderEvent, CourierError>> = script
            .into_iter()
            .map(|event| match event {
                ScriptEvent::Text(text) => Ok(ProviderEvent::TextDelta(text)),
                ScriptEvent::ToolUse { id, name, input } => {
                    Ok(ProviderEvent::ToolUse { id, name, input })
                }
                ScriptEvent::Stop => Ok(ProviderEvent::Stop { stop_reason: None }),
                ScriptEvent::Error(message) => Err(CourierError::Provider {
                    message,
                    source: None,
                }),
            })
            .collect();
        Ok(Box::pin(futures::stream::iter(events)))
    }
}
