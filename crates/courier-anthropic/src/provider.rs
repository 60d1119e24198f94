// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! [`ModelProvider`] implementation over the Anthropic client.
//!
//! Converts the runtime's message-part transcript into API content
//! blocks, and folds the SSE event stream into provider events,
//! accumulating `input_json_delta` fragments into complete tool calls.

use std::sync::Arc;

use async_trait::async_trait;
use courier_core::traits::provider::{
    ModelProvider, ProviderEvent, ProviderEventStream, ProviderMessage, ProviderRequest,
};
use courier_core::types::{MessagePart, Role};
use courier_core::CourierError;
use futures::StreamExt;
use serde_json::Value;
use tracing::warn;

use crate::client::AnthropicClient;
use crate::sse::StreamEvent;
use crate::types::{ApiMessage, ApiTool, ContentBlock, MessageRequest, SseContentBlock, SseDelta};

/// Anthropic-backed model provider.
pub struct AnthropicProvider {
    client: Arc<AnthropicClient>,
    name: String,
    /// When set, overrides the model id from the request (fallback tier).
    model_override: Option<String>,
}

impl AnthropicProvider {
    pub fn new(client: Arc<AnthropicClient>, name: impl Into<String>) -> Self {
        Self {
            client,
            name: name.into(),
            model_override: None,
        }
    }

    /// Pin this provider to a fixed model id (fallback configuration).
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model_override = Some(model.into());
        self
    }
}

#[async_trait]
impl ModelProvider for AnthropicProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ProviderEventStream, CourierError> {
        let api_request = to_api_request(&request, self.model_override.as_deref());
        let sse_stream = self.client.stream_message(&api_request).await?;

        // Fold SSE events into provider events, buffering tool-use JSON.
        let adapted = sse_stream
            .scan(ToolAccumulator::default(), |accum, event| {
                let out = match event {
                    Ok(event) => accum.fold(event),
                    Err(e) => vec![Err(e)],
                };
                futures::future::ready(Some(out))
            })
            .flat_map(futures::stream::iter);
        Ok(Box::pin(adapted))
    }
}

#[derive(Default)]
struct ToolAccumulator {
    current: Option<(String, String, String)>,
}

impl ToolAccumulator {
    fn fold(&mut self, event: StreamEvent) -> Vec<Result<ProviderEvent, CourierError>> {
        match event {
            StreamEvent::ContentBlockStart(start) => {
                if let SseContentBlock::ToolUse { id, name } = start.content_block {
                    self.current = Some((id, name, String::new()));
                }
                Vec::new()
            }
            StreamEvent::ContentBlockDelta(delta) => match delta.delta {
                SseDelta::TextDelta { text } => vec![Ok(ProviderEvent::TextDelta(text))],
                SseDelta::InputJsonDelta { partial_json } => {
                    if let Some((_, _, buffer)) = self.current.as_mut() {
                        buffer.push_str(&partial_json);
                    }
                    Vec::new()
                }
                SseDelta::Unknown => Vec::new(),
            },
            StreamEvent::ContentBlockStop(_) => match self.current.take() {
                Some((id, name, buffer)) => {
                    let input: Value = if buffer.trim().is_empty() {
                        Value::Object(Default::default())
                    } else {
                        match serde_json::from_str(&buffer) {
                            Ok(value) => value,
                            Err(e) => {
                                warn!(tool = name.as_str(), error = %e, "unparseable tool input");
                                return vec![Err(CourierError::Provider {
                                    message: format!("model produced invalid tool input: {e}"),
                                    source: Some(Box::new(e)),
                                })];
                            }
                        }
                    };
                    vec![Ok(ProviderEvent::ToolUse { id, name, input })]
                }
                None => Vec::new(),
            },
            StreamEvent::MessageStop => vec![Ok(ProviderEvent::Stop { stop_reason: None })],
            StreamEvent::Error(error) => vec![Err(CourierError::Provider {
                message: format!(
                    "Anthropic stream error ({}): {}",
                    error.error.type_, error.error.message
                ),
                source: None,
            })],
            StreamEvent::MessageStart(_) | StreamEvent::MessageDelta(_) | StreamEvent::Ping => {
                Vec::new()
            }
        }
    }
}

/// Convert the runtime transcript into the API wire shape.
fn to_api_request(request: &ProviderRequest, model_override: Option<&str>) -> MessageRequest {
    let tools: Vec<ApiTool> = request
        .tools
        .iter()
        .map(|tool| ApiTool {
            name: tool.name.clone(),
            description: tool.description.clone(),
            input_schema: tool.input_schema.clone(),
        })
        .collect();

    MessageRequest {
        model: model_override.unwrap_or(&request.model).to_string(),
        messages: request.messages.iter().filter_map(to_api_message).collect(),
        system: Some(request.system.clone()),
        max_tokens: request.max_tokens,
        stream: true,
        tools: if tools.is_empty() { None } else { Some(tools) },
    }
}

fn to_api_message(message: &ProviderMessage) -> Option<ApiMessage> {
    // Tool results ride user-role messages on this API.
    let role = match message.role {
        Role::Assistant => "assistant",
        Role::User | Role::Tool => "user",
        // System text lives in the request's system field, not the
        // transcript.
        Role::System => return None,
    };

    let content: Vec<ContentBlock> = message
        .parts
        .iter()
        .filter_map(|part| match part {
            MessagePart::Text { text } => Some(ContentBlock::Text { text: text.clone() }),
            MessagePart::ToolCall { id, name, input } => Some(ContentBlock::ToolUse {
                id: id.clone(),
                name: name.clone(),
                input: input.clone(),
            }),
            MessagePart::ToolResult {
                tool_call_id,
                output,
                is_error,
                ..
            } => Some(ContentBlock::ToolResult {
                tool_use_id: tool_call_id.clone(),
                content: output.to_string(),
                is_error: *is_error,
            }),
            // Approval lifecycle markers surface to the model as text.
            MessagePart::ToolApprovalRequest { name, .. } => Some(ContentBlock::Text {
                text: format!("[awaiting user approval for {name}]"),
            }),
            MessagePart::ToolApprovalResponse { name, approved, .. } => {
                Some(ContentBlock::Text {
                    text: if *approved {
                        format!("[user approved the {name} action]")
                    } else {
                        format!("[user denied the {name} action]")
                    },
                })
            }
        })
        .collect();

    if content.is_empty() {
        return None;
    }
    Some(ApiMessage {
        role: role.to_string(),
        content,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::traits::provider::ToolSpec;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider_request() -> ProviderRequest {
        ProviderRequest {
            model: "claude-sonnet-4-20250514".into(),
            system: "be useful".into(),
            messages: vec![ProviderMessage {
                role: Role::User,
                parts: vec![MessagePart::Text {
                    text: "balance?".into(),
                }],
            }],
            tools: vec![ToolSpec {
                name: "getBalance".into(),
                description: "read a balance".into(),
                input_schema: json!({"type": "object"}),
            }],
            max_tokens: 1024,
        }
    }

    #[test]
    fn transcript_conversion_maps_roles_and_parts() {
        let request = ProviderRequest {
            messages: vec![
                ProviderMessage {
                    role: Role::Assistant,
                    parts: vec![
                        MessagePart::Text { text: "on it".into() },
                        MessagePart::ToolCall {
                            id: "tc-1".into(),
                            name: "getBalance".into(),
                            input: json!({"address": "EQabc"}),
                        },
                    ],
                },
                ProviderMessage {
                    role: Role::Tool,
                    parts: vec![MessagePart::ToolResult {
                        tool_call_id: "tc-1".into(),
                        name: "getBalance".into(),
                        output: json!({"balance": 12.4}),
                        is_error: false,
                    }],
                },
            ],
            ..provider_request()
        };
        let api = to_api_request(&request, None);
        assert_eq!(api.messages.len(), 2);
        assert_eq!(api.messages[0].role, "assistant");
        assert_eq!(api.messages[1].role, "user");
        assert!(matches!(
            api.messages[1].content[0],
            ContentBlock::ToolResult { .. }
        ));
    }

    #[test]
    fn model_override_pins_the_fallback_model() {
        let api = to_api_request(&provider_request(), Some("claude-haiku-4-5-20250901"));
        assert_eq!(api.model, "claude-haiku-4-5-20250901");
    }

    async fn sse_server(body: &str) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body.to_string()),
            )
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn stream_folds_text_and_tool_use() {
        let body = "event: content_block_start\ndata: {\"index\":0,\"content_block\":{\"type\":\"text\",\"text\":\"\"}}\n\n\
             event: content_block_delta\ndata: {\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Checking\"}}\n\n\
             event: content_block_stop\ndata: {\"index\":0}\n\n\
             event: content_block_start\ndata: {\"index\":1,\"content_block\":{\"type\":\"tool_use\",\"id\":\"tc-1\",\"name\":\"getBalance\"}}\n\n\
             event: content_block_delta\ndata: {\"index\":1,\"delta\":{\"type\":\"input_json_delta\",\"partial_json\":\"{\\\"address\\\":\"}}\n\n\
             event: content_block_delta\ndata: {\"index\":1,\"delta\":{\"type\":\"input_json_delta\",\"partial_json\":\"\\\"EQabc\\\"}\"}}\n\n\
             event: content_block_stop\ndata: {\"index\":1}\n\n\
             event: message_stop\ndata: {}\n\n";
        let server = sse_server(body).await;

        let client = Arc::new(
            AnthropicClient::new("key".into(), "2023-06-01".into())
                .unwrap()
                .with_base_url(server.uri()),
        );
        let provider = AnthropicProvider::new(client, "anthropic:primary");

        let mut stream = provider.stream(provider_request()).await.unwrap();
        let mut events = Vec::new();
        while let Some(event) = stream.next().await {
            events.push(event.unwrap());
        }

        assert!(matches!(&events[0], ProviderEvent::TextDelta(t) if t == "Checking"));
        match &events[1] {
            ProviderEvent::ToolUse { id, name, input } => {
                assert_eq!(id, "tc-1");
                assert_eq!(name, "getBalance");
                assert_eq!(input, &json!({"address": "EQabc"}));
            }
            other => panic!("expected tool use, got {other:?}"),
        }
        assert!(matches!(&events[2], ProviderEvent::Stop { .. }));
    }

    #[tokio::test]
    async fn empty_tool_input_becomes_an_empty_object() {
        let body = "event: content_block_start\ndata: {\"index\":0,\"content_block\":{\"type\":\"tool_use\",\"id\":\"tc-1\",\"name\":\"listTools\"}}\n\n\
             event: content_block_stop\ndata: {\"index\":0}\n\n\
             event: message_stop\ndata: {}\n\n";
        let server = sse_server(body).await;

        let client = Arc::new(
            AnthropicClient::new("key".into(), "2023-06-01".into())
                .unwrap()
                .with_base_url(server.uri()),
        );
        let provider = AnthropicProvider::new(client, "anthropic:primary");

        let mut stream = provider.stream(provider_request()).await.unwrap();
        let first = stream.next().await.unwrap().unwrap();
        match first {
            ProviderEvent::ToolUse { input, .. } => assert_eq!(input, json!({})),
            other => panic!("expected tool use, got {other:?}"),
        }
    }
}
