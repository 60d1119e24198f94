// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wire types for the Anthropic Messages API.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A Messages API request body.
#[derive(Debug, Clone, Serialize)]
pub struct MessageRequest {
    pub model: String,
    pub messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub max_tokens: u32,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ApiTool>>,
}

/// One conversation message.
#[derive(Debug, Clone, Serialize)]
pub struct ApiMessage {
    pub role: String,
    pub content: Vec<ContentBlock>,
}

/// A content block within a message.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
}

/// A tool declaration offered to the model.
#[derive(Debug, Clone, Serialize)]
pub struct ApiTool {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Error envelope returned by the API.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorResponse {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorDetail {
    #[serde(rename = "type")]
    pub type_: String,
    pub message: String,
}

// --- SSE event payloads ---

#[derive(Debug, Clone, Deserialize)]
pub struct SseMessageStart {
    pub message: SseMessageMeta,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SseMessageMeta {
    pub id: String,
    pub model: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SseContentBlockStart {
    pub index: usize,
    pub content_block: SseContentBlock,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SseContentBlock {
    Text {
        #[serde(default)]
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
    },
    /// Content-block kinds introduced by later API versions.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SseContentBlockDelta {
    pub index: usize,
    pub delta: SseDelta,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SseDelta {
    TextDelta { text: String },
    InputJsonDelta { partial_json: String },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SseContentBlockStop {
    pub index: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SseMessageDelta {
    #[serde(default)]
    pub delta: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SseError {
    pub error: ApiErrorDetail,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_serializes_with_tagged_content() {
        let request = MessageRequest {
            model: "claude-sonnet-4-20250514".into(),
            messages: vec![ApiMessage {
                role: "assistant".into(),
                content: vec![ContentBlock::ToolUse {
                    id: "tc-1".into(),
                    name: "getBalance".into(),
                    input: json!({"address": "EQabc"}),
                }],
            }],
            system: Some("be useful".into()),
            max_tokens: 1024,
            stream: true,
            tools: None,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["messages"][0]["content"][0]["type"], "tool_use");
        assert!(value.get("tools").is_none());
    }

    #[test]
    fn tool_result_omits_is_error_when_false() {
        let block = ContentBlock::ToolResult {
            tool_use_id: "tc-1".into(),
            content: "{}".into(),
            is_error: false,
        };
        let value = serde_json::to_value(&block).unwrap();
        assert!(value.get("is_error").is_none());
    }

    #[test]
    fn sse_delta_parses_both_kinds() {
        let text: SseDelta =
            serde_json::from_str(r#"{"type":"text_delta","text":"hi"}"#).unwrap();
        assert!(matches!(text, SseDelta::TextDelta { .. }));

        let json_delta: SseDelta =
            serde_json::from_str(r#"{"type":"input_json_delta","partial_json":"{\"a\""}"#)
                .unwrap();
        assert!(matches!(json_delta, SseDelta::InputJsonDelta { .. }));

        let unknown: SseDelta =
            serde_json::from_str(r#"{"type":"citation_delta"}"#).unwrap();
        assert!(matches!(unknown, SseDelta::Unknown));
    }
}
