// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SSE stream parser for Anthropic Messages API streaming responses.
//!
//! Converts a reqwest response byte stream into typed [`StreamEvent`]
//! variants using the `eventsource-stream` crate for SSE protocol
//! compliance.

use std::pin::Pin;

use courier_core::CourierError;
use eventsource_stream::Eventsource;
use futures::stream::{Stream, StreamExt};

use crate::types::{
    SseContentBlockDelta, SseContentBlockStart, SseContentBlockStop, SseError, SseMessageDelta,
    SseMessageStart,
};

/// Typed SSE events from the Anthropic streaming protocol.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// Initial message metadata (id, model).
    MessageStart(SseMessageStart),
    /// A new content block begins.
    ContentBlockStart(SseContentBlockStart),
    /// Incremental update to a content block (text delta, JSON delta).
    ContentBlockDelta(SseContentBlockDelta),
    /// A content block has finished.
    ContentBlockStop(SseContentBlockStop),
    /// Message-level delta (stop_reason, usage update).
    MessageDelta(SseMessageDelta),
    /// The message is complete.
    MessageStop,
    /// Keep-alive ping.
    Ping,
    /// API error during streaming.
    Error(SseError),
}

fn parse_err(event: &str, e: serde_json::Error) -> CourierError {
    CourierError::Provider {
        message: format!("failed to parse {event}: {e}"),
        source: Some(Box::new(e)),
    }
}

/// Parses a reqwest streaming response into a stream of typed
/// [`StreamEvent`]s.
///
/// Unknown event types are silently skipped per Anthropic's API
/// versioning policy.
pub fn parse_sse_stream(
    response: reqwest::Response,
) -> Pin<Box<dyn Stream<Item = Result<StreamEvent, CourierError>> + Send>> {
    let event_stream = response.bytes_stream().eventsource();

    let mapped = event_stream.filter_map(|result| async move {
        match result {
            Ok(event) => {
                let parsed = match event.event.as_str() {
                    "message_start" => serde_json::from_str::<SseMessageStart>(&event.data)
                        .map(StreamEvent::MessageStart)
                        .map_err(|e| parse_err("message_start", e)),
                    "content_block_start" => {
                        serde_json::from_str::<SseContentBlockStart>(&event.data)
                            .map(StreamEvent::ContentBlockStart)
                            .map_err(|e| parse_err("content_block_start", e))
                    }
                    "content_block_delta" => {
                        serde_json::from_str::<SseContentBlockDelta>(&event.data)
                            .map(StreamEvent::ContentBlockDelta)
                            .map_err(|e| parse_err("content_block_delta", e))
                    }
                    "content_block_stop" => {
                        serde_json::from_str::<SseContentBlockStop>(&event.data)
                            .map(StreamEvent::ContentBlockStop)
                            .map_err(|e| parse_err("content_block_stop", e))
                    }
                    "message_delta" => serde_json::from_str::<SseMessageDelta>(&event.data)
                        .map(StreamEvent::MessageDelta)
                        .map_err(|e| parse_err("message_delta", e)),
                    "message_stop" => Ok(StreamEvent::MessageStop),
                    "ping" => Ok(StreamEvent::Ping),
                    "error" => serde_json::from_str::<SseError>(&event.data)
                        .map(StreamEvent::Error)
                        .map_err(|e| parse_err("error", e)),
                    _ => return None,
                };
                Some(parsed)
            }
            Err(e) => Some(Err(CourierError::Provider {
                message: format!("SSE stream error: {e}"),
                source: None,
            })),
        }
    });

    Box::pin(mapped)
}
