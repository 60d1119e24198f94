// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Decoding of raw platform update payloads into [`InboundUpdate`].
//!
//! The stored payload follows the Bot API update shape: a numeric
//! `update_id` plus either a `message` or a `callback_query` object.
//! Updates that carry neither (edits, reactions, member changes) decode
//! to `None` and are marked processed without routing.

use courier_core::types::{ChatKind, InboundUpdate};
use courier_core::CourierError;
use serde_json::Value;

/// Decode a stored payload. `Ok(None)` means a well-formed update the
/// router has no interest in.
pub fn decode(payload: &str) -> Result<Option<InboundUpdate>, CourierError> {
    let value: Value = serde_json::from_str(payload)
        .map_err(|e| CourierError::Validation(format!("malformed update payload: {e}")))?;

    let update_id = value
        .get("update_id")
        .and_then(Value::as_i64)
        .ok_or_else(|| CourierError::Validation("update payload missing update_id".into()))?;

    if let Some(callback) = value.get("callback_query") {
        return decode_callback(update_id, callback).map(Some);
    }
    if let Some(message) = value.get("message") {
        return Ok(decode_message(update_id, message));
    }
    Ok(None)
}

fn decode_callback(update_id: i64, callback: &Value) -> Result<InboundUpdate, CourierError> {
    let callback_query_id = callback
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| CourierError::Validation("callback_query missing id".into()))?
        .to_string();
    let user_id = callback
        .pointer("/from/id")
        .and_then(Value::as_i64)
        .ok_or_else(|| CourierError::Validation("callback_query missing from.id".into()))?;
    let chat_id = callback
        .pointer("/message/chat/id")
        .and_then(Value::as_i64)
        .ok_or_else(|| CourierError::Validation("callback_query missing message.chat.id".into()))?;
    let message_id = callback
        .pointer("/message/message_id")
        .and_then(Value::as_i64)
        .unwrap_or(0);
    let data = callback
        .get("data")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();

    Ok(InboundUpdate::Callback {
        update_id,
        chat_id,
        user_id,
        message_id,
        callback_query_id,
        data,
    })
}

fn decode_message(update_id: i64, message: &Value) -> Option<InboundUpdate> {
    let chat_id = message.pointer("/chat/id").and_then(Value::as_i64)?;
    let user_id = message.pointer("/from/id").and_then(Value::as_i64)?;
    // Non-text messages (stickers, media) are not routed.
    let text = message.get("text").and_then(Value::as_str)?.to_string();
    let thread_id = message.get("message_thread_id").and_then(Value::as_i64);
    let chat_kind = match message.pointer("/chat/type").and_then(Value::as_str) {
        Some("private") => ChatKind::Private,
        Some("channel") => ChatKind::Channel,
        Some(_) => ChatKind::Group,
        None => ChatKind::Private,
    };

    Some(InboundUpdate::Message {
        update_id,
        chat_id,
        user_id,
        thread_id,
        chat_kind,
        text,
    })
}
