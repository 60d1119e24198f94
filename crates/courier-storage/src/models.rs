// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Row types for storage entities.
//!
//! These represent rows in the SQLite database. Shared wire types
//! (statuses, message parts) live in `courier-core::types`.

use courier_core::types::{ApprovalStatus, RiskConfidence, RiskLevel, UpdateStatus};
use serde::{Deserialize, Serialize};

/// Idempotency record for an inbound transport update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedUpdate {
    /// Monotonically increasing external update id (primary key).
    pub update_id: i64,
    /// Raw platform payload, opaque JSON.
    pub payload: String,
    /// Current lifecycle status.
    pub status: UpdateStatus,
    /// Failure detail when status is `failed`.
    pub error: Option<String>,
    /// ISO 8601 first-ingest timestamp.
    pub received_at: String,
    /// ISO 8601 terminal-handling timestamp.
    pub handled_at: Option<String>,
}

/// A conversation session scoped by (chat, user, thread).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRow {
    pub id: String,
    pub chat_id: i64,
    pub user_id: i64,
    pub thread_id: Option<i64>,
    /// Opaque JSON state used by collaborator flows (wallet link, etc.).
    pub state: Option<String>,
    pub last_message_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// A single transcript message within a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRow {
    pub id: String,
    pub session_id: String,
    /// Role string: "system", "user", "assistant", "tool".
    pub role: String,
    /// JSON array of message parts.
    pub parts: String,
    pub correlation_id: Option<String>,
    pub created_at: String,
}

/// An approval gate for a sensitive tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRow {
    pub id: String,
    pub callback_token: String,
    pub session_id: String,
    pub chat_id: i64,
    pub user_id: i64,
    pub tool_name: String,
    pub tool_call_id: String,
    /// Full tool input payload, JSON.
    pub input: String,
    pub risk_level: RiskLevel,
    pub risk_confidence: RiskConfidence,
    pub status: ApprovalStatus,
    pub expires_at: String,
    pub decided_by: Option<i64>,
    pub decided_at: Option<String>,
    pub prompt_message_id: Option<i64>,
    pub correlation_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// A stored preference layer (user defaults or chat overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrefsRow {
    pub response_style: Option<String>,
    pub risk_profile: Option<String>,
    pub network: Option<String>,
}
