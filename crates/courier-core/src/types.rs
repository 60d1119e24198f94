// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared across the Courier workspace.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumString};

/// Unique identifier for a conversation session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

/// Opaque identifier attached to every event of a single logical operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationId(pub String);

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle status of a persisted transport update.
///
/// Transitions are monotone along `received -> enqueued -> {processed, failed}`.
/// `received -> received` is permitted for recovery retries.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum UpdateStatus {
    Received,
    Enqueued,
    Processed,
    Failed,
}

/// Lifecycle status of an approval. Terminal states are immutable.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Requested,
    Approved,
    Denied,
    Expired,
    Failed,
}

impl ApprovalStatus {
    /// Returns true once no further status mutation is allowed.
    pub fn is_terminal(self) -> bool {
        !matches!(self, ApprovalStatus::Requested)
    }
}

/// Assessed risk of a sensitive tool call, ordered from low to critical.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// One level up, saturating at `Critical`.
    pub fn bumped(self) -> Self {
        match self {
            RiskLevel::Low => RiskLevel::Medium,
            RiskLevel::Medium => RiskLevel::High,
            RiskLevel::High | RiskLevel::Critical => RiskLevel::Critical,
        }
    }

    /// One level down, saturating at `Low`.
    pub fn lowered(self) -> Self {
        match self {
            RiskLevel::Low | RiskLevel::Medium => RiskLevel::Low,
            RiskLevel::High => RiskLevel::Medium,
            RiskLevel::Critical => RiskLevel::High,
        }
    }
}

/// How confident the risk heuristic is in its numeric extraction.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RiskConfidence {
    Low,
    Medium,
    High,
}

/// Per-user response verbosity preference.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize, Default,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ResponseStyle {
    #[default]
    Concise,
    Detailed,
}

/// Per-user risk appetite, consumed by the approval risk assessment.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize, Default,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RiskProfile {
    Cautious,
    #[default]
    Balanced,
    Advanced,
}

/// Message author role within a session transcript.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// Kind of chat a turn originates from. Non-private chats get a reduced
/// tool catalog.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize, Default,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ChatKind {
    #[default]
    Private,
    Group,
    Channel,
}

/// Structured preference set. `None` fields fall through to the next layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    pub response_style: Option<ResponseStyle>,
    pub risk_profile: Option<RiskProfile>,
    pub network: Option<String>,
}

/// Fully resolved preferences: chat override, then user default, then
/// the system default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectivePreferences {
    pub response_style: ResponseStyle,
    pub risk_profile: RiskProfile,
    pub network: String,
}

impl EffectivePreferences {
    /// Merge layers. `default_network` comes from configuration.
    pub fn resolve(
        chat: &Preferences,
        user: &Preferences,
        default_network: &str,
    ) -> Self {
        Self {
            response_style: chat
                .response_style
                .or(user.response_style)
                .unwrap_or_default(),
            risk_profile: chat.risk_profile.or(user.risk_profile).unwrap_or_default(),
            network: chat
                .network
                .clone()
                .or_else(|| user.network.clone())
                .unwrap_or_else(|| default_network.to_string()),
        }
    }
}

/// One structured part of a stored message.
///
/// Messages are sequences of parts so a single assistant turn can carry
/// text alongside tool calls and approval requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessagePart {
    Text {
        text: String,
    },
    ToolCall {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_call_id: String,
        name: String,
        output: Value,
        #[serde(default)]
        is_error: bool,
    },
    ToolApprovalRequest {
        tool_call_id: String,
        name: String,
        input: Value,
    },
    ToolApprovalResponse {
        approval_id: String,
        tool_call_id: String,
        name: String,
        approved: bool,
    },
}

impl MessagePart {
    /// Plain-text rendering used when replaying history to the model.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            MessagePart::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// The input half of an agent turn: either fresh user text or the
/// resolution of a previously requested approval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TurnInput {
    Text {
        text: String,
    },
    ApprovalResponse {
        approval_id: String,
        tool_call_id: String,
        tool_name: String,
        approved: bool,
    },
}

impl TurnInput {
    /// True when this turn resumes after an approval decision.
    pub fn is_approval_resume(&self) -> bool {
        matches!(self, TurnInput::ApprovalResponse { .. })
    }
}

/// Everything the agent turn executor needs to run one turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnExecutionRequest {
    pub correlation_id: CorrelationId,
    pub session_id: SessionId,
    pub chat_id: i64,
    pub user_id: i64,
    pub thread_id: Option<i64>,
    pub chat_kind: ChatKind,
    pub input: TurnInput,
    pub network: String,
    pub model: String,
    pub response_style: ResponseStyle,
    pub risk_profile: RiskProfile,
    pub wallet_address: Option<String>,
}

/// A transport update decoded into the shape the router consumes.
///
/// Transport adapters and the webhook both normalize raw platform
/// payloads into this sum before routing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InboundUpdate {
    Message {
        update_id: i64,
        chat_id: i64,
        user_id: i64,
        thread_id: Option<i64>,
        chat_kind: ChatKind,
        text: String,
    },
    Callback {
        update_id: i64,
        chat_id: i64,
        user_id: i64,
        message_id: i64,
        callback_query_id: String,
        data: String,
    },
}

impl InboundUpdate {
    pub fn update_id(&self) -> i64 {
        match self {
            InboundUpdate::Message { update_id, .. }
            | InboundUpdate::Callback { update_id, .. } => *update_id,
        }
    }

    pub fn chat_id(&self) -> i64 {
        match self {
            InboundUpdate::Message { chat_id, .. }
            | InboundUpdate::Callback { chat_id, .. } => *chat_id,
        }
    }

    pub fn user_id(&self) -> i64 {
        match self {
            InboundUpdate::Message { user_id, .. }
            | InboundUpdate::Callback { user_id, .. } => *user_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn update_status_round_trips_through_strings() {
        for status in [
            UpdateStatus::Received,
            UpdateStatus::Enqueued,
            UpdateStatus::Processed,
            UpdateStatus::Failed,
        ] {
            let s = status.to_string();
            assert_eq!(UpdateStatus::from_str(&s).unwrap(), status);
        }
    }

    #[test]
    fn approval_status_terminality() {
        assert!(!ApprovalStatus::Requested.is_terminal());
        assert!(ApprovalStatus::Approved.is_terminal());
        assert!(ApprovalStatus::Denied.is_terminal());
        assert!(ApprovalStatus::Expired.is_terminal());
        assert!(ApprovalStatus::Failed.is_terminal());
    }

    #[test]
    fn risk_level_bump_saturates() {
        assert_eq!(RiskLevel::Low.bumped(), RiskLevel::Medium);
        assert_eq!(RiskLevel::Critical.bumped(), RiskLevel::Critical);
        assert_eq!(RiskLevel::Low.lowered(), RiskLevel::Low);
        assert_eq!(RiskLevel::Critical.lowered(), RiskLevel::High);
    }

    #[test]
    fn risk_level_ordering() {
        assert!(RiskLevel::Low < RiskLevel::Medium);
        assert!(RiskLevel::High < RiskLevel::Critical);
    }

    #[test]
    fn effective_preferences_layering() {
        let chat = Preferences {
            risk_profile: Some(RiskProfile::Cautious),
            ..Default::default()
        };
        let user = Preferences {
            response_style: Some(ResponseStyle::Detailed),
            risk_profile: Some(RiskProfile::Advanced),
            network: Some("testnet".into()),
        };
        let effective = EffectivePreferences::resolve(&chat, &user, "mainnet");
        // Chat override wins for risk profile, user default for style/network.
        assert_eq!(effective.risk_profile, RiskProfile::Cautious);
        assert_eq!(effective.response_style, ResponseStyle::Detailed);
        assert_eq!(effective.network, "testnet");

        let effective =
            EffectivePreferences::resolve(&Preferences::default(), &Preferences::default(), "mainnet");
        assert_eq!(effective.response_style, ResponseStyle::Concise);
        assert_eq!(effective.risk_profile, RiskProfile::Balanced);
        assert_eq!(effective.network, "mainnet");
    }

    #[test]
    fn message_part_serialization_is_tagged() {
        let part = MessagePart::ToolApprovalRequest {
            tool_call_id: "tc-1".into(),
            name: "sendMessage".into(),
            input: serde_json::json!({"amount": 2.5}),
        };
        let json = serde_json::to_value(&part).unwrap();
        assert_eq!(json["type"], "tool_approval_request");
        let back: MessagePart = serde_json::from_value(json).unwrap();
        assert_eq!(back, part);
    }

    #[test]
    fn turn_input_approval_resume() {
        let text = TurnInput::Text { text: "hi".into() };
        assert!(!text.is_approval_resume());
        let resume = TurnInput::ApprovalResponse {
            approval_id: "apr_1".into(),
            tool_call_id: "tc-1".into(),
            tool_name: "sendMessage".into(),
            approved: true,
        };
        assert!(resume.is_approval_resume());
    }
}
