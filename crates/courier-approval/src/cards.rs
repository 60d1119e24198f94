// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Rendering of approval prompt cards.
//!
//! Cards are plain text plus an inline keyboard whose buttons carry
//! `ap:<token>:<action>` callback data. The countdown worker re-renders
//! the same card with the remaining time.

use courier_core::traits::chat::{Button, Keyboard};
use serde_json::Value;

use crate::risk::RiskAssessment;
use courier_storage::models::ApprovalRow;

/// Callback-data namespace for approval buttons.
pub const CALLBACK_PREFIX: &str = "ap";

fn callback_data(token: &str, action: &str) -> String {
    format!("{CALLBACK_PREFIX}:{token}:{action}")
}

/// Inline keyboard for a pending approval.
pub fn keyboard(callback_token: &str) -> Keyboard {
    Keyboard {
        rows: vec![
            vec![
                Button {
                    label: "✅ Approve".to_string(),
                    callback_data: callback_data(callback_token, "approve"),
                },
                Button {
                    label: "❌ Deny".to_string(),
                    callback_data: callback_data(callback_token, "deny"),
                },
            ],
            vec![Button {
                label: "Details".to_string(),
                callback_data: callback_data(callback_token, "details"),
            }],
        ],
    }
}

/// Card text for a pending approval with a live countdown.
pub fn pending_text(approval: &ApprovalRow, remaining_secs: i64) -> String {
    let mut lines = vec![
        "⚠️ Approval required".to_string(),
        format!("Tool: {}", approval.tool_name),
        format!("Risk: {} ({} confidence)", approval.risk_level, approval.risk_confidence),
    ];
    if let Some(summary) = input_summary(&approval.input) {
        lines.push(summary);
    }
    let minutes = remaining_secs.max(0) / 60;
    let seconds = remaining_secs.max(0) % 60;
    lines.push(format!("Expires in {minutes}:{seconds:02}"));
    lines.join("\n")
}

/// Card text after expiry (keyboard removed).
pub fn expired_text(approval: &ApprovalRow) -> String {
    format!(
        "⌛ Approval expired\nTool: {}\nNo action was taken.",
        approval.tool_name
    )
}

/// Card text after a decision.
pub fn decided_text(approval: &ApprovalRow, approved: bool) -> String {
    let verdict = if approved { "✅ Approved" } else { "❌ Denied" };
    format!("{verdict}\nTool: {}", approval.tool_name)
}

/// Detail text for the "Details" button toast.
pub fn details_text(approval: &ApprovalRow, risk: &RiskAssessment) -> String {
    let mut parts = vec![format!("Tool {}", approval.tool_name)];
    if let Some(value) = risk.value_estimate {
        parts.push(format!("value ≈ {value}"));
    }
    if let Some(gas) = risk.gas_estimate {
        parts.push(format!("gas ≈ {gas}"));
    }
    parts.join(", ")
}

/// One-line destination/amount summary from the raw input, best effort.
fn input_summary(input_json: &str) -> Option<String> {
    let input: Value = serde_json::from_str(input_json).ok()?;
    let obj = input.as_object()?;
    let mut fields = Vec::new();
    for key in ["to", "destination", "address", "recipient"] {
        if let Some(Value::String(dest)) = obj.get(key) {
            fields.push(format!("To: {dest}"));
            break;
        }
    }
    for key in ["amount", "value"] {
        if let Some(value) = obj.get(key) {
            fields.push(format!("Amount: {value}"));
            break;
        }
    }
    if fields.is_empty() {
        None
    } else {
        Some(fields.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::types::{ApprovalStatus, RiskConfidence, RiskLevel};

    fn approval() -> ApprovalRow {
        ApprovalRow {
            id: "apr_1".into(),
            callback_token: "tok_ABCDEF123456".into(),
            session_id: "s-1".into(),
            chat_id: 100,
            user_id: 200,
            tool_name: "sendMessage".into(),
            tool_call_id: "tc-1".into(),
            input: r#"{"to":"EQabc","amount":2.5}"#.into(),
            risk_level: RiskLevel::High,
            risk_confidence: RiskConfidence::Medium,
            status: ApprovalStatus::Requested,
            expires_at: "2026-01-01T00:05:00.000Z".into(),
            decided_by: None,
            decided_at: None,
            prompt_message_id: None,
            correlation_id: None,
            created_at: "2026-01-01T00:00:00.000Z".into(),
            updated_at: "2026-01-01T00:00:00.000Z".into(),
        }
    }

    #[test]
    fn keyboard_carries_token_in_callback_data() {
        let kb = keyboard("tok_ABCDEF123456");
        assert_eq!(kb.rows[0][0].callback_data, "ap:tok_ABCDEF123456:approve");
        assert_eq!(kb.rows[0][1].callback_data, "ap:tok_ABCDEF123456:deny");
        assert_eq!(kb.rows[1][0].callback_data, "ap:tok_ABCDEF123456:details");
    }

    #[test]
    fn pending_text_formats_countdown() {
        let text = pending_text(&approval(), 271);
        assert!(text.contains("Approval required"));
        assert!(text.contains("Tool: sendMessage"));
        assert!(text.contains("To: EQabc"));
        assert!(text.contains("Amount: 2.5"));
        assert!(text.contains("Expires in 4:31"));
    }

    #[test]
    fn pending_text_clamps_negative_remaining() {
        let text = pending_text(&approval(), -5);
        assert!(text.contains("Expires in 0:00"));
    }

    #[test]
    fn expired_and_decided_texts() {
        assert!(expired_text(&approval()).contains("expired"));
        assert!(decided_text(&approval(), true).starts_with("✅ Approved"));
        assert!(decided_text(&approval(), false).starts_with("❌ Denied"));
    }
}
