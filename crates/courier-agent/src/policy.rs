// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Response policy: rewrites raw model text before it reaches the user.
//!
//! The model is told not to re-ask for approval in plain text and not to
//! hand back bare completion phrases, but models drift. This pass makes
//! the guarantees hold regardless: approved protected actions always
//! surface as an explicit confirmation, and pending approvals are always
//! visible.

use courier_core::types::MessagePart;
use serde_json::Value;

/// Suffix appended whenever approvals are still pending after a turn.
const PENDING_SUFFIX: &str = "⏳ Approval pending — use the buttons above to decide.";

/// Phrases that count as a trivial completion on their own.
const TRIVIAL_PHRASES: &[&str] = &[
    "done",
    "completed",
    "all set",
    "ok",
    "okay",
    "finished",
    "request completed",
    "task complete",
];

/// Plain-text approval re-ask markers (lowercase containment).
const REASK_MARKERS: &[&str] = &[
    "do you approve",
    "please approve",
    "please confirm",
    "reply yes",
    "confirm this transaction",
    "shall i proceed",
    "approve this action",
];

/// Input to the policy pass.
#[derive(Debug, Clone, Default)]
pub struct PolicyInput<'a> {
    /// This turn resumed from an approval decision.
    pub approval_resume: bool,
    /// The resumed decision was an approval (vs a denial).
    pub approved: bool,
    /// Raw model text for the turn.
    pub raw_text: &'a str,
    /// Tool-result parts produced this turn.
    pub tool_results: &'a [MessagePart],
    /// Approvals registered this turn that are still pending.
    pub pending_approvals: usize,
    /// The user's original text request, when the turn had one.
    pub user_request: Option<&'a str>,
}

/// Outcome of the policy pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyOutcome {
    pub text: String,
    /// The approved-action confirmation was forced over the raw text.
    pub forced_approved_status: bool,
    /// A plain-text approval re-ask was detected and blocked.
    pub reask_blocked: bool,
}

/// Apply the policy.
pub fn apply(input: &PolicyInput<'_>) -> PolicyOutcome {
    let trimmed = input.raw_text.trim();
    let reask = is_plain_text_reask(trimmed);
    let trivial = trimmed.is_empty() || is_trivial_completion(trimmed);

    if input.approval_resume && input.approved && (trivial || reask) {
        let mut text = String::from("Approval received. Protected action executed.");
        if let Some(summary) = summarize_tool_results(input.tool_results) {
            text.push('\n');
            text.push_str(&summary);
        }
        return PolicyOutcome {
            text: with_pending_suffix(text, input.pending_approvals),
            forced_approved_status: true,
            reask_blocked: reask,
        };
    }

    // A pending approval means the request is NOT done; never claim
    // completion over it.
    if trivial && input.pending_approvals == 0 {
        if let Some(request) = input.user_request.filter(|r| !r.trim().is_empty()) {
            let text = format!("Done — I've handled your request: \"{}\"", request.trim());
            return PolicyOutcome {
                text: with_pending_suffix(text, input.pending_approvals),
                forced_approved_status: false,
                reask_blocked: false,
            };
        }
    }

    PolicyOutcome {
        text: with_pending_suffix(trimmed.to_string(), input.pending_approvals),
        forced_approved_status: false,
        reask_blocked: false,
    }
}

fn with_pending_suffix(text: String, pending: usize) -> String {
    if pending == 0 {
        return text;
    }
    if text.is_empty() {
        PENDING_SUFFIX.to_string()
    } else {
        format!("{text}\n\n{PENDING_SUFFIX}")
    }
}

fn is_trivial_completion(text: &str) -> bool {
    let normalized: String = text
        .to_lowercase()
        .chars()
        .filter(|c| !matches!(c, '.' | '!' | '✅' | '✔'))
        .collect();
    let normalized = normalized.trim();
    TRIVIAL_PHRASES.iter().any(|phrase| normalized == *phrase)
}

fn is_plain_text_reask(text: &str) -> bool {
    let lowered = text.to_lowercase();
    REASK_MARKERS.iter().any(|marker| lowered.contains(marker))
}

/// Destination and hash from this turn's tool results, when present.
fn summarize_tool_results(results: &[MessagePart]) -> Option<String> {
    let mut fields = Vec::new();
    for part in results {
        let MessagePart::ToolResult { output, .. } = part else {
            continue;
        };
        if let Some(dest) = first_string(output, &["to", "destination", "address", "recipient"]) {
            fields.push(format!("Destination: {dest}"));
        }
        if let Some(hash) = first_string(output, &["hash", "tx_hash", "txHash", "transaction_hash"])
        {
            fields.push(format!("Transaction: {hash}"));
        }
    }
    if fields.is_empty() {
        None
    } else {
        Some(fields.join("\n"))
    }
}

fn first_string(value: &Value, keys: &[&str]) -> Option<String> {
    let obj = value.as_object()?;
    keys.iter()
        .find_map(|key| obj.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tool_result(output: Value) -> MessagePart {
        MessagePart::ToolResult {
            tool_call_id: "tc-1".into(),
            name: "sendMessage".into(),
            output,
            is_error: false,
        }
    }

    #[test]
    fn approved_resume_with_empty_text_is_forced() {
        let results = vec![tool_result(json!({"to": "EQabc", "hash": "b16f"}))];
        let outcome = apply(&PolicyInput {
            approval_resume: true,
            approved: true,
            raw_text: "",
            tool_results: &results,
            ..Default::default()
        });
        assert!(outcome.text.starts_with("Approval received."));
        assert!(outcome.text.contains("Destination: EQabc"));
        assert!(outcome.text.contains("Transaction: b16f"));
        assert!(outcome.forced_approved_status);
        assert!(!outcome.reask_blocked);
    }

    #[test]
    fn approved_resume_with_trivial_text_is_forced() {
        for raw in ["done", "Done.", "All set!", "completed", "OK"] {
            let outcome = apply(&PolicyInput {
                approval_resume: true,
                approved: true,
                raw_text: raw,
                ..Default::default()
            });
            assert!(
                outcome.forced_approved_status,
                "{raw:?} should trigger the forced status"
            );
            assert!(outcome.text.starts_with("Approval received."));
        }
    }

    #[test]
    fn approved_resume_with_reask_is_blocked() {
        let outcome = apply(&PolicyInput {
            approval_resume: true,
            approved: true,
            raw_text: "The transfer is ready. Do you approve sending 2.5?",
            ..Default::default()
        });
        assert!(outcome.forced_approved_status);
        assert!(outcome.reask_blocked);
        assert!(outcome.text.starts_with("Approval received."));
    }

    #[test]
    fn approved_resume_with_substantive_text_passes_through() {
        let outcome = apply(&PolicyInput {
            approval_resume: true,
            approved: true,
            raw_text: "Sent 2.5 to EQabc. The transaction is confirmed on-chain.",
            ..Default::default()
        });
        assert!(!outcome.forced_approved_status);
        assert_eq!(
            outcome.text,
            "Sent 2.5 to EQabc. The transaction is confirmed on-chain."
        );
    }

    #[test]
    fn denied_resume_is_never_forced() {
        let outcome = apply(&PolicyInput {
            approval_resume: true,
            approved: false,
            raw_text: "done",
            ..Default::default()
        });
        assert!(!outcome.forced_approved_status);
    }

    #[test]
    fn pending_approvals_append_the_suffix() {
        let outcome = apply(&PolicyInput {
            raw_text: "I need your approval for the transfer.",
            pending_approvals: 1,
            ..Default::default()
        });
        assert!(outcome.text.ends_with(PENDING_SUFFIX));
    }

    #[test]
    fn trivial_text_with_a_real_request_gets_context() {
        let outcome = apply(&PolicyInput {
            raw_text: "done",
            user_request: Some("swap 1 for USDT"),
            ..Default::default()
        });
        assert_eq!(
            outcome.text,
            "Done — I've handled your request: \"swap 1 for USDT\""
        );
        assert!(!outcome.forced_approved_status);
    }

    #[test]
    fn pending_approvals_suppress_the_completion_synthesis() {
        let outcome = apply(&PolicyInput {
            raw_text: "",
            user_request: Some("send 2.5"),
            pending_approvals: 1,
            ..Default::default()
        });
        // Only the pending suffix: claiming completion would be a lie.
        assert_eq!(outcome.text, PENDING_SUFFIX);
    }

    #[test]
    fn ordinary_text_is_unchanged() {
        let outcome = apply(&PolicyInput {
            raw_text: "Your balance is 12.4.",
            ..Default::default()
        });
        assert_eq!(outcome.text, "Your balance is 12.4.");
        assert!(!outcome.forced_approved_status);
        assert!(!outcome.reask_blocked);
    }
}
