// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Approval engine: the state machine for sensitive tool calls.
//!
//! States run `requested -> {approved, denied, expired, failed}`;
//! terminal states are immutable (enforced in SQL, re-checked here).
//! Registration schedules two delayed jobs: an expiry firing at the TTL
//! and a countdown refresh that re-renders the pending card.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use courier_audit::{events, AuditLog, NewAuditEvent};
use courier_core::traits::chat::ChatTransport;
use courier_core::traits::kv::KvStore;
use courier_core::types::{ApprovalStatus, CorrelationId, RiskProfile};
use courier_core::CourierError;
use courier_queue::{names, EnqueueRequest, JobQueue};
use courier_storage::models::ApprovalRow;
use courier_storage::queries::approvals;
use courier_storage::{now_iso, Database};
use rand::Rng;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::cards;
use crate::risk::{self, RiskAssessment};

/// Approval time-to-live.
pub const APPROVAL_TTL: Duration = Duration::from_secs(300);
/// Countdown refresh cadence.
pub const COUNTDOWN_TICK: Duration = Duration::from_secs(30);
/// Cautious-mode double-tap confirmation window.
pub const CONFIRM_MARKER_TTL: Duration = Duration::from_secs(30);
/// Callback token length: URL-safe alphabet, uniformly random.
const CALLBACK_TOKEN_LEN: usize = 16;

const TOKEN_ALPHABET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

/// A user decision on a pending approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Deny,
}

impl Decision {
    fn terminal_status(self) -> ApprovalStatus {
        match self {
            Decision::Approve => ApprovalStatus::Approved,
            Decision::Deny => ApprovalStatus::Denied,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Decision::Approve => "approve",
            Decision::Deny => "deny",
        }
    }
}

/// Outcome of a decision attempt. State violations are user-visible and
/// non-fatal, so they are outcomes rather than errors.
#[derive(Debug, Clone)]
pub enum DecisionOutcome {
    /// The decision was applied; the approval is now terminal.
    Decided {
        approval: ApprovalRow,
        status: ApprovalStatus,
    },
    /// Cautious double-tap: the intent marker is set, a second tap
    /// within the window will complete the decision.
    NeedsConfirmation { window_secs: u64 },
    /// The approval was already in a terminal state.
    AlreadyDecided { status: ApprovalStatus },
    /// The TTL had passed; the approval is now `expired`.
    Expired,
}

/// Registers, decides, and expires approvals.
#[derive(Clone)]
pub struct ApprovalEngine {
    db: Database,
    kv: Arc<dyn KvStore>,
    queue: JobQueue,
    audit: AuditLog,
}

impl ApprovalEngine {
    pub fn new(db: Database, kv: Arc<dyn KvStore>, queue: JobQueue, audit: AuditLog) -> Self {
        Self {
            db,
            kv,
            queue,
            audit,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Register an approval for a tool call the executor parked behind
    /// consent. Persists the row, audits, and schedules the expiry and
    /// countdown jobs.
    #[allow(clippy::too_many_arguments)]
    pub async fn register(
        &self,
        session_id: &str,
        chat_id: i64,
        user_id: i64,
        tool_name: &str,
        tool_call_id: &str,
        input: &serde_json::Value,
        risk_profile: RiskProfile,
        correlation_id: &CorrelationId,
    ) -> Result<ApprovalRow, CourierError> {
        let assessment = risk::assess(tool_name, input, risk_profile);
        let id = format!("apr_{}", uuid::Uuid::new_v4().simple());
        let callback_token = generate_callback_token();
        let created_at = now_iso();
        let expires_at = iso_after(APPROVAL_TTL);

        let row = ApprovalRow {
            id: id.clone(),
            callback_token: callback_token.clone(),
            session_id: session_id.to_string(),
            chat_id,
            user_id,
            tool_name: tool_name.to_string(),
            tool_call_id: tool_call_id.to_string(),
            input: input.to_string(),
            risk_level: assessment.level,
            risk_confidence: assessment.confidence,
            status: ApprovalStatus::Requested,
            expires_at: expires_at.clone(),
            decided_by: None,
            decided_at: None,
            prompt_message_id: None,
            correlation_id: Some(correlation_id.0.clone()),
            created_at: created_at.clone(),
            updated_at: created_at,
        };
        approvals::insert_approval(&self.db, &row).await?;

        self.audit
            .append_best_effort(
                NewAuditEvent::system(
                    events::APPROVAL_REQUESTED,
                    json!({
                        "approval_id": id,
                        "tool": tool_name,
                        "risk_level": assessment.level.to_string(),
                        "risk_confidence": assessment.confidence.to_string(),
                        "expires_at": expires_at,
                    }),
                )
                .with_correlation_id(correlation_id.0.clone()),
            )
            .await;

        self.queue
            .enqueue(
                EnqueueRequest::new(
                    names::APPROVAL_TIMEOUTS,
                    format!("approval-expiry-{id}"),
                    json!({"approval_id": id}).to_string(),
                )
                .delayed(APPROVAL_TTL)
                .with_correlation_id(correlation_id.0.clone()),
            )
            .await?;
        self.queue
            .enqueue(
                EnqueueRequest::new(
                    names::APPROVAL_COUNTDOWNS,
                    format!("approval-countdown-{id}-1"),
                    json!({"approval_id": id, "tick": 1}).to_string(),
                )
                .delayed(COUNTDOWN_TICK)
                .with_correlation_id(correlation_id.0.clone()),
            )
            .await?;

        info!(
            approval_id = id.as_str(),
            tool = tool_name,
            risk = %assessment.level,
            "approval registered"
        );
        Ok(self
            .get(&id)
            .await?
            .ok_or_else(|| CourierError::Internal("approval vanished after insert".into()))?)
    }

    /// Post the prompt card and remember its message id for later edits.
    pub async fn present(
        &self,
        transport: &dyn ChatTransport,
        approval: &ApprovalRow,
    ) -> Result<(), CourierError> {
        let remaining = remaining_secs(&approval.expires_at);
        let text = cards::pending_text(approval, remaining);
        let message_id = transport
            .send_with_keyboard(
                approval.chat_id,
                &text,
                cards::keyboard(&approval.callback_token),
                Default::default(),
            )
            .await?;
        approvals::set_prompt_message_id(&self.db, &approval.id, message_id).await
    }

    /// Apply a user decision identified by the short callback token.
    pub async fn decide(
        &self,
        callback_token: &str,
        decision: Decision,
        decider_user_id: i64,
        risk_profile: RiskProfile,
    ) -> Result<DecisionOutcome, CourierError> {
        let Some(approval) = approvals::get_by_token(&self.db, callback_token).await? else {
            return Err(CourierError::Validation("unknown callback token".into()));
        };

        if approval.status.is_terminal() {
            return Ok(DecisionOutcome::AlreadyDecided {
                status: approval.status,
            });
        }

        if approval.expires_at <= now_iso() {
            self.expire_now(&approval).await?;
            return Ok(DecisionOutcome::Expired);
        }

        // Cautious double-tap: high-stakes approvals need two taps within
        // the marker window. Denials stay single-tap.
        if decision == Decision::Approve
            && risk_profile == RiskProfile::Cautious
            && approval.risk_level >= courier_core::types::RiskLevel::High
        {
            let marker = format!("approval:confirm:{}", approval.id);
            let fresh = self
                .kv
                .set_nx_px(&marker, "1", CONFIRM_MARKER_TTL)
                .await?;
            if fresh {
                debug!(approval_id = approval.id.as_str(), "confirmation marker set");
                return Ok(DecisionOutcome::NeedsConfirmation {
                    window_secs: CONFIRM_MARKER_TTL.as_secs(),
                });
            }
        }

        let status = decision.terminal_status();
        let applied = approvals::transition_from_requested(
            &self.db,
            &approval.id,
            status,
            Some(decider_user_id),
        )
        .await?;
        if !applied {
            let current = self
                .get(&approval.id)
                .await?
                .map(|a| a.status)
                .unwrap_or(ApprovalStatus::Failed);
            return Ok(DecisionOutcome::AlreadyDecided { status: current });
        }

        // Decision audit is security-critical: failure fails the caller.
        self.audit
            .append(
                NewAuditEvent::user(
                    decider_user_id,
                    events::APPROVAL_DECIDED,
                    json!({
                        "approval_id": approval.id,
                        "tool": approval.tool_name,
                        "decision": status.to_string(),
                    }),
                )
                .with_correlation_id(approval.correlation_id.clone().unwrap_or_default()),
            )
            .await?;

        let approval = self
            .get(&approval.id)
            .await?
            .ok_or_else(|| CourierError::Internal("approval vanished after decision".into()))?;
        info!(
            approval_id = approval.id.as_str(),
            decision = status.to_string().as_str(),
            decider = decider_user_id,
            "approval decided"
        );
        Ok(DecisionOutcome::Decided { approval, status })
    }

    /// Expiry worker entry: transition to `expired` if the approval is
    /// still pending past its deadline. Returns the row when a
    /// transition happened (so the caller can notify the user).
    pub async fn expire(&self, approval_id: &str) -> Result<Option<ApprovalRow>, CourierError> {
        let Some(approval) = self.get(approval_id).await? else {
            return Ok(None);
        };
        if approval.status.is_terminal() || approval.expires_at > now_iso() {
            return Ok(None);
        }
        self.expire_now(&approval).await?;
        self.get(approval_id).await
    }

    async fn expire_now(&self, approval: &ApprovalRow) -> Result<(), CourierError> {
        let applied = approvals::transition_from_requested(
            &self.db,
            &approval.id,
            ApprovalStatus::Expired,
            None,
        )
        .await?;
        if applied {
            self.audit
                .append_best_effort(
                    NewAuditEvent::system(
                        events::APPROVAL_EXPIRED,
                        json!({"approval_id": approval.id, "tool": approval.tool_name}),
                    )
                    .with_correlation_id(approval.correlation_id.clone().unwrap_or_default()),
                )
                .await;
            warn!(approval_id = approval.id.as_str(), "approval expired");
        }
        Ok(())
    }

    /// Load an approval by id.
    pub async fn get(&self, approval_id: &str) -> Result<Option<ApprovalRow>, CourierError> {
        approvals::get_by_id(&self.db, approval_id).await
    }

    /// Load an approval by callback token.
    pub async fn get_by_token(
        &self,
        callback_token: &str,
    ) -> Result<Option<ApprovalRow>, CourierError> {
        approvals::get_by_token(&self.db, callback_token).await
    }

    /// Risk assessment for an existing row (details toast).
    pub fn reassess(&self, approval: &ApprovalRow) -> RiskAssessment {
        let input = serde_json::from_str(&approval.input).unwrap_or(serde_json::Value::Null);
        risk::assess(&approval.tool_name, &input, RiskProfile::Balanced)
    }

    /// Schedule the next countdown tick for a still-pending approval.
    pub async fn schedule_countdown_tick(
        &self,
        approval: &ApprovalRow,
        next_tick: u64,
        delay: Duration,
    ) -> Result<(), CourierError> {
        self.queue
            .enqueue(
                EnqueueRequest::new(
                    names::APPROVAL_COUNTDOWNS,
                    format!("approval-countdown-{}-{next_tick}", approval.id),
                    json!({"approval_id": approval.id, "tick": next_tick}).to_string(),
                )
                .delayed(delay)
                .with_correlation_id(approval.correlation_id.clone().unwrap_or_default()),
            )
            .await?;
        Ok(())
    }
}

/// Uniformly random token over the URL-safe alphabet.
fn generate_callback_token() -> String {
    let mut rng = rand::thread_rng();
    (0..CALLBACK_TOKEN_LEN)
        .map(|_| {
            let idx = rng.gen_range(0..TOKEN_ALPHABET.len());
            TOKEN_ALPHABET[idx] as char
        })
        .collect()
}

fn iso_after(delay: Duration) -> String {
    (Utc::now() + chrono::Duration::from_std(delay).unwrap_or_default())
        .format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string()
}

/// Seconds until the stored expiry, clamped at zero.
pub fn remaining_secs(expires_at: &str) -> i64 {
    DateTime::parse_from_rfc3339(expires_at)
        .map(|deadline| (deadline.with_timezone(&Utc) - Utc::now()).num_seconds().max(0))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_kv::MemoryKv;
    use tempfile::tempdir;

    async fn setup() -> (ApprovalEngine, JobQueue, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        let queue = JobQueue::new(db.clone());
        let audit = AuditLog::new(db.clone());
        let engine = ApprovalEngine::new(db, Arc::new(MemoryKv::new()), queue.clone(), audit);
        (engine, queue, dir)
    }

    async fn register(engine: &ApprovalEngine) -> ApprovalRow {
        engine
            .register(
                "s-1",
                100,
                200,
                "sendMessage",
                "tc-1",
                &json!({"amount": 2.5}),
                RiskProfile::Balanced,
                &CorrelationId("corr-1".into()),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn register_persists_and_schedules_jobs() {
        let (engine, queue, _dir) = setup().await;
        let approval = register(&engine).await;

        assert!(approval.id.starts_with("apr_"));
        assert_eq!(approval.callback_token.len(), CALLBACK_TOKEN_LEN);
        assert_eq!(approval.status, ApprovalStatus::Requested);
        assert!(remaining_secs(&approval.expires_at) > 290);

        // Expiry and countdown jobs exist but are delayed.
        assert_eq!(queue.depth().await.unwrap(), 2);
        assert!(queue.dequeue(names::APPROVAL_TIMEOUTS).await.unwrap().is_none());
        assert!(queue.dequeue(names::APPROVAL_COUNTDOWNS).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn approve_within_ttl_transitions_and_audits() {
        let (engine, _queue, _dir) = setup().await;
        let approval = register(&engine).await;

        let outcome = engine
            .decide(&approval.callback_token, Decision::Approve, 200, RiskProfile::Balanced)
            .await
            .unwrap();
        match outcome {
            DecisionOutcome::Decided { approval, status } => {
                assert_eq!(status, ApprovalStatus::Approved);
                assert_eq!(approval.decided_by, Some(200));
            }
            other => panic!("expected decided, got {other:?}"),
        }

        // approval.requested then approval.decided, chain intact.
        let audit = AuditLog::new(engine.database().clone());
        let report = audit.verify_chain().await.unwrap();
        assert!(report.intact());
        assert_eq!(report.checked, 2);
    }

    #[tokio::test]
    async fn second_decision_reports_already_decided() {
        let (engine, _queue, _dir) = setup().await;
        let approval = register(&engine).await;

        engine
            .decide(&approval.callback_token, Decision::Approve, 200, RiskProfile::Balanced)
            .await
            .unwrap();
        let outcome = engine
            .decide(&approval.callback_token, Decision::Deny, 200, RiskProfile::Balanced)
            .await
            .unwrap();
        match outcome {
            DecisionOutcome::AlreadyDecided { status } => {
                assert_eq!(status, ApprovalStatus::Approved);
            }
            other => panic!("expected already-decided, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_token_is_a_validation_error() {
        let (engine, _queue, _dir) = setup().await;
        let result = engine
            .decide("tok_nope", Decision::Approve, 200, RiskProfile::Balanced)
            .await;
        assert!(matches!(result, Err(CourierError::Validation(_))));
    }

    #[tokio::test]
    async fn cautious_high_risk_needs_double_tap() {
        let (engine, _queue, _dir) = setup().await;
        let approval = register(&engine).await;

        let first = engine
            .decide(&approval.callback_token, Decision::Approve, 200, RiskProfile::Cautious)
            .await
            .unwrap();
        match first {
            DecisionOutcome::NeedsConfirmation { window_secs } => assert_eq!(window_secs, 30),
            other => panic!("expected confirmation request, got {other:?}"),
        }

        // Still pending after the first tap.
        let row = engine.get(&approval.id).await.unwrap().unwrap();
        assert_eq!(row.status, ApprovalStatus::Requested);

        let second = engine
            .decide(&approval.callback_token, Decision::Approve, 200, RiskProfile::Cautious)
            .await
            .unwrap();
        assert!(matches!(
            second,
            DecisionOutcome::Decided {
                status: ApprovalStatus::Approved,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn cautious_deny_is_single_tap() {
        let (engine, _queue, _dir) = setup().await;
        let approval = register(&engine).await;

        let outcome = engine
            .decide(&approval.callback_token, Decision::Deny, 200, RiskProfile::Cautious)
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            DecisionOutcome::Decided {
                status: ApprovalStatus::Denied,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn expired_approval_rejects_decisions() {
        let (engine, _queue, _dir) = setup().await;
        let approval = register(&engine).await;

        // Force the deadline into the past.
        engine
            .database()
            .connection()
            .call(|conn| {
                conn.execute(
                    "UPDATE approvals SET expires_at = '2020-01-01T00:00:00.000Z'",
                    [],
                )?;
                Ok(())
            })
            .await
            .unwrap();

        let outcome = engine
            .decide(&approval.callback_token, Decision::Approve, 200, RiskProfile::Balanced)
            .await
            .unwrap();
        assert!(matches!(outcome, DecisionOutcome::Expired));

        let row = engine.get(&approval.id).await.unwrap().unwrap();
        assert_eq!(row.status, ApprovalStatus::Expired);
    }

    #[tokio::test]
    async fn expire_is_a_noop_before_deadline_and_on_terminal_rows() {
        let (engine, _queue, _dir) = setup().await;
        let approval = register(&engine).await;

        // Before the deadline: nothing happens.
        assert!(engine.expire(&approval.id).await.unwrap().is_none());

        engine
            .decide(&approval.callback_token, Decision::Approve, 200, RiskProfile::Balanced)
            .await
            .unwrap();

        // Terminal: the late-firing expiry job must not disturb it.
        engine
            .database()
            .connection()
            .call(|conn| {
                conn.execute(
                    "UPDATE approvals SET expires_at = '2020-01-01T00:00:00.000Z'",
                    [],
                )?;
                Ok(())
            })
            .await
            .unwrap();
        assert!(engine.expire(&approval.id).await.unwrap().is_none());
        let row = engine.get(&approval.id).await.unwrap().unwrap();
        assert_eq!(row.status, ApprovalStatus::Approved);
    }

    #[test]
    fn callback_tokens_are_url_safe_and_distinct() {
        let a = generate_callback_token();
        let b = generate_callback_token();
        assert_eq!(a.len(), 16);
        assert_ne!(a, b);
        assert!(a
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }
}
