// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Approval workflow for sensitive tool calls.
//!
//! A tool call the executor parks behind consent becomes an approval:
//! a persisted state machine with a 5-minute TTL, an inline-keyboard
//! prompt card with a live countdown, a cautious-mode double-tap
//! confirmation, and a tamper-evident audit trail.

pub mod cards;
pub mod engine;
pub mod risk;
pub mod workers;

pub use engine::{
    remaining_secs, ApprovalEngine, Decision, DecisionOutcome, APPROVAL_TTL, CONFIRM_MARKER_TTL,
    COUNTDOWN_TICK,
};
pub use risk::{assess, RiskAssessment};
pub use workers::{CountdownJobHandler, ExpiryJobHandler};
