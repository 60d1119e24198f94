// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Queue handlers for the approval lifecycle jobs.
//!
//! The expiry handler fires once at the TTL; the countdown handler
//! re-renders the pending card every tick and re-enqueues itself until
//! the approval leaves `requested`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use courier_core::traits::chat::ChatTransport;
use courier_core::CourierError;
use courier_queue::{Job, JobHandler};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::cards;
use crate::engine::{remaining_secs, ApprovalEngine, COUNTDOWN_TICK};

#[derive(Debug, Deserialize)]
struct ExpiryPayload {
    approval_id: String,
}

#[derive(Debug, Deserialize)]
struct CountdownPayload {
    approval_id: String,
    tick: u64,
}

/// Fires at the approval TTL: transitions to `expired` and notifies.
pub struct ExpiryJobHandler {
    engine: ApprovalEngine,
    transport: Arc<dyn ChatTransport>,
}

impl ExpiryJobHandler {
    pub fn new(engine: ApprovalEngine, transport: Arc<dyn ChatTransport>) -> Self {
        Self { engine, transport }
    }
}

#[async_trait]
impl JobHandler for ExpiryJobHandler {
    async fn handle(&self, job: &Job) -> Result<(), CourierError> {
        let payload: ExpiryPayload = serde_json::from_str(&job.payload)
            .map_err(|e| CourierError::Validation(format!("bad expiry payload: {e}")))?;

        let Some(approval) = self.engine.expire(&payload.approval_id).await? else {
            debug!(
                approval_id = payload.approval_id.as_str(),
                "expiry fired on settled approval"
            );
            return Ok(());
        };

        // The state transition is durable; notification is best-effort.
        if let Some(message_id) = approval.prompt_message_id {
            if let Err(e) = self
                .transport
                .edit_text(
                    approval.chat_id,
                    message_id,
                    &cards::expired_text(&approval),
                    None,
                )
                .await
            {
                warn!(approval_id = approval.id.as_str(), error = %e, "expired-card edit failed");
            }
        }
        if let Err(e) = self
            .transport
            .send_text(
                approval.chat_id,
                &format!(
                    "⌛ The approval request for {} expired with no action taken.",
                    approval.tool_name
                ),
                Default::default(),
            )
            .await
        {
            warn!(approval_id = approval.id.as_str(), error = %e, "expiry notice failed");
        }
        Ok(())
    }
}

/// Refreshes the pending card's countdown and re-enqueues itself at
/// `min(tick, time-to-expiry)` until the approval settles.
pub struct CountdownJobHandler {
    engine: ApprovalEngine,
    transport: Arc<dyn ChatTransport>,
}

impl CountdownJobHandler {
    pub fn new(engine: ApprovalEngine, transport: Arc<dyn ChatTransport>) -> Self {
        Self { engine, transport }
    }
}

#[async_trait]
impl JobHandler for CountdownJobHandler {
    async fn handle(&self, job: &Job) -> Result<(), CourierError> {
        let payload: CountdownPayload = serde_json::from_str(&job.payload)
            .map_err(|e| CourierError::Validation(format!("bad countdown payload: {e}")))?;

        let Some(approval) = self.engine.get(&payload.approval_id).await? else {
            return Ok(());
        };
        if approval.status.is_terminal() {
            debug!(
                approval_id = approval.id.as_str(),
                status = %approval.status,
                "countdown stopped: approval settled"
            );
            return Ok(());
        }

        let remaining = remaining_secs(&approval.expires_at);
        if remaining <= 0 {
            // The expiry job owns the terminal transition.
            return Ok(());
        }

        if let Some(message_id) = approval.prompt_message_id {
            if let Err(e) = self
                .transport
                .edit_text(
                    approval.chat_id,
                    message_id,
                    &cards::pending_text(&approval, remaining),
                    Some(cards::keyboard(&approval.callback_token)),
                )
                .await
            {
                warn!(approval_id = approval.id.as_str(), error = %e, "countdown re-render failed");
            }
        }

        let delay = Duration::from_secs((remaining as u64).min(COUNTDOWN_TICK.as_secs()));
        self.engine
            .schedule_countdown_tick(&approval, payload.tick + 1, delay)
            .await
    }
}
