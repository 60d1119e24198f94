// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Queue handler for the `updates` queue.
//!
//! One job = one stored update: decode, route, perform the returned
//! transport effects, and settle the update-store status. Malformed
//! payloads settle as `failed` instead of burning retries; transient
//! routing errors propagate so the queue retries.

use std::sync::Arc;

use async_trait::async_trait;
use courier_core::traits::chat::{ChatTransport, SendOptions};
use courier_core::types::UpdateStatus;
use courier_core::CourierError;
use courier_queue::{Job, JobHandler};
use courier_storage::queries::updates;
use courier_storage::Database;
use tracing::{debug, warn};

use crate::decode;
use crate::router::{Effect, Router};

/// Handles jobs from the `updates` queue.
pub struct UpdateJobHandler {
    db: Database,
    router: Arc<Router>,
    transport: Arc<dyn ChatTransport>,
}

impl UpdateJobHandler {
    pub fn new(db: Database, router: Arc<Router>, transport: Arc<dyn ChatTransport>) -> Self {
        Self {
            db,
            router,
            transport,
        }
    }

    async fn perform_effects(&self, effects: Vec<Effect>) {
        // Transport effects are best-effort: the routing outcome (jobs,
        // decisions, preference writes) is already durable.
        for effect in effects {
            let result = match effect {
                Effect::AnswerCallback {
                    callback_query_id,
                    text,
                } => {
                    self.transport
                        .answer_callback(&callback_query_id, text.as_deref())
                        .await
                }
                Effect::Reply {
                    chat_id,
                    thread_id,
                    text,
                    keyboard,
                } => {
                    let opts = SendOptions {
                        thread_id,
                        ..Default::default()
                    };
                    match keyboard {
                        Some(keyboard) => self
                            .transport
                            .send_with_keyboard(chat_id, &text, keyboard, opts)
                            .await
                            .map(|_| ()),
                        None => self
                            .transport
                            .send_text(chat_id, &text, opts)
                            .await
                            .map(|_| ()),
                    }
                }
                Effect::EditMessage {
                    chat_id,
                    message_id,
                    text,
                    keyboard,
                } => {
                    self.transport
                        .edit_text(chat_id, message_id, &text, keyboard)
                        .await
                }
            };
            if let Err(e) = result {
                warn!(error = %e, "routing effect failed");
            }
        }
    }
}

#[async_trait]
impl JobHandler for UpdateJobHandler {
    async fn handle(&self, job: &Job) -> Result<(), CourierError> {
        let decoded = match decode::decode(&job.payload) {
            Ok(Some(update)) => update,
            Ok(None) => {
                // Well-formed but uninteresting (media, reactions).
                debug!(job_id = job.job_id.as_str(), "non-routable update settled");
                if let Ok(update_id) = job.job_id.trim_start_matches("update-").parse::<i64>() {
                    updates::mark_status(&self.db, update_id, UpdateStatus::Processed, None)
                        .await?;
                }
                return Ok(());
            }
            Err(e) => {
                // Garbage never improves with retries.
                warn!(job_id = job.job_id.as_str(), error = %e, "undecodable update settled as failed");
                if let Ok(update_id) = job.job_id.trim_start_matches("update-").parse::<i64>() {
                    updates::mark_status(
                        &self.db,
                        update_id,
                        UpdateStatus::Failed,
                        Some(e.to_string()),
                    )
                    .await?;
                }
                return Ok(());
            }
        };

        let update_id = decoded.update_id();
        match self.router.route(&decoded).await {
            Ok(outcome) => {
                self.perform_effects(outcome.effects).await;
                updates::mark_status(&self.db, update_id, UpdateStatus::Processed, None).await?;
                Ok(())
            }
            Err(e) => {
                if job.attempts + 1 >= job.max_attempts {
                    updates::mark_status(
                        &self.db,
                        update_id,
                        UpdateStatus::Failed,
                        Some(e.to_string()),
                    )
                    .await?;
                }
                Err(e)
            }
        }
    }
}
