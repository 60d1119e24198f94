// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Queue handler for the `agent-turns` queue.
//!
//! One job = one turn. Lock contention and transient failures propagate
//! so the queue retries with backoff; on the final attempt the user gets
//! the single friendly failure line before the job dead-letters.

use std::sync::Arc;

use async_trait::async_trait;
use courier_approval::ApprovalEngine;
use courier_core::traits::chat::{ChatTransport, DraftSinkFactory, SendOptions};
use courier_core::types::TurnExecutionRequest;
use courier_core::CourierError;
use courier_queue::{Job, JobHandler};
use tracing::{info, warn};

use crate::executor::TurnExecutor;

/// Handles jobs from the `agent-turns` queue.
pub struct TurnJobHandler {
    executor: Arc<TurnExecutor>,
    engine: ApprovalEngine,
    transport: Arc<dyn ChatTransport>,
    drafts: Arc<dyn DraftSinkFactory>,
}

impl TurnJobHandler {
    pub fn new(
        executor: Arc<TurnExecutor>,
        engine: ApprovalEngine,
        transport: Arc<dyn ChatTransport>,
        drafts: Arc<dyn DraftSinkFactory>,
    ) -> Self {
        Self {
            executor,
            engine,
            transport,
            drafts,
        }
    }
}

#[async_trait]
impl JobHandler for TurnJobHandler {
    async fn handle(&self, job: &Job) -> Result<(), CourierError> {
        let request: TurnExecutionRequest = serde_json::from_str(&job.payload)
            .map_err(|e| CourierError::Validation(format!("bad turn payload: {e}")))?;

        let mut draft = self.drafts.create(request.chat_id, request.thread_id);
        let output = match self.executor.execute(&request, draft.as_mut()).await {
            Ok(output) => output,
            Err(e @ CourierError::LockContention { .. }) => {
                // Backpressure: the queue retries; the user sees nothing.
                info!(
                    correlation_id = request.correlation_id.0.as_str(),
                    "turn deferred on lock contention"
                );
                return Err(e);
            }
            Err(e) => {
                if job.attempts + 1 >= job.max_attempts {
                    let opts = SendOptions {
                        thread_id: request.thread_id,
                        ..Default::default()
                    };
                    if let Err(send_err) = self
                        .transport
                        .send_text(request.chat_id, CourierError::USER_FACING_FAILURE, opts)
                        .await
                    {
                        warn!(error = %send_err, "failure notice undeliverable");
                    }
                }
                return Err(e);
            }
        };

        if !output.delivered_via_draft && !output.text.trim().is_empty() {
            let opts = SendOptions {
                thread_id: request.thread_id,
                ..Default::default()
            };
            self.transport
                .send_text(request.chat_id, &output.text, opts)
                .await?;
        }

        for approval in &output.approvals {
            self.engine.present(self.transport.as_ref(), approval).await?;
        }
        Ok(())
    }
}
