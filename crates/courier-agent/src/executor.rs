// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The agent turn executor.
//!
//! Runs one turn under the conversation lock: replays bounded history,
//! streams the model (primary, then fallback if nothing was emitted
//! yet), executes policy-wrapped tools, parks sensitive calls behind
//! approvals, and applies the response policy before surfacing text.
//!
//! Draft pushes are chained (each send awaits the previous) and error-
//! contained: a broken draft surface never fails the turn.

use std::str::FromStr;
use std::sync::Arc;

use courier_approval::ApprovalEngine;
use courier_audit::{events, AuditLog, NewAuditEvent};
use courier_core::traits::chat::DraftSink;
use courier_core::traits::provider::{
    ModelProvider, ProviderEvent, ProviderMessage, ProviderRequest, ToolSpec,
};
use courier_core::traits::tool::{Tool, ToolContext};
use courier_core::types::{ChatKind, MessagePart, Role, TurnExecutionRequest, TurnInput};
use courier_core::CourierError;
use courier_lock::ChatLockManager;
use courier_storage::models::{ApprovalRow, MessageRow};
use courier_storage::queries::{messages, sessions};
use courier_storage::{now_iso, Database};
use futures::StreamExt;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::policy::{self, PolicyInput};
use crate::prompt::{build_system_prompt, PromptParams};
use crate::toolwrap::{policy_catalog, ToolPolicy};

/// Upper bound on model/tool round-trips within one turn.
const MAX_TOOL_ITERATIONS: usize = 8;

/// The result of one executed turn.
#[derive(Debug)]
pub struct TurnOutput {
    /// Policy-processed text to surface.
    pub text: String,
    /// Approvals registered this turn (pending user decision).
    pub approvals: Vec<ApprovalRow>,
    /// The response policy forced the approved-action confirmation.
    pub forced_approved_status: bool,
    /// The draft surface already delivered the final text.
    pub delivered_via_draft: bool,
}

struct StreamOutcome {
    text: String,
    tool_calls: Vec<(String, String, Value)>,
}

/// Orchestrates LLM streaming and tool execution for agent turns.
pub struct TurnExecutor {
    db: Database,
    audit: AuditLog,
    approvals: ApprovalEngine,
    locks: ChatLockManager,
    primary: Arc<dyn ModelProvider>,
    fallback: Option<Arc<dyn ModelProvider>>,
    tools: Vec<Arc<dyn Tool>>,
    agent_name: String,
    max_tokens: u32,
}

impl TurnExecutor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Database,
        audit: AuditLog,
        approvals: ApprovalEngine,
        locks: ChatLockManager,
        primary: Arc<dyn ModelProvider>,
        fallback: Option<Arc<dyn ModelProvider>>,
        tools: Vec<Arc<dyn Tool>>,
        agent_name: String,
        max_tokens: u32,
    ) -> Self {
        Self {
            db,
            audit,
            approvals,
            locks,
            primary,
            fallback,
            tools,
            agent_name,
            max_tokens,
        }
    }

    /// Execute one turn. Lock contention propagates as a typed error so
    /// the queue retries the job (backpressure, not a user failure).
    pub async fn execute(
        &self,
        request: &TurnExecutionRequest,
        draft: &mut dyn DraftSink,
    ) -> Result<TurnOutput, CourierError> {
        let guard = self
            .locks
            .acquire(request.chat_id, request.thread_id)
            .await?;
        let result = self.run_locked(request, draft).await;
        guard.release().await;
        result
    }

    async fn run_locked(
        &self,
        request: &TurnExecutionRequest,
        draft: &mut dyn DraftSink,
    ) -> Result<TurnOutput, CourierError> {
        let catalog = policy_catalog(
            &self.tools,
            ToolPolicy {
                private_chat: request.chat_kind == ChatKind::Private,
            },
        );
        let tool_specs: Vec<ToolSpec> = catalog
            .iter()
            .map(|tool| ToolSpec {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                input_schema: tool.input_schema(),
            })
            .collect();
        let tool_ctx = ToolContext {
            chat_id: request.chat_id,
            session_id: request.session_id.0.clone(),
            network: request.network.clone(),
            wallet_address: request.wallet_address.clone(),
            correlation_id: request.correlation_id.clone(),
        };

        let mut transcript = self.load_history(&request.session_id.0).await?;

        // Materialize and persist the incoming message. Retried jobs
        // re-enter here: the correlation id tells us the message (and,
        // for an approval resume, the protected tool execution) already
        // happened, so neither runs twice.
        let incoming_role = match &request.input {
            TurnInput::Text { .. } => Role::User,
            TurnInput::ApprovalResponse { .. } => Role::Tool,
        };
        let already_persisted = messages::exists_with_correlation(
            &self.db,
            &request.session_id.0,
            &request.correlation_id.0,
            &incoming_role.to_string(),
        )
        .await?;

        let mut turn_tool_results: Vec<MessagePart> = Vec::new();
        if !already_persisted {
            let incoming_parts = match &request.input {
                TurnInput::Text { text } => vec![MessagePart::Text { text: text.clone() }],
                TurnInput::ApprovalResponse {
                    approval_id,
                    tool_call_id,
                    tool_name,
                    approved,
                } => {
                    // The resume executes the parked tool exactly once,
                    // so its result replays with the response part.
                    let result_part = self
                        .resolve_approval_tool(
                            approval_id,
                            tool_call_id,
                            tool_name,
                            *approved,
                            &catalog,
                            &tool_ctx,
                        )
                        .await?;
                    turn_tool_results.push(result_part.clone());
                    vec![
                        MessagePart::ToolApprovalResponse {
                            approval_id: approval_id.clone(),
                            tool_call_id: tool_call_id.clone(),
                            name: tool_name.clone(),
                            approved: *approved,
                        },
                        result_part,
                    ]
                }
            };
            self.persist_message(request, incoming_role, &incoming_parts)
                .await?;
            transcript.push(ProviderMessage {
                role: incoming_role,
                parts: incoming_parts,
            });
        }

        let system = build_system_prompt(&PromptParams {
            agent_name: &self.agent_name,
            network: &request.network,
            chat_kind: request.chat_kind,
            wallet_address: request.wallet_address.as_deref(),
            response_style: request.response_style,
            risk_profile: request.risk_profile,
        });

        let mut draft = ContainedDraft::new(draft);
        let mut full_text = String::new();
        let mut approval_request_parts: Vec<MessagePart> = Vec::new();

        for iteration in 0..MAX_TOOL_ITERATIONS {
            let outcome = self
                .stream_with_fallback(request, &system, &transcript, &tool_specs, &mut draft)
                .await?;

            let mut assistant_parts: Vec<MessagePart> = Vec::new();
            if !outcome.text.is_empty() {
                full_text.push_str(&outcome.text);
                assistant_parts.push(MessagePart::Text {
                    text: outcome.text.clone(),
                });
            }

            if outcome.tool_calls.is_empty() {
                if !assistant_parts.is_empty() {
                    self.persist_message(request, Role::Assistant, &assistant_parts)
                        .await?;
                }
                break;
            }

            let mut result_parts: Vec<MessagePart> = Vec::new();
            for (call_id, name, input) in outcome.tool_calls {
                assistant_parts.push(MessagePart::ToolCall {
                    id: call_id.clone(),
                    name: name.clone(),
                    input: input.clone(),
                });

                let Some(tool) = catalog.iter().find(|t| t.name() == name) else {
                    result_parts.push(MessagePart::ToolResult {
                        tool_call_id: call_id,
                        name: name.clone(),
                        output: json!({"error": format!("unknown tool {name}")}),
                        is_error: true,
                    });
                    continue;
                };

                if tool.needs_approval(&input) {
                    approval_request_parts.push(MessagePart::ToolApprovalRequest {
                        tool_call_id: call_id,
                        name,
                        input,
                    });
                    continue;
                }

                let result_part = match tool.execute(input, &tool_ctx).await {
                    Ok(output) => MessagePart::ToolResult {
                        tool_call_id: call_id,
                        name,
                        output,
                        is_error: false,
                    },
                    Err(e) => MessagePart::ToolResult {
                        tool_call_id: call_id,
                        name,
                        output: json!({"error": e.to_string()}),
                        is_error: true,
                    },
                };
                result_parts.push(result_part);
            }

            // Approval requests are assistant parts: the turn parks here.
            assistant_parts.extend(approval_request_parts.iter().cloned());
            self.persist_message(request, Role::Assistant, &assistant_parts)
                .await?;
            transcript.push(ProviderMessage {
                role: Role::Assistant,
                parts: assistant_parts,
            });

            if !result_parts.is_empty() {
                turn_tool_results.extend(result_parts.iter().cloned());
                self.persist_message(request, Role::Tool, &result_parts).await?;
                transcript.push(ProviderMessage {
                    role: Role::Tool,
                    parts: result_parts,
                });
            }

            if !approval_request_parts.is_empty() {
                break;
            }
            debug!(
                iteration,
                correlation_id = request.correlation_id.0.as_str(),
                "tool round complete"
            );
        }

        sessions::touch_last_message(&self.db, &request.session_id.0).await?;

        // Register parked calls with the approval engine.
        let mut registered = Vec::new();
        for part in &approval_request_parts {
            let MessagePart::ToolApprovalRequest {
                tool_call_id,
                name,
                input,
            } = part
            else {
                continue;
            };
            let approval = self
                .approvals
                .register(
                    &request.session_id.0,
                    request.chat_id,
                    request.user_id,
                    name,
                    tool_call_id,
                    input,
                    request.risk_profile,
                    &request.correlation_id,
                )
                .await?;
            registered.push(approval);
        }

        let (resume, approved) = match &request.input {
            TurnInput::ApprovalResponse { approved, .. } => (true, *approved),
            TurnInput::Text { .. } => (false, false),
        };
        let user_request = match &request.input {
            TurnInput::Text { text } => Some(text.as_str()),
            TurnInput::ApprovalResponse { .. } => None,
        };
        let outcome = policy::apply(&PolicyInput {
            approval_resume: resume,
            approved,
            raw_text: &full_text,
            tool_results: &turn_tool_results,
            pending_approvals: registered.len(),
            user_request,
        });
        if outcome.reask_blocked {
            self.audit
                .append_best_effort(
                    NewAuditEvent::system(events::REASK_BLOCKED, json!({"raw_text": full_text}))
                        .with_correlation_id(request.correlation_id.0.clone()),
                )
                .await;
        }

        let delivered_via_draft = if outcome.forced_approved_status {
            // The surfaced text diverges from the streamed draft; a
            // fresh send must carry it.
            let _ = draft.finish(None).await;
            false
        } else {
            draft.finish(Some(&outcome.text)).await
        };

        info!(
            correlation_id = request.correlation_id.0.as_str(),
            approvals = registered.len(),
            forced = outcome.forced_approved_status,
            "turn complete"
        );
        Ok(TurnOutput {
            text: outcome.text,
            approvals: registered,
            forced_approved_status: outcome.forced_approved_status,
            delivered_via_draft,
        })
    }

    /// Execute (or refuse) the tool call a decided approval parked.
    async fn resolve_approval_tool(
        &self,
        approval_id: &str,
        tool_call_id: &str,
        tool_name: &str,
        approved: bool,
        catalog: &[Arc<dyn Tool>],
        tool_ctx: &ToolContext,
    ) -> Result<MessagePart, CourierError> {
        if !approved {
            return Ok(MessagePart::ToolResult {
                tool_call_id: tool_call_id.to_string(),
                name: tool_name.to_string(),
                output: json!({"status": "denied_by_user"}),
                is_error: false,
            });
        }

        let Some(approval) = self.approvals.get(approval_id).await? else {
            return Err(CourierError::Validation(format!(
                "approval {approval_id} not found for resume"
            )));
        };
        let input: Value = serde_json::from_str(&approval.input).unwrap_or(Value::Null);

        let Some(tool) = catalog.iter().find(|t| t.name() == tool_name) else {
            return Ok(MessagePart::ToolResult {
                tool_call_id: tool_call_id.to_string(),
                name: tool_name.to_string(),
                output: json!({"error": format!("tool {tool_name} unavailable")}),
                is_error: true,
            });
        };

        Ok(match tool.execute(input, tool_ctx).await {
            Ok(output) => MessagePart::ToolResult {
                tool_call_id: tool_call_id.to_string(),
                name: tool_name.to_string(),
                output,
                is_error: false,
            },
            Err(e) => MessagePart::ToolResult {
                tool_call_id: tool_call_id.to_string(),
                name: tool_name.to_string(),
                output: json!({"error": e.to_string()}),
                is_error: true,
            },
        })
    }

    /// Stream one model round. Falls back to the configured secondary
    /// provider only when the primary failed before emitting anything:
    /// switching providers mid-stream would desync the draft.
    async fn stream_with_fallback(
        &self,
        request: &TurnExecutionRequest,
        system: &str,
        transcript: &[ProviderMessage],
        tools: &[ToolSpec],
        draft: &mut ContainedDraft<'_>,
    ) -> Result<StreamOutcome, CourierError> {
        let provider_request = ProviderRequest {
            model: request.model.clone(),
            system: system.to_string(),
            messages: transcript.to_vec(),
            tools: tools.to_vec(),
            max_tokens: self.max_tokens,
        };

        match self
            .stream_attempt(self.primary.as_ref(), &provider_request, draft)
            .await
        {
            Ok(outcome) => Ok(outcome),
            Err((error, emitted)) => {
                let Some(fallback) = &self.fallback else {
                    return Err(error);
                };
                if emitted {
                    warn!(
                        correlation_id = request.correlation_id.0.as_str(),
                        error = %error,
                        "mid-stream provider failure, fallback suppressed"
                    );
                    return Err(error);
                }

                // Fallback usage is security-relevant: audit or fail.
                self.audit
                    .append(
                        NewAuditEvent::system(
                            events::PROVIDER_FALLBACK,
                            json!({
                                "primaryProvider": self.primary.name(),
                                "fallbackProvider": fallback.name(),
                                "error": error.to_string(),
                            }),
                        )
                        .with_correlation_id(request.correlation_id.0.clone()),
                    )
                    .await?;
                warn!(
                    correlation_id = request.correlation_id.0.as_str(),
                    error = %error,
                    "primary provider failed pre-stream, trying fallback"
                );

                self.stream_attempt(fallback.as_ref(), &provider_request, draft)
                    .await
                    .map_err(|(error, _)| error)
            }
        }
    }

    async fn stream_attempt(
        &self,
        provider: &dyn ModelProvider,
        request: &ProviderRequest,
        draft: &mut ContainedDraft<'_>,
    ) -> Result<StreamOutcome, (CourierError, bool)> {
        let mut stream = provider
            .stream(request.clone())
            .await
            .map_err(|e| (e, false))?;

        let mut text = String::new();
        let mut tool_calls = Vec::new();
        let mut emitted = false;

        while let Some(event) = stream.next().await {
            match event {
                Ok(ProviderEvent::TextDelta(delta)) => {
                    emitted = true;
                    text.push_str(&delta);
                    draft.push_delta(&delta).await;
                }
                Ok(ProviderEvent::ToolUse { id, name, input }) => {
                    tool_calls.push((id, name, input));
                }
                Ok(ProviderEvent::Stop { .. }) => break,
                Err(e) => return Err((e, emitted)),
            }
        }

        Ok(StreamOutcome { text, tool_calls })
    }

    async fn load_history(&self, session_id: &str) -> Result<Vec<ProviderMessage>, CourierError> {
        let rows = messages::load_recent(&self.db, session_id, messages::DEFAULT_HISTORY_LIMIT)
            .await?;
        let mut history = Vec::with_capacity(rows.len());
        for row in rows {
            let Ok(role) = Role::from_str(&row.role) else {
                warn!(message_id = row.id.as_str(), "skipping message with unknown role");
                continue;
            };
            match serde_json::from_str::<Vec<MessagePart>>(&row.parts) {
                Ok(parts) => history.push(ProviderMessage { role, parts }),
                Err(e) => {
                    warn!(message_id = row.id.as_str(), error = %e, "skipping unparseable message")
                }
            }
        }
        Ok(history)
    }

    async fn persist_message(
        &self,
        request: &TurnExecutionRequest,
        role: Role,
        parts: &[MessagePart],
    ) -> Result<(), CourierError> {
        let parts_json = serde_json::to_string(parts)
            .map_err(|e| CourierError::Internal(format!("message serialization: {e}")))?;
        messages::append_message(
            &self.db,
            &MessageRow {
                id: uuid::Uuid::new_v4().to_string(),
                session_id: request.session_id.0.clone(),
                role: role.to_string(),
                parts: parts_json,
                correlation_id: Some(request.correlation_id.0.clone()),
                created_at: now_iso(),
            },
        )
        .await
    }
}

/// Error-contained draft wrapper: the first push failure disables the
/// sink for the rest of the turn instead of failing it.
struct ContainedDraft<'a> {
    inner: &'a mut dyn DraftSink,
    broken: bool,
}

impl<'a> ContainedDraft<'a> {
    fn new(inner: &'a mut dyn DraftSink) -> Self {
        Self {
            inner,
            broken: false,
        }
    }

    async fn push_delta(&mut self, delta: &str) {
        if self.broken {
            return;
        }
        if let Err(e) = self.inner.push_delta(delta).await {
            warn!(error = %e, "draft sink failed, disabling for this turn");
            self.broken = true;
        }
    }

    async fn finish(&mut self, final_text: Option<&str>) -> bool {
        if self.broken {
            return false;
        }
        match self.inner.finish(final_text).await {
            Ok(delivered) => delivered,
            Err(e) => {
                warn!(error = %e, "draft finish failed");
                false
            }
        }
    }
}
