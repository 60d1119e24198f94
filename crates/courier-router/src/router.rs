// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Update routing: callbacks, commands, and agent-turn admission.
//!
//! The router performs its own state mutations (preferences, sessions,
//! approval decisions, turn enqueues) and returns transport effects for
//! the caller to perform, so routing logic stays testable without a live
//! transport.

use std::sync::Arc;

use courier_approval::{cards, remaining_secs, ApprovalEngine, Decision, DecisionOutcome};
use courier_core::traits::chat::{Button, ChatTransport, Keyboard};
use courier_core::types::{
    ChatKind, CorrelationId, EffectivePreferences, InboundUpdate, SessionId,
    TurnExecutionRequest, TurnInput,
};
use courier_core::CourierError;
use courier_queue::{names, EnqueueRequest, JobQueue};
use courier_ratelimit::{reasons, RateLimiter};
use courier_storage::queries::{prefs, sessions};
use courier_storage::Database;
use tracing::{debug, info};

use crate::callback::{self, ApprovalAction, CallbackAction, SettingsSection, WalletAction};
use crate::commands::{self, Command};

/// A transport side effect the caller should perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Acknowledge a button callback, optionally with a toast.
    AnswerCallback {
        callback_query_id: String,
        text: Option<String>,
    },
    /// Send a text reply, optionally with an inline keyboard.
    Reply {
        chat_id: i64,
        thread_id: Option<i64>,
        text: String,
        keyboard: Option<Keyboard>,
    },
    /// Edit an existing message (approval card refresh/decision).
    EditMessage {
        chat_id: i64,
        message_id: i64,
        text: String,
        keyboard: Option<Keyboard>,
    },
}

/// What routing one update produced.
#[derive(Debug, Default)]
pub struct RouteOutcome {
    pub effects: Vec<Effect>,
    /// Correlation id of the turn job this update enqueued, if any.
    pub turn_enqueued: Option<CorrelationId>,
}

impl RouteOutcome {
    fn with_effect(effect: Effect) -> Self {
        Self {
            effects: vec![effect],
            turn_enqueued: None,
        }
    }
}

/// Static configuration the router needs.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Primary model id stamped into turn requests.
    pub model: String,
    /// Network used when no preference layer sets one.
    pub default_network: String,
    /// Create forum topics for thread-less group turns.
    pub topic_auto_create: bool,
}

/// Routes stored updates into commands, callbacks, or agent turns.
pub struct Router {
    db: Database,
    queue: JobQueue,
    limiter: Arc<RateLimiter>,
    approvals: ApprovalEngine,
    config: RouterConfig,
    /// Used only for optional forum-topic auto-create.
    transport: Option<Arc<dyn ChatTransport>>,
}

impl Router {
    pub fn new(
        db: Database,
        queue: JobQueue,
        limiter: Arc<RateLimiter>,
        approvals: ApprovalEngine,
        config: RouterConfig,
        transport: Option<Arc<dyn ChatTransport>>,
    ) -> Self {
        Self {
            db,
            queue,
            limiter,
            approvals,
            config,
            transport,
        }
    }

    /// Route one decoded update. Callbacks win over text.
    pub async fn route(&self, update: &InboundUpdate) -> Result<RouteOutcome, CourierError> {
        match update {
            InboundUpdate::Callback {
                callback_query_id,
                user_id,
                chat_id,
                data,
                ..
            } => {
                self.route_callback(callback_query_id, *user_id, *chat_id, data)
                    .await
            }
            InboundUpdate::Message {
                update_id,
                chat_id,
                user_id,
                thread_id,
                chat_kind,
                text,
            } => {
                self.route_message(*update_id, *chat_id, *user_id, *thread_id, *chat_kind, text)
                    .await
            }
        }
    }

    async fn route_callback(
        &self,
        callback_query_id: &str,
        user_id: i64,
        chat_id: i64,
        data: &str,
    ) -> Result<RouteOutcome, CourierError> {
        let Some(action) = callback::parse(data) else {
            debug!(data, "ignoring foreign callback payload");
            return Ok(RouteOutcome::with_effect(Effect::AnswerCallback {
                callback_query_id: callback_query_id.to_string(),
                text: None,
            }));
        };

        match action {
            CallbackAction::Approval { token, action } => {
                self.route_approval_callback(callback_query_id, user_id, chat_id, &token, action)
                    .await
            }
            CallbackAction::Settings {
                section,
                target,
                value,
            } => {
                let applied = self
                    .apply_setting(user_id, chat_id, section, &target, &value)
                    .await?;
                let toast = if applied { "Saved." } else { "Unknown setting." };
                Ok(RouteOutcome::with_effect(Effect::AnswerCallback {
                    callback_query_id: callback_query_id.to_string(),
                    text: Some(toast.to_string()),
                }))
            }
            CallbackAction::Wallet { action, session_id } => {
                let toast = self.apply_wallet_action(action, &session_id).await?;
                Ok(RouteOutcome::with_effect(Effect::AnswerCallback {
                    callback_query_id: callback_query_id.to_string(),
                    text: Some(toast),
                }))
            }
        }
    }

    async fn route_approval_callback(
        &self,
        callback_query_id: &str,
        user_id: i64,
        chat_id: i64,
        token: &str,
        action: ApprovalAction,
    ) -> Result<RouteOutcome, CourierError> {
        let ack = |text: Option<String>| Effect::AnswerCallback {
            callback_query_id: callback_query_id.to_string(),
            text,
        };

        match action {
            ApprovalAction::Details => {
                let Some(approval) = self.approvals.get_by_token(token).await? else {
                    return Ok(RouteOutcome::with_effect(ack(Some(
                        "Unknown approval.".to_string(),
                    ))));
                };
                let assessment = self.approvals.reassess(&approval);
                Ok(RouteOutcome::with_effect(ack(Some(cards::details_text(
                    &approval,
                    &assessment,
                )))))
            }
            ApprovalAction::Refresh => {
                let Some(approval) = self.approvals.get_by_token(token).await? else {
                    return Ok(RouteOutcome::with_effect(ack(Some(
                        "Unknown approval.".to_string(),
                    ))));
                };
                let mut outcome = RouteOutcome::with_effect(ack(None));
                let remaining = remaining_secs(&approval.expires_at);
                if !approval.status.is_terminal() && remaining > 0 {
                    if let Some(message_id) = approval.prompt_message_id {
                        outcome.effects.push(Effect::EditMessage {
                            chat_id: approval.chat_id,
                            message_id,
                            text: cards::pending_text(&approval, remaining),
                            keyboard: Some(cards::keyboard(&approval.callback_token)),
                        });
                    }
                }
                Ok(outcome)
            }
            ApprovalAction::Approve | ApprovalAction::Deny => {
                let decision = if action == ApprovalAction::Approve {
                    Decision::Approve
                } else {
                    Decision::Deny
                };
                let preferences = self.effective_preferences(chat_id, user_id).await?;
                let outcome = match self
                    .approvals
                    .decide(token, decision, user_id, preferences.risk_profile)
                    .await
                {
                    Ok(outcome) => outcome,
                    Err(CourierError::Validation(_)) => {
                        // Stale or forged token: user-visible, never retried.
                        return Ok(RouteOutcome::with_effect(ack(Some(
                            "Unknown approval.".to_string(),
                        ))));
                    }
                    Err(e) => return Err(e),
                };

                match outcome {
                    DecisionOutcome::NeedsConfirmation { window_secs } => {
                        Ok(RouteOutcome::with_effect(ack(Some(format!(
                            "High-risk action: tap Approve again within {window_secs} s to confirm."
                        )))))
                    }
                    DecisionOutcome::AlreadyDecided { status } => {
                        Ok(RouteOutcome::with_effect(ack(Some(format!(
                            "Already {status}."
                        )))))
                    }
                    DecisionOutcome::Expired => Ok(RouteOutcome::with_effect(ack(Some(
                        "This approval has expired.".to_string(),
                    )))),
                    DecisionOutcome::Decided { approval, status } => {
                        let approved = status == courier_core::types::ApprovalStatus::Approved;
                        let mut effects = vec![ack(Some(if approved {
                            "Approved.".to_string()
                        } else {
                            "Denied.".to_string()
                        }))];
                        if let Some(message_id) = approval.prompt_message_id {
                            effects.push(Effect::EditMessage {
                                chat_id: approval.chat_id,
                                message_id,
                                text: cards::decided_text(&approval, approved),
                                keyboard: None,
                            });
                        }

                        // The decision synthesizes a follow-up turn so the
                        // agent can resume with the approval response.
                        let correlation_id = self
                            .enqueue_approval_resume_turn(&approval, approved, &preferences)
                            .await?;
                        Ok(RouteOutcome {
                            effects,
                            turn_enqueued: Some(correlation_id),
                        })
                    }
                }
            }
        }
    }

    async fn enqueue_approval_resume_turn(
        &self,
        approval: &courier_storage::models::ApprovalRow,
        approved: bool,
        preferences: &EffectivePreferences,
    ) -> Result<CorrelationId, CourierError> {
        let session = sessions::get_session(&self.db, &approval.session_id)
            .await?
            .ok_or_else(|| {
                CourierError::Internal(format!(
                    "approval {} references missing session {}",
                    approval.id, approval.session_id
                ))
            })?;

        let correlation_id = CorrelationId(uuid::Uuid::new_v4().to_string());
        let request = TurnExecutionRequest {
            correlation_id: correlation_id.clone(),
            session_id: SessionId(session.id.clone()),
            chat_id: session.chat_id,
            user_id: session.user_id,
            thread_id: session.thread_id,
            chat_kind: ChatKind::Private,
            input: TurnInput::ApprovalResponse {
                approval_id: approval.id.clone(),
                tool_call_id: approval.tool_call_id.clone(),
                tool_name: approval.tool_name.clone(),
                approved,
            },
            network: preferences.network.clone(),
            model: self.config.model.clone(),
            response_style: preferences.response_style,
            risk_profile: preferences.risk_profile,
            wallet_address: wallet_address_from_state(session.state.as_deref()),
        };
        let payload = serde_json::to_string(&request)
            .map_err(|e| CourierError::Internal(format!("turn request serialization: {e}")))?;
        self.queue
            .enqueue(
                EnqueueRequest::new(
                    names::AGENT_TURNS,
                    format!("turn-approval-{}", approval.id),
                    payload,
                )
                .with_correlation_id(correlation_id.0.clone()),
            )
            .await?;
        info!(
            approval_id = approval.id.as_str(),
            correlation_id = correlation_id.0.as_str(),
            "approval resume turn enqueued"
        );
        Ok(correlation_id)
    }

    async fn route_message(
        &self,
        update_id: i64,
        chat_id: i64,
        user_id: i64,
        thread_id: Option<i64>,
        chat_kind: ChatKind,
        text: &str,
    ) -> Result<RouteOutcome, CourierError> {
        // Anti-flood applies to every inbound text message.
        let flood = self.limiter.check_chat_flood(chat_id).await;
        if !flood.allowed {
            if self
                .limiter
                .should_notify(user_id, reasons::CHAT_MINUTE)
                .await
            {
                return Ok(RouteOutcome::with_effect(Effect::Reply {
                    chat_id,
                    thread_id,
                    text: "This chat is sending messages too quickly. Please slow down."
                        .to_string(),
                    keyboard: None,
                }));
            }
            return Ok(RouteOutcome::default());
        }

        if let Some(command) = commands::parse(text) {
            return self.route_command(chat_id, user_id, thread_id, command).await;
        }

        // All other text: user-turn quota.
        let decision = self.limiter.check_user_turn(user_id).await;
        if !decision.allowed {
            let reason = decision.reason.as_deref().unwrap_or("rate_limited");
            if self.limiter.should_notify(user_id, reason).await {
                return Ok(RouteOutcome::with_effect(Effect::Reply {
                    chat_id,
                    thread_id,
                    text: rate_limit_notice(&decision),
                    keyboard: None,
                }));
            }
            return Ok(RouteOutcome::default());
        }

        // Optional topic assignment for thread-less group turns.
        let thread_id = match (thread_id, chat_kind, &self.transport) {
            (None, ChatKind::Group, Some(transport)) if self.config.topic_auto_create => {
                transport
                    .create_forum_topic(chat_id, &topic_name_from_text(text))
                    .await
                    .unwrap_or_default()
            }
            (thread, _, _) => thread,
        };

        let candidate_id = format!("sess_{}", uuid::Uuid::new_v4().simple());
        let session =
            sessions::find_or_create(&self.db, &candidate_id, chat_id, user_id, thread_id).await?;
        let preferences = self.effective_preferences(chat_id, user_id).await?;

        let correlation_id = CorrelationId(uuid::Uuid::new_v4().to_string());
        let request = TurnExecutionRequest {
            correlation_id: correlation_id.clone(),
            session_id: SessionId(session.id.clone()),
            chat_id,
            user_id,
            thread_id,
            chat_kind,
            input: TurnInput::Text {
                text: text.to_string(),
            },
            network: preferences.network.clone(),
            model: self.config.model.clone(),
            response_style: preferences.response_style,
            risk_profile: preferences.risk_profile,
            wallet_address: wallet_address_from_state(session.state.as_deref()),
        };
        let payload = serde_json::to_string(&request)
            .map_err(|e| CourierError::Internal(format!("turn request serialization: {e}")))?;
        self.queue
            .enqueue(
                EnqueueRequest::new(names::AGENT_TURNS, format!("turn-update-{update_id}"), payload)
                    .with_correlation_id(correlation_id.0.clone()),
            )
            .await?;

        debug!(
            update_id,
            session_id = session.id.as_str(),
            correlation_id = correlation_id.0.as_str(),
            "agent turn enqueued"
        );
        Ok(RouteOutcome {
            effects: Vec::new(),
            turn_enqueued: Some(correlation_id),
        })
    }

    async fn route_command(
        &self,
        chat_id: i64,
        user_id: i64,
        thread_id: Option<i64>,
        command: Command,
    ) -> Result<RouteOutcome, CourierError> {
        let reply = |text: String, keyboard: Option<Keyboard>| {
            RouteOutcome::with_effect(Effect::Reply {
                chat_id,
                thread_id,
                text,
                keyboard,
            })
        };

        match command {
            Command::Start => Ok(reply(
                "Hi! Send me a message and I will get to work. \
                 Sensitive actions always wait for your explicit approval."
                    .to_string(),
                None,
            )),
            Command::Settings => {
                let preferences = self.effective_preferences(chat_id, user_id).await?;
                Ok(reply(
                    format!(
                        "Your settings\nStyle: {}\nRisk profile: {}\nNetwork: {}",
                        preferences.response_style,
                        preferences.risk_profile,
                        preferences.network
                    ),
                    Some(settings_keyboard()),
                ))
            }
            Command::Network => {
                let preferences = self.effective_preferences(chat_id, user_id).await?;
                Ok(reply(
                    format!("Current network: {}", preferences.network),
                    Some(network_keyboard()),
                ))
            }
            Command::Wallet(sub) => {
                let session = sessions::find_by_scope(&self.db, chat_id, user_id, thread_id).await?;
                let linked = session
                    .as_ref()
                    .and_then(|s| wallet_address_from_state(s.state.as_deref()));
                let text = match (sub.as_deref(), linked) {
                    (_, Some(address)) => format!("Linked wallet: {address}"),
                    (Some("status"), None) | (None, None) => {
                        "No wallet linked. Use /wallet link to start.".to_string()
                    }
                    (Some("link"), None) => {
                        "Wallet linking starts in your wallet app; I will confirm here."
                            .to_string()
                    }
                    (Some(other), None) => format!("Unknown wallet subcommand: {other}"),
                };
                Ok(reply(text, None))
            }
            Command::Cancel => {
                if let Some(session) =
                    sessions::find_by_scope(&self.db, chat_id, user_id, thread_id).await?
                {
                    sessions::update_state(&self.db, &session.id, None).await?;
                }
                Ok(reply("Cancelled.".to_string(), None))
            }
        }
    }

    async fn apply_setting(
        &self,
        user_id: i64,
        chat_id: i64,
        section: SettingsSection,
        target: &str,
        value: &str,
    ) -> Result<bool, CourierError> {
        let Some(field) = prefs::PrefField::parse(target) else {
            return Ok(false);
        };
        match section {
            SettingsSection::User => {
                prefs::set_user_pref(&self.db, user_id, field, Some(value.to_string())).await?
            }
            SettingsSection::Chat => {
                prefs::set_chat_pref(&self.db, chat_id, field, Some(value.to_string())).await?
            }
        }
        Ok(true)
    }

    async fn apply_wallet_action(
        &self,
        action: WalletAction,
        session_id: &str,
    ) -> Result<String, CourierError> {
        let Some(session) = sessions::get_session(&self.db, session_id).await? else {
            return Ok("Unknown session.".to_string());
        };
        match action {
            WalletAction::Status => {
                Ok(match wallet_address_from_state(session.state.as_deref()) {
                    Some(address) => format!("Linked wallet: {address}"),
                    None => "No wallet linked yet.".to_string(),
                })
            }
            WalletAction::Cancel => {
                sessions::update_state(&self.db, session_id, None).await?;
                Ok("Wallet linking cancelled.".to_string())
            }
        }
    }

    async fn effective_preferences(
        &self,
        chat_id: i64,
        user_id: i64,
    ) -> Result<EffectivePreferences, CourierError> {
        let chat = prefs::get_chat_prefs(&self.db, chat_id).await?;
        let user = prefs::get_user_prefs(&self.db, user_id).await?;
        Ok(EffectivePreferences::resolve(
            &chat,
            &user,
            &self.config.default_network,
        ))
    }
}

/// Extract the linked wallet address from a session's opaque state.
fn wallet_address_from_state(state: Option<&str>) -> Option<String> {
    let state: serde_json::Value = serde_json::from_str(state?).ok()?;
    state
        .get("wallet_address")
        .and_then(serde_json::Value::as_str)
        .map(str::to_string)
}

/// User-facing text for a denial, with window-appropriate detail.
fn rate_limit_notice(decision: &courier_ratelimit::RateDecision) -> String {
    match decision.reason.as_deref() {
        Some(reasons::USER_DAILY) => {
            let resets = decision.resets_at_utc.as_deref().unwrap_or("midnight UTC");
            format!("You have reached today's message limit. It resets at {resets}.")
        }
        _ => {
            let wait = decision.retry_after_seconds.unwrap_or(5);
            format!("You are sending messages too quickly. Try again in {wait} s.")
        }
    }
}

/// First words of the message, trimmed to a topic-name-sized label.
fn topic_name_from_text(text: &str) -> String {
    const MAX: usize = 40;
    let trimmed = text.trim();
    if trimmed.len() <= MAX {
        return trimmed.to_string();
    }
    match trimmed[..MAX].rfind(' ') {
        Some(pos) if pos > 0 => format!("{}…", &trimmed[..pos]),
        _ => format!("{}…", &trimmed[..MAX]),
    }
}

fn settings_keyboard() -> Keyboard {
    Keyboard {
        rows: vec![
            vec![
                chip("Concise", "cfg:user:style:concise"),
                chip("Detailed", "cfg:user:style:detailed"),
            ],
            vec![
                chip("Cautious", "cfg:user:risk:cautious"),
                chip("Balanced", "cfg:user:risk:balanced"),
                chip("Advanced", "cfg:user:risk:advanced"),
            ],
        ],
    }
}

fn network_keyboard() -> Keyboard {
    Keyboard::single_row(vec![
        chip("Mainnet", "cfg:user:network:mainnet"),
        chip("Testnet", "cfg:user:network:testnet"),
    ])
}

fn chip(label: &str, callback_data: &str) -> Button {
    Button {
        label: label.to_string(),
        callback_data: callback_data.to_string(),
    }
}
