// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Edit-in-place draft streaming for Telegram.
//!
//! Telegram has no native draft surface, so the sink sends one message
//! and edits it as tokens arrive. Cadence rules: at most one in-flight
//! send (callers await each push), at least 180 ms between sends, and a
//! send is skipped when the text is unchanged or exceeds the message
//! limit (the final text is delivered chunked by the caller instead).

use std::time::{Duration, Instant};

use async_trait::async_trait;
use courier_core::traits::chat::{DraftSink, DraftSinkFactory};
use courier_core::CourierError;
use teloxide::prelude::*;
use teloxide::types::{ChatId, MessageId, ThreadId};
use tracing::{debug, warn};

use crate::chunking::MESSAGE_LIMIT;

/// Minimum interval between draft sends.
pub const MIN_SEND_INTERVAL: Duration = Duration::from_millis(180);

/// Decide whether a draft update should go out now. Pure, so the cadence
/// rules are testable without a live bot.
pub fn should_send(
    elapsed_since_last: Duration,
    text: &str,
    last_sent: Option<&str>,
) -> bool {
    if text.trim().is_empty() {
        return false;
    }
    if text.chars().count() > MESSAGE_LIMIT {
        return false;
    }
    if last_sent == Some(text) {
        return false;
    }
    elapsed_since_last >= MIN_SEND_INTERVAL
}

/// Streaming draft sink backed by message edits.
pub struct TelegramDraftSink {
    bot: Bot,
    chat_id: ChatId,
    thread_id: Option<ThreadId>,
    buffer: String,
    message_id: Option<MessageId>,
    last_sent: Option<String>,
    last_send_at: Instant,
}

impl TelegramDraftSink {
    pub fn new(bot: Bot, chat_id: i64, thread_id: Option<i64>) -> Self {
        Self {
            bot,
            chat_id: ChatId(chat_id),
            thread_id: thread_id.map(|id| ThreadId(MessageId(id as i32))),
            buffer: String::new(),
            // Allow an immediate first send.
            last_send_at: Instant::now() - MIN_SEND_INTERVAL,
            message_id: None,
            last_sent: None,
        }
    }

    async fn send_or_edit(&mut self) -> Result<(), CourierError> {
        let text = self.buffer.clone();
        match self.message_id {
            None => {
                let mut request = self.bot.send_message(self.chat_id, &text);
                if let Some(thread) = self.thread_id {
                    request = request.message_thread_id(thread);
                }
                let sent = request.await.map_err(|e| CourierError::Transport {
                    message: format!("draft send failed: {e}"),
                    source: Some(Box::new(e)),
                })?;
                self.message_id = Some(sent.id);
            }
            Some(message_id) => {
                let result = self
                    .bot
                    .edit_message_text(self.chat_id, message_id, &text)
                    .await;
                if let Err(e) = result {
                    let description = e.to_string();
                    if description.contains("message is not modified") {
                        debug!("draft unchanged, edit suppressed");
                    } else {
                        return Err(CourierError::Transport {
                            message: format!("draft edit failed: {e}"),
                            source: Some(Box::new(e)),
                        });
                    }
                }
            }
        }
        self.last_sent = Some(text);
        self.last_send_at = Instant::now();
        Ok(())
    }
}

#[async_trait]
impl DraftSink for TelegramDraftSink {
    async fn push_delta(&mut self, delta: &str) -> Result<(), CourierError> {
        self.buffer.push_str(delta);
        if should_send(
            self.last_send_at.elapsed(),
            &self.buffer,
            self.last_sent.as_deref(),
        ) {
            self.send_or_edit().await?;
        }
        Ok(())
    }

    async fn finish(&mut self, final_text: Option<&str>) -> Result<bool, CourierError> {
        let Some(final_text) = final_text else {
            // The caller will deliver diverging text itself; leave the
            // draft as-is.
            return Ok(false);
        };
        if final_text.trim().is_empty() {
            return Ok(false);
        }
        if final_text.chars().count() > MESSAGE_LIMIT {
            // Too large for one message: the caller chunk-sends instead.
            return Ok(false);
        }

        if self.last_sent.as_deref() != Some(final_text) {
            self.buffer = final_text.to_string();
            if let Err(e) = self.send_or_edit().await {
                warn!(error = %e, "final draft flush failed");
                return Ok(false);
            }
        }
        Ok(self.message_id.is_some())
    }
}

/// Factory handing each turn its own edit-in-place sink.
pub struct TelegramDraftFactory {
    bot: Bot,
}

impl TelegramDraftFactory {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

impl DraftSinkFactory for TelegramDraftFactory {
    fn create(&self, chat_id: i64, thread_id: Option<i64>) -> Box<dyn DraftSink> {
        Box::new(TelegramDraftSink::new(self.bot.clone(), chat_id, thread_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_send_goes_out_immediately() {
        assert!(should_send(MIN_SEND_INTERVAL, "Hello", None));
    }

    #[test]
    fn sends_are_throttled_to_the_interval() {
        assert!(!should_send(Duration::from_millis(50), "Hello", None));
        assert!(should_send(Duration::from_millis(180), "Hello", None));
        assert!(should_send(Duration::from_millis(500), "Hello", None));
    }

    #[test]
    fn unchanged_text_is_skipped() {
        assert!(!should_send(Duration::from_secs(1), "Hello", Some("Hello")));
        assert!(should_send(Duration::from_secs(1), "Hello!", Some("Hello")));
    }

    #[test]
    fn oversized_text_is_skipped() {
        let big = "x".repeat(MESSAGE_LIMIT + 1);
        assert!(!should_send(Duration::from_secs(1), &big, None));
    }

    #[test]
    fn empty_text_is_skipped() {
        assert!(!should_send(Duration::from_secs(1), "", None));
        assert!(!should_send(Duration::from_secs(1), "   ", None));
    }
}
