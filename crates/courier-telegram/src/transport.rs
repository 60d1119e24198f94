// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! [`ChatTransport`] implementation over the Telegram Bot API.
//!
//! Contract notes carried from the core trait: sends retry without the
//! thread id when Telegram reports a missing message thread, edits
//! suppress "message is not modified", and long text is chunked at the
//! 4096-character limit.

use async_trait::async_trait;
use courier_core::traits::chat::{ChatTransport, Keyboard, SendOptions};
use courier_core::CourierError;
use teloxide::prelude::*;
use teloxide::types::{
    ChatId, InlineKeyboardButton, InlineKeyboardMarkup, MessageId, ReplyParameters, ThreadId,
};
use tracing::{debug, warn};

use crate::chunking::{split_message, MESSAGE_LIMIT};

/// Telegram-backed chat transport.
#[derive(Clone)]
pub struct TelegramTransport {
    bot: Bot,
}

impl TelegramTransport {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    pub fn bot(&self) -> &Bot {
        &self.bot
    }

    fn transport_err(context: &str, e: teloxide::RequestError) -> CourierError {
        CourierError::Transport {
            message: format!("{context}: {e}"),
            source: Some(Box::new(e)),
        }
    }

    async fn send_one(
        &self,
        chat_id: i64,
        text: &str,
        opts: &SendOptions,
    ) -> Result<i64, CourierError> {
        let mut request = self.bot.send_message(ChatId(chat_id), text);
        if let Some(thread) = opts.thread_id {
            request = request.message_thread_id(ThreadId(MessageId(thread as i32)));
        }
        if let Some(reply_to) = opts.reply_to_message_id {
            request = request.reply_parameters(ReplyParameters::new(MessageId(reply_to as i32)));
        }

        match request.await {
            Ok(message) => Ok(message.id.0 as i64),
            Err(e) if opts.thread_id.is_some() && is_missing_thread(&e) => {
                // Deleted or never-created topic: deliver to the chat root.
                warn!(chat_id, error = %e, "message thread not found, retrying without thread");
                let mut retry = self.bot.send_message(ChatId(chat_id), text);
                if let Some(reply_to) = opts.reply_to_message_id {
                    retry =
                        retry.reply_parameters(ReplyParameters::new(MessageId(reply_to as i32)));
                }
                retry
                    .await
                    .map(|message| message.id.0 as i64)
                    .map_err(|e| Self::transport_err("send_text retry", e))
            }
            Err(e) => Err(Self::transport_err("send_text", e)),
        }
    }
}

fn is_missing_thread(e: &teloxide::RequestError) -> bool {
    e.to_string().contains("message thread not found")
}

fn to_markup(keyboard: &Keyboard) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(keyboard.rows.iter().map(|row| {
        row.iter()
            .map(|button| {
                InlineKeyboardButton::callback(button.label.clone(), button.callback_data.clone())
            })
            .collect::<Vec<_>>()
    }))
}

#[async_trait]
impl ChatTransport for TelegramTransport {
    async fn send_text(
        &self,
        chat_id: i64,
        text: &str,
        opts: SendOptions,
    ) -> Result<i64, CourierError> {
        let chunks = split_message(text, MESSAGE_LIMIT);
        if chunks.is_empty() {
            return Err(CourierError::Validation("refusing to send empty text".into()));
        }

        let mut last_id = 0;
        for chunk in &chunks {
            last_id = self.send_one(chat_id, chunk, &opts).await?;
        }
        debug!(chat_id, chunks = chunks.len(), "text delivered");
        Ok(last_id)
    }

    async fn edit_text(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
        keyboard: Option<Keyboard>,
    ) -> Result<(), CourierError> {
        let mut request = self
            .bot
            .edit_message_text(ChatId(chat_id), MessageId(message_id as i32), text);
        if let Some(keyboard) = &keyboard {
            request = request.reply_markup(to_markup(keyboard));
        }

        match request.await {
            Ok(_) => Ok(()),
            Err(e) if e.to_string().contains("message is not modified") => {
                debug!(chat_id, message_id, "edit suppressed: message unchanged");
                Ok(())
            }
            Err(e) => Err(Self::transport_err("edit_text", e)),
        }
    }

    async fn send_with_keyboard(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Keyboard,
        opts: SendOptions,
    ) -> Result<i64, CourierError> {
        let mut request = self
            .bot
            .send_message(ChatId(chat_id), text)
            .reply_markup(to_markup(&keyboard));
        if let Some(thread) = opts.thread_id {
            request = request.message_thread_id(ThreadId(MessageId(thread as i32)));
        }
        request
            .await
            .map(|message| message.id.0 as i64)
            .map_err(|e| Self::transport_err("send_with_keyboard", e))
    }

    async fn answer_callback(
        &self,
        callback_query_id: &str,
        text: Option<&str>,
    ) -> Result<(), CourierError> {
        let mut request = self.bot.answer_callback_query(callback_query_id.to_string());
        if let Some(text) = text {
            request = request.text(text.to_string());
        }
        request
            .await
            .map(|_| ())
            .map_err(|e| Self::transport_err("answer_callback", e))
    }

    async fn create_forum_topic(
        &self,
        chat_id: i64,
        name: &str,
    ) -> Result<Option<i64>, CourierError> {
        match self
            .bot
            .create_forum_topic(ChatId(chat_id), name.to_string(), 0x6FB9F0, String::new())
            .await
        {
            Ok(topic) => Ok(Some(topic.thread_id.0 .0 as i64)),
            Err(e) => {
                // Chats without topics enabled are a capability miss, not
                // a failure.
                debug!(chat_id, error = %e, "forum topic creation unavailable");
                Ok(None)
            }
        }
    }

    async fn edit_forum_topic(
        &self,
        chat_id: i64,
        thread_id: i64,
        name: &str,
    ) -> Result<(), CourierError> {
        self.bot
            .edit_forum_topic(ChatId(chat_id), ThreadId(MessageId(thread_id as i32)))
            .name(name.to_string())
            .await
            .map(|_| ())
            .map_err(|e| Self::transport_err("edit_forum_topic", e))
    }
}
