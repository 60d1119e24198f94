// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock chat transport recording every call for assertions.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use courier_core::traits::chat::{ChatTransport, Keyboard, SendOptions};
use courier_core::CourierError;

/// One recorded outbound message.
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub chat_id: i64,
    pub message_id: i64,
    pub text: String,
    pub keyboard: Option<Keyboard>,
    pub thread_id: Option<i64>,
}

/// One recorded edit.
#[derive(Debug, Clone)]
pub struct EditedMessage {
    pub chat_id: i64,
    pub message_id: i64,
    pub text: String,
    pub keyboard: Option<Keyboard>,
}

/// Records sends, edits, and callback acks; hands out sequential
/// message ids.
#[derive(Default)]
pub struct MockTransport {
    next_message_id: AtomicI64,
    pub sent: Mutex<Vec<SentMessage>>,
    pub edited: Mutex<Vec<EditedMessage>>,
    pub callback_acks: Mutex<Vec<(String, Option<String>)>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// All texts sent to a chat, in order.
    pub fn texts_for(&self, chat_id: i64) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.chat_id == chat_id)
            .map(|m| m.text.clone())
            .collect()
    }

    /// The most recent message carrying an inline keyboard.
    pub fn last_keyboard_message(&self) -> Option<SentMessage> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|m| m.keyboard.is_some())
            .cloned()
    }

    fn allocate_id(&self) -> i64 {
        self.next_message_id.fetch_add(1, Ordering::SeqCst) + 1000
    }
}

#[async_trait]
impl ChatTransport for MockTransport {
    async fn send_text(
        &self,
        chat_id: i64,
        text: &str,
        opts: SendOptions,
    ) -> Result<i64, CourierError> {
        let message_id = self.allocate_id();
        self.sent.lock().unwrap().push(SentMessage {
            chat_id,
            message_id,
            text: text.to_string(),
            keyboard: None,
            thread_id: opts.thread_id,
        });
        Ok(message_id)
    }

    async fn edit_text(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
        keyboard: Option<Keyboard>,
    ) -> Result<(), CourierError> {
        self.edited.lock().unwrap().push(EditedMessage {
            chat_id,
            message_id,
            text: text.to_string(),
            keyboard,
        });
        Ok(())
    }

    async fn send_with_keyboard(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Keyboard,
        opts: SendOptions,
    ) -> Result<i64, CourierError> {
        let message_id = self.allocate_id();
        self.sent.lock().unwrap().push(SentMessage {
            chat_id,
            message_id,
            text: text.to_string(),
            keyboard: Some(keyboard),
            thread_id: opts.thread_id,
        });
        Ok(message_id)
    }

    async fn answer_callback(
        &self,
        callback_query_id: &str,
        text: Option<&str>,
    ) -> Result<(), CourierError> {
        self.callback_acks
            .lock()
            .unwrap()
            .push((callback_query_id.to_string(), text.map(str::to_string)));
        Ok(())
    }
}
