// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chat transport trait: the surface the core consumes from a messaging
//! platform adapter.

use async_trait::async_trait;

use crate::error::CourierError;

/// Options for outbound text sends.
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    /// Forum thread to post into, when the chat supports topics.
    pub thread_id: Option<i64>,
    /// Message to reply to.
    pub reply_to_message_id: Option<i64>,
    /// Render the text as markdown when the platform supports it.
    pub markdown: bool,
}

/// A single inline button carrying callback data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub callback_data: String,
}

/// An inline keyboard: rows of buttons.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Keyboard {
    pub rows: Vec<Vec<Button>>,
}

impl Keyboard {
    pub fn single_row(buttons: Vec<Button>) -> Self {
        Self { rows: vec![buttons] }
    }
}

/// Adapter for the messaging platform the bot runs on.
///
/// Contract notes:
/// - `send_text` must retry without the thread id when the platform
///   reports that the message thread does not exist.
/// - `edit_text` is idempotent; "not modified" responses are suppressed.
/// - Forum-topic methods are optional capabilities; the defaults report
///   the capability as absent.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Send plain text. Returns the platform message id.
    async fn send_text(
        &self,
        chat_id: i64,
        text: &str,
        opts: SendOptions,
    ) -> Result<i64, CourierError>;

    /// Edit a previously sent message, optionally replacing its keyboard.
    async fn edit_text(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
        keyboard: Option<Keyboard>,
    ) -> Result<(), CourierError>;

    /// Send text with an inline keyboard. Returns the message id so the
    /// caller can track the prompt for later edits.
    async fn send_with_keyboard(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Keyboard,
        opts: SendOptions,
    ) -> Result<i64, CourierError>;

    /// Acknowledge a button callback, optionally with a toast text.
    async fn answer_callback(
        &self,
        callback_query_id: &str,
        text: Option<&str>,
    ) -> Result<(), CourierError>;

    /// Create a forum topic. Returns `None` when the platform or chat
    /// does not support topics.
    async fn create_forum_topic(
        &self,
        _chat_id: i64,
        _name: &str,
    ) -> Result<Option<i64>, CourierError> {
        Ok(None)
    }

    /// Rename a forum topic. No-op when unsupported.
    async fn edit_forum_topic(
        &self,
        _chat_id: i64,
        _thread_id: i64,
        _name: &str,
    ) -> Result<(), CourierError> {
        Ok(())
    }
}

/// Sink for progressively streamed draft text.
///
/// The executor pushes accumulated deltas; implementations decide how
/// (and whether) to surface them. Sends are chained: the executor awaits
/// each push before issuing the next, preserving token order.
#[async_trait]
pub trait DraftSink: Send {
    /// Push an incremental text delta.
    async fn push_delta(&mut self, delta: &str) -> Result<(), CourierError>;

    /// Flush the final text. Returns true when a draft surface was
    /// actually used (so the caller can skip a duplicate send).
    async fn finish(&mut self, final_text: Option<&str>) -> Result<bool, CourierError>;
}

/// Draft sink for transports without a live-draft surface.
#[derive(Debug, Default)]
pub struct NoopDraftSink;

#[async_trait]
impl DraftSink for NoopDraftSink {
    async fn push_delta(&mut self, _delta: &str) -> Result<(), CourierError> {
        Ok(())
    }

    async fn finish(&mut self, _final_text: Option<&str>) -> Result<bool, CourierError> {
        Ok(false)
    }
}

/// Creates a draft sink per turn. Transports with a live-draft surface
/// provide their own factory; everyone else uses the no-op.
pub trait DraftSinkFactory: Send + Sync {
    fn create(&self, chat_id: i64, thread_id: Option<i64>) -> Box<dyn DraftSink>;
}

/// Factory producing [`NoopDraftSink`]s.
#[derive(Debug, Default)]
pub struct NoopDraftFactory;

impl DraftSinkFactory for NoopDraftFactory {
    fn create(&self, _chat_id: i64, _thread_id: Option<i64>) -> Box<dyn DraftSink> {
        Box::new(NoopDraftSink)
    }
}
