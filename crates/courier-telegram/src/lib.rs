// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Telegram transport adapter for the Courier bot runtime.
//!
//! Implements the core's [`ChatTransport`] and [`DraftSink`] seams on
//! teloxide: chunked sends with thread fallback, idempotent edits,
//! inline keyboards, edit-in-place draft streaming, and a long-polling
//! feed into the ingestion pipeline.
//!
//! [`ChatTransport`]: courier_core::traits::chat::ChatTransport
//! [`DraftSink`]: courier_core::traits::chat::DraftSink

pub mod chunking;
pub mod draft;
pub mod polling;
pub mod transport;

pub use chunking::{split_message, MESSAGE_LIMIT};
pub use draft::{TelegramDraftFactory, TelegramDraftSink};
pub use polling::run_polling;
pub use transport::TelegramTransport;
