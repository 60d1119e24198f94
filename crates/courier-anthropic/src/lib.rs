// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Anthropic Messages API provider for the Courier bot runtime.
//!
//! Streaming-only: the runtime consumes every model turn as an SSE
//! stream, so there is no non-streaming completion path.

pub mod client;
pub mod provider;
pub mod sse;
pub mod types;

pub use client::AnthropicClient;
pub use provider::AnthropicProvider;
pub use sse::StreamEvent;
