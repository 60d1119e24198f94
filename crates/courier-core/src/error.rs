// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Courier bot runtime.

use thiserror::Error;

/// The primary error type used across all Courier crates.
#[derive(Debug, Error)]
pub enum CourierError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Chat transport errors (send/edit failure, callback ack failure).
    #[error("transport error: {message}")]
    Transport {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// LLM provider errors (API failure, stream abort, model not found).
    #[error("provider error: {message}")]
    Provider {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Key-value store errors (counter increment, lock primitive failure).
    #[error("kv store error: {0}")]
    Kv(String),

    /// Request was rejected by a rate-limit window.
    #[error("rate limited: {reason}")]
    RateLimited {
        reason: String,
        retry_after_seconds: Option<u64>,
    },

    /// The per-conversation lock could not be acquired within the retry budget.
    ///
    /// Backpressure, not a user error: the enclosing job should be retried
    /// by its queue policy.
    #[error("lock contention on {scope}")]
    LockContention { scope: String },

    /// An approval was already in a terminal state when a mutation was attempted.
    #[error("approval already {status}")]
    ApprovalState { status: String },

    /// Bad input: missing update_id, unknown callback token, malformed payload.
    #[error("validation error: {0}")]
    Validation(String),

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Audit chain append or verification failure.
    #[error("audit error: {0}")]
    Audit(String),

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CourierError {
    /// The single friendly line surfaced for user-visible failures.
    pub const USER_FACING_FAILURE: &'static str =
        "I could not complete that request. Please try again.";
}
