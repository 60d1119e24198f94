// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Key-value store trait for counters, locks, and short-lived markers.
//!
//! Every mutation that participates in a race (counter increment, lock
//! acquisition, marker set) must be atomic within a single call.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::CourierError;

/// Result of an atomic increment: the post-increment count and the
/// remaining key TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Counter {
    pub count: i64,
    pub ttl_seconds: i64,
}

/// Shared KV surface consumed by the rate limiter, chat lock, and
/// approval confirmation markers.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Increment `key`, setting `ttl` only when the key is newly created.
    /// Atomic in one step: increment and expiry never race.
    async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> Result<Counter, CourierError>;

    /// Set `key = value` with TTL only if the key does not exist.
    /// Returns true when the value was set by this call.
    async fn set_nx_px(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, CourierError>;

    /// Read a value, honoring expiry.
    async fn get(&self, key: &str) -> Result<Option<String>, CourierError>;

    /// Extend the TTL only if the stored value matches. Returns true on
    /// a successful extension.
    async fn expire_if_match(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, CourierError>;

    /// Delete only if the stored value matches (compare-and-delete).
    /// Returns true when a deletion happened.
    async fn delete_if_match(&self, key: &str, value: &str) -> Result<bool, CourierError>;

    /// Liveness probe for readiness checks.
    async fn ping(&self) -> Result<(), CourierError>;
}
