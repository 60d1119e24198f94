// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Multi-dimensional rate limiting gating admission to the agent pipeline.
//!
//! Three fixed-window counters per user (burst, minute, daily) plus one
//! per chat (anti-flood). Counters live on the shared [`KvStore`] and use
//! its atomic increment-with-TTL, so a window's first request creates the
//! window and later requests ride its expiry.
//!
//! Fail-open: a KV failure admits the request with `reason =
//! storage_error` at WARN. Occasional over-admission beats a total
//! outage; abuse remains bounded by transport-level fair-share.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, TimeZone, Utc};
use courier_config::LimitsConfig;
use courier_core::traits::kv::KvStore;
use tracing::warn;

/// Why a request was denied (or why a degraded admit happened).
pub mod reasons {
    pub const CHAT_MINUTE: &str = "chat_minute";
    pub const USER_BURST: &str = "user_burst";
    pub const USER_MINUTE: &str = "user_minute";
    pub const USER_DAILY: &str = "user_daily";
    pub const STORAGE_ERROR: &str = "storage_error";
}

/// Extra TTL past midnight so a late read still sees the exhausted window.
const DAILY_GRACE_SECS: u64 = 600;

/// The admission decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    /// Denial reason, or `storage_error` on a fail-open admit.
    pub reason: Option<String>,
    pub retry_after_seconds: Option<u64>,
    pub daily_used: Option<i64>,
    pub daily_limit: Option<i64>,
    pub resets_at_utc: Option<String>,
}

impl RateDecision {
    fn allowed() -> Self {
        Self {
            allowed: true,
            reason: None,
            retry_after_seconds: None,
            daily_used: None,
            daily_limit: None,
            resets_at_utc: None,
        }
    }

    fn fail_open() -> Self {
        Self {
            reason: Some(reasons::STORAGE_ERROR.to_string()),
            ..Self::allowed()
        }
    }

    fn denied(reason: &str, retry_after_seconds: u64) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.to_string()),
            retry_after_seconds: Some(retry_after_seconds),
            daily_used: None,
            daily_limit: None,
            resets_at_utc: None,
        }
    }
}

/// Commands exempt from the user-turn quota (still subject to chat-flood).
pub fn is_quota_exempt_command(command: &str) -> bool {
    matches!(
        command,
        "start" | "settings" | "network" | "wallet" | "cancel"
    )
}

/// Seconds from `now` until the next UTC midnight.
fn secs_until_utc_midnight(now: DateTime<Utc>) -> u64 {
    let next_midnight = next_utc_midnight(now);
    (next_midnight - now).num_seconds().max(1) as u64
}

fn next_utc_midnight(now: DateTime<Utc>) -> DateTime<Utc> {
    let tomorrow = now.date_naive() + chrono::Days::new(1);
    Utc.from_utc_datetime(&tomorrow.and_hms_opt(0, 0, 0).expect("midnight exists"))
}

/// Fixed-window counters + tier policy over the shared KV store.
pub struct RateLimiter {
    kv: Arc<dyn KvStore>,
    config: LimitsConfig,
}

impl RateLimiter {
    pub fn new(kv: Arc<dyn KvStore>, config: LimitsConfig) -> Self {
        Self { kv, config }
    }

    fn tier_multiplier(&self, user_id: i64) -> i64 {
        if self.config.trusted_user_ids.contains(&user_id) {
            self.config.trusted_multiplier
        } else {
            1
        }
    }

    /// Anti-flood gate, incremented on every inbound text message.
    /// Tier-independent.
    pub async fn check_chat_flood(&self, chat_id: i64) -> RateDecision {
        let key = format!("rl:chat:{chat_id}:minute");
        let counter = match self
            .kv
            .incr_with_ttl(&key, Duration::from_secs(self.config.minute_window_secs))
            .await
        {
            Ok(counter) => counter,
            Err(e) => {
                warn!(chat_id, error = %e, "rate-limit store unavailable, failing open");
                return RateDecision::fail_open();
            }
        };

        if counter.count > self.config.chat_minute_max {
            RateDecision::denied(reasons::CHAT_MINUTE, counter.ttl_seconds.max(1) as u64)
        } else {
            RateDecision::allowed()
        }
    }

    /// User-turn quota gate: burst, minute, and daily windows in order.
    pub async fn check_user_turn(&self, user_id: i64) -> RateDecision {
        self.check_user_turn_at(user_id, Utc::now()).await
    }

    /// Same as [`check_user_turn`] with an explicit clock, so daily-window
    /// arithmetic is testable.
    pub async fn check_user_turn_at(&self, user_id: i64, now: DateTime<Utc>) -> RateDecision {
        let multiplier = self.tier_multiplier(user_id);
        let burst_limit = self.config.free_burst_max * multiplier;
        let minute_limit = self.config.free_minute_max * multiplier;
        let daily_limit = self.config.free_daily_max * multiplier;

        let burst_key = format!("rl:user:{user_id}:burst");
        let minute_key = format!("rl:user:{user_id}:minute");
        let daily_key = format!(
            "rl:user:{user_id}:daily:{:04}{:02}{:02}",
            now.year(),
            now.month(),
            now.day()
        );
        let daily_ttl = Duration::from_secs(secs_until_utc_midnight(now) + DAILY_GRACE_SECS);

        // All applicable counters increment; the first exceeded window
        // names the denial.
        let burst = self
            .kv
            .incr_with_ttl(&burst_key, Duration::from_secs(self.config.burst_window_secs))
            .await;
        let minute = self
            .kv
            .incr_with_ttl(&minute_key, Duration::from_secs(self.config.minute_window_secs))
            .await;
        let daily = self.kv.incr_with_ttl(&daily_key, daily_ttl).await;

        let (burst, minute, daily) = match (burst, minute, daily) {
            (Ok(b), Ok(m), Ok(d)) => (b, m, d),
            (b, m, d) => {
                let e = [b.err(), m.err(), d.err()]
                    .into_iter()
                    .flatten()
                    .next()
                    .map(|e| e.to_string())
                    .unwrap_or_default();
                warn!(user_id, error = %e, "rate-limit store unavailable, failing open");
                return RateDecision::fail_open();
            }
        };

        if burst.count > burst_limit {
            return RateDecision::denied(reasons::USER_BURST, burst.ttl_seconds.max(1) as u64);
        }
        if minute.count > minute_limit {
            return RateDecision::denied(reasons::USER_MINUTE, minute.ttl_seconds.max(1) as u64);
        }
        if daily.count > daily_limit {
            let mut decision =
                RateDecision::denied(reasons::USER_DAILY, daily.ttl_seconds.max(1) as u64);
            decision.daily_used = Some(daily.count);
            decision.daily_limit = Some(daily_limit);
            decision.resets_at_utc =
                Some(next_utc_midnight(now).format("%Y-%m-%dT%H:%M:%SZ").to_string());
            return decision;
        }
        RateDecision::allowed()
    }

    /// Whether a denial notice should reach the user right now.
    ///
    /// A per-(user, reason) cooldown key prevents notice storms. On KV
    /// failure the notice is suppressed: a missing warning is cheaper
    /// than a storm.
    pub async fn should_notify(&self, user_id: i64, reason: &str) -> bool {
        let key = format!("rl:notice:{user_id}:{reason}");
        match self
            .kv
            .set_nx_px(
                &key,
                "1",
                Duration::from_secs(self.config.notice_cooldown_secs),
            )
            .await
        {
            Ok(fresh) => fresh,
            Err(e) => {
                warn!(user_id, reason, error = %e, "notice cooldown store unavailable");
                false
            }
        }
    }
}
