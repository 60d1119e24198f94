// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process implementation of the [`KvStore`] trait.
//!
//! Backs rate-limit counters, chat locks, and approval confirmation
//! markers for single-process deployments. Every operation holds the
//! per-key shard lock for its whole critical section, giving the same
//! atomicity a server-side script provides on a networked store. A
//! networked backend can implement the same trait without touching the
//! callers.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use courier_core::traits::kv::{Counter, KvStore};
use courier_core::CourierError;
use dashmap::DashMap;

#[derive(Debug, Clone)]
enum Value {
    Counter(i64),
    Text(String),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Instant,
}

impl Entry {
    fn live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// DashMap-backed KV store with lazy expiry.
#[derive(Debug, Default)]
pub struct MemoryKv {
    entries: DashMap<String, Entry>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    fn remaining_secs(expires_at: Instant, now: Instant) -> i64 {
        expires_at.saturating_duration_since(now).as_secs() as i64
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> Result<Counter, CourierError> {
        let now = Instant::now();
        let mut entry = self.entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::Counter(0),
            expires_at: now + ttl,
        });

        // Expired counters restart as fresh windows with a fresh TTL.
        if !entry.live(now) {
            *entry = Entry {
                value: Value::Counter(0),
                expires_at: now + ttl,
            };
        }

        let count = match &mut entry.value {
            Value::Counter(c) => {
                *c += 1;
                *c
            }
            Value::Text(_) => {
                return Err(CourierError::Kv(format!(
                    "key {key} holds a text value, not a counter"
                )))
            }
        };
        let ttl_seconds = Self::remaining_secs(entry.expires_at, now);
        Ok(Counter { count, ttl_seconds })
    }

    async fn set_nx_px(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, CourierError> {
        let now = Instant::now();
        let mut set = false;
        let mut entry = self.entries.entry(key.to_string()).or_insert_with(|| {
            set = true;
            Entry {
                value: Value::Text(value.to_string()),
                expires_at: now + ttl,
            }
        });

        if !set && !entry.live(now) {
            *entry = Entry {
                value: Value::Text(value.to_string()),
                expires_at: now + ttl,
            };
            set = true;
        }
        Ok(set)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CourierError> {
        let now = Instant::now();
        match self.entries.get(key) {
            Some(entry) if entry.live(now) => match &entry.value {
                Value::Text(s) => Ok(Some(s.clone())),
                Value::Counter(c) => Ok(Some(c.to_string())),
            },
            _ => Ok(None),
        }
    }

    async fn expire_if_match(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, CourierError> {
        let now = Instant::now();
        match self.entries.get_mut(key) {
            Some(mut entry) if entry.live(now) => match &entry.value {
                Value::Text(s) if s == value => {
                    entry.expires_at = now + ttl;
                    Ok(true)
                }
                _ => Ok(false),
            },
            _ => Ok(false),
        }
    }

    async fn delete_if_match(&self, key: &str, value: &str) -> Result<bool, CourierError> {
        let now = Instant::now();
        let removed = self
            .entries
            .remove_if(key, |_, entry| {
                entry.live(now)
                    && matches!(&entry.value, Value::Text(s) if s == value)
            })
            .is_some();
        Ok(removed)
    }

    async fn ping(&self) -> Result<(), CourierError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn incr_counts_and_reports_ttl() {
        let kv = MemoryKv::new();
        let c1 = kv.incr_with_ttl("k", Duration::from_secs(60)).await.unwrap();
        assert_eq!(c1.count, 1);
        assert!(c1.ttl_seconds > 50);

        let c2 = kv.incr_with_ttl("k", Duration::from_secs(60)).await.unwrap();
        assert_eq!(c2.count, 2);
    }

    #[tokio::test]
    async fn expired_counter_restarts() {
        let kv = MemoryKv::new();
        kv.incr_with_ttl("k", Duration::from_millis(10)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        let c = kv.incr_with_ttl("k", Duration::from_secs(60)).await.unwrap();
        assert_eq!(c.count, 1);
    }

    #[tokio::test]
    async fn set_nx_only_first_wins() {
        let kv = MemoryKv::new();
        assert!(kv
            .set_nx_px("lock", "token-a", Duration::from_secs(5))
            .await
            .unwrap());
        assert!(!kv
            .set_nx_px("lock", "token-b", Duration::from_secs(5))
            .await
            .unwrap());
        assert_eq!(kv.get("lock").await.unwrap().as_deref(), Some("token-a"));
    }

    #[tokio::test]
    async fn set_nx_reclaims_expired_key() {
        let kv = MemoryKv::new();
        kv.set_nx_px("lock", "token-a", Duration::from_millis(10))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(kv
            .set_nx_px("lock", "token-b", Duration::from_secs(5))
            .await
            .unwrap());
        assert_eq!(kv.get("lock").await.unwrap().as_deref(), Some("token-b"));
    }

    #[tokio::test]
    async fn expire_if_match_requires_ownership() {
        let kv = MemoryKv::new();
        kv.set_nx_px("lock", "mine", Duration::from_secs(5)).await.unwrap();
        assert!(kv
            .expire_if_match("lock", "mine", Duration::from_secs(60))
            .await
            .unwrap());
        assert!(!kv
            .expire_if_match("lock", "theirs", Duration::from_secs(60))
            .await
            .unwrap());
        assert!(!kv
            .expire_if_match("absent", "mine", Duration::from_secs(60))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn delete_if_match_is_compare_and_delete() {
        let kv = MemoryKv::new();
        kv.set_nx_px("lock", "mine", Duration::from_secs(5)).await.unwrap();

        assert!(!kv.delete_if_match("lock", "theirs").await.unwrap());
        assert_eq!(kv.get("lock").await.unwrap().as_deref(), Some("mine"));

        assert!(kv.delete_if_match("lock", "mine").await.unwrap());
        assert!(kv.get("lock").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn concurrent_increments_do_not_lose_counts() {
        let kv = std::sync::Arc::new(MemoryKv::new());
        let mut handles = Vec::new();
        for _ in 0..20 {
            let kv = kv.clone();
            handles.push(tokio::spawn(async move {
                kv.incr_with_ttl("hot", Duration::from_secs(60)).await.unwrap()
            }));
        }
        let mut max = 0;
        for handle in handles {
            max = max.max(handle.await.unwrap().count);
        }
        assert_eq!(max, 20);
    }
}
