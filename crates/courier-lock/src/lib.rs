// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-conversation mutex on the shared KV store.
//!
//! Serializes all agent-turn work within a (chat, thread) scope while
//! turns in other conversations run fully parallel. Acquisition is
//! `SET key token NX PX ttl` with bounded retries; a heartbeat task
//! extends the TTL while work is in flight; release is
//! compare-and-delete so a stale holder can never evict a new owner.

use std::sync::Arc;
use std::time::Duration;

use courier_core::traits::kv::KvStore;
use courier_core::CourierError;
use rand::distributions::Alphanumeric;
use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Lock TTL. A heartbeat must land within this window or the lock
/// expires safely.
const LOCK_TTL: Duration = Duration::from_secs(90);
/// Heartbeat cadence.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);
/// Acquisition retry budget: 60 x 250 ms = 15 s of patience.
const DEFAULT_RETRY_ATTEMPTS: u32 = 60;
const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(250);

/// Lock key for a conversation scope.
pub fn lock_key(chat_id: i64, thread_id: Option<i64>) -> String {
    match thread_id {
        Some(thread) => format!("lock:chat:{chat_id}:{thread}"),
        None => format!("lock:chat:{chat_id}"),
    }
}

/// Acquires and manages per-conversation locks.
#[derive(Clone)]
pub struct ChatLockManager {
    kv: Arc<dyn KvStore>,
    retry_attempts: u32,
    retry_interval: Duration,
}

impl ChatLockManager {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self {
            kv,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_interval: DEFAULT_RETRY_INTERVAL,
        }
    }

    /// Override the retry budget (tests).
    pub fn with_retry(mut self, attempts: u32, interval: Duration) -> Self {
        self.retry_attempts = attempts;
        self.retry_interval = interval;
        self
    }

    /// Acquire the lock for a scope, retrying on contention.
    ///
    /// Exhausting the retry budget yields [`CourierError::LockContention`]
    /// so the enclosing job can retry per its queue policy.
    pub async fn acquire(
        &self,
        chat_id: i64,
        thread_id: Option<i64>,
    ) -> Result<ChatLockGuard, CourierError> {
        let key = lock_key(chat_id, thread_id);
        let token: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(16)
            .map(char::from)
            .collect();

        for attempt in 0..self.retry_attempts {
            if self.kv.set_nx_px(&key, &token, LOCK_TTL).await? {
                debug!(key = key.as_str(), attempt, "chat lock acquired");
                return Ok(ChatLockGuard::start(
                    self.kv.clone(),
                    key,
                    token,
                ));
            }
            tokio::time::sleep(self.retry_interval).await;
        }

        Err(CourierError::LockContention { scope: key })
    }
}

/// Holder of an acquired lock. Release explicitly with
/// [`ChatLockGuard::release`]; if the guard is dropped without release,
/// the heartbeat stops and the lock expires at its TTL.
pub struct ChatLockGuard {
    kv: Arc<dyn KvStore>,
    key: String,
    token: String,
    heartbeat_cancel: CancellationToken,
}

impl ChatLockGuard {
    fn start(kv: Arc<dyn KvStore>, key: String, token: String) -> Self {
        let cancel = CancellationToken::new();
        let hb_kv = kv.clone();
        let hb_key = key.clone();
        let hb_token = token.clone();
        let hb_cancel = cancel.clone();

        tokio::spawn(async move {
            let mut logged_failure = false;
            loop {
                tokio::select! {
                    _ = hb_cancel.cancelled() => break,
                    _ = tokio::time::sleep(HEARTBEAT_INTERVAL) => {
                        match hb_kv.expire_if_match(&hb_key, &hb_token, LOCK_TTL).await {
                            Ok(true) => {}
                            Ok(false) => {
                                // Lost ownership; the lock will reacquire
                                // at the next cycle.
                                if !logged_failure {
                                    warn!(key = hb_key.as_str(), "heartbeat found foreign lock token");
                                    logged_failure = true;
                                }
                            }
                            Err(e) => {
                                if !logged_failure {
                                    warn!(key = hb_key.as_str(), error = %e, "lock heartbeat failed");
                                    logged_failure = true;
                                }
                            }
                        }
                    }
                }
            }
        });

        Self {
            kv,
            key,
            token,
            heartbeat_cancel: cancel,
        }
    }

    /// The lock key (for logging and error context).
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Stop the heartbeat and compare-and-delete the lock. Release
    /// failures are non-fatal: the TTL bounds any leak.
    pub async fn release(self) {
        self.heartbeat_cancel.cancel();
        match self.kv.delete_if_match(&self.key, &self.token).await {
            Ok(true) => debug!(key = self.key.as_str(), "chat lock released"),
            Ok(false) => {
                warn!(key = self.key.as_str(), "lock already held by another token on release")
            }
            Err(e) => warn!(key = self.key.as_str(), error = %e, "lock release failed"),
        }
    }
}

impl Drop for ChatLockGuard {
    fn drop(&mut self) {
        self.heartbeat_cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_kv::MemoryKv;

    fn manager(kv: Arc<MemoryKv>) -> ChatLockManager {
        ChatLockManager::new(kv).with_retry(3, Duration::from_millis(10))
    }

    #[tokio::test]
    async fn acquire_excludes_second_holder() {
        let kv = Arc::new(MemoryKv::new());
        let locks = manager(kv);

        let guard = locks.acquire(100, None).await.unwrap();

        let contended = locks.acquire(100, None).await;
        match contended {
            Err(CourierError::LockContention { scope }) => {
                assert_eq!(scope, "lock:chat:100");
            }
            Err(e) => panic!("expected contention, got {e}"),
            Ok(_) => panic!("expected contention, lock was acquired"),
        }

        guard.release().await;
    }

    #[tokio::test]
    async fn release_frees_the_scope() {
        let kv = Arc::new(MemoryKv::new());
        let locks = manager(kv);

        let guard = locks.acquire(100, None).await.unwrap();
        guard.release().await;

        let again = locks.acquire(100, None).await;
        assert!(again.is_ok());
        again.unwrap().release().await;
    }

    #[tokio::test]
    async fn thread_scopes_lock_independently() {
        let kv = Arc::new(MemoryKv::new());
        let locks = manager(kv);

        let root = locks.acquire(100, None).await.unwrap();
        let thread = locks.acquire(100, Some(7)).await.unwrap();
        let other_chat = locks.acquire(101, None).await.unwrap();

        root.release().await;
        thread.release().await;
        other_chat.release().await;
    }

    #[tokio::test]
    async fn waiting_acquire_wins_after_release() {
        let kv = Arc::new(MemoryKv::new());
        let locks = ChatLockManager::new(kv.clone()).with_retry(50, Duration::from_millis(10));

        let guard = locks.acquire(100, None).await.unwrap();
        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move { locks.acquire(100, None).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        guard.release().await;

        let acquired = waiter.await.unwrap().unwrap();
        acquired.release().await;
    }

    #[tokio::test]
    async fn foreign_token_cannot_release() {
        let kv = Arc::new(MemoryKv::new());
        let locks = manager(kv.clone());

        let guard = locks.acquire(100, None).await.unwrap();
        // A direct foreign delete attempt must not free the lock.
        assert!(!kv.delete_if_match("lock:chat:100", "intruder").await.unwrap());
        assert!(kv.get("lock:chat:100").await.unwrap().is_some());
        guard.release().await;
    }

    #[test]
    fn lock_key_includes_thread() {
        assert_eq!(lock_key(42, None), "lock:chat:42");
        assert_eq!(lock_key(42, Some(7)), "lock:chat:42:7");
    }
}
