// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Append-only audit log with hash-linked integrity.
//!
//! Every entry commits to the previous entry's hash:
//! `hash_chain = SHA-256(JSON({previousHash, eventType, metadata,
//! createdAtIso}))` with lexicographically ordered keys and recursively
//! key-sorted metadata. Rows are never updated; tampering breaks the
//! chain for every later row.

use courier_core::CourierError;
use courier_storage::database::{map_tr_err, Database};
use rusqlite::params;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::warn;

/// Well-known event types.
pub mod events {
    pub const APPROVAL_REQUESTED: &str = "approval.requested";
    pub const APPROVAL_DECIDED: &str = "approval.decided";
    pub const APPROVAL_EXPIRED: &str = "approval.expired";
    pub const PROVIDER_FALLBACK: &str = "agent.turn.provider.fallback";
    pub const REASK_BLOCKED: &str = "agent.reask_blocked";
    pub const UPDATE_INGESTED: &str = "update.ingested";
    pub const RATE_LIMITED: &str = "rate.limited";
}

/// A stored audit event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: i64,
    pub actor_type: String,
    pub actor_id: String,
    pub event_type: String,
    pub metadata: Value,
    pub correlation_id: Option<String>,
    pub created_at: String,
    pub hash_chain: String,
}

/// An event to append.
#[derive(Debug, Clone)]
pub struct NewAuditEvent {
    pub actor_type: String,
    pub actor_id: String,
    pub event_type: String,
    pub metadata: Value,
    pub correlation_id: Option<String>,
}

impl NewAuditEvent {
    pub fn system(event_type: &str, metadata: Value) -> Self {
        Self {
            actor_type: "system".to_string(),
            actor_id: "courier".to_string(),
            event_type: event_type.to_string(),
            metadata,
            correlation_id: None,
        }
    }

    pub fn user(user_id: i64, event_type: &str, metadata: Value) -> Self {
        Self {
            actor_type: "user".to_string(),
            actor_id: user_id.to_string(),
            event_type: event_type.to_string(),
            metadata,
            correlation_id: None,
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }
}

/// Result of a forward chain verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainReport {
    pub checked: usize,
    /// First row id whose stored hash does not match the recomputation,
    /// `None` when the chain is intact.
    pub first_divergence: Option<i64>,
}

impl ChainReport {
    pub fn intact(&self) -> bool {
        self.first_divergence.is_none()
    }
}

/// Canonical JSON: recursively sorted object keys, compact separators.
pub fn canonical_string(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let fields: Vec<String> = keys
                .into_iter()
                .map(|k| {
                    format!(
                        "{}:{}",
                        serde_json::to_string(k).expect("string serializes"),
                        canonical_string(&map[k])
                    )
                })
                .collect();
            format!("{{{}}}", fields.join(","))
        }
        Value::Array(items) => {
            let rendered: Vec<String> = items.iter().map(canonical_string).collect();
            format!("[{}]", rendered.join(","))
        }
        other => serde_json::to_string(other).expect("scalar serializes"),
    }
}

/// Compute the chain hash for one event.
pub fn chain_hash(
    previous_hash: Option<&str>,
    event_type: &str,
    metadata: &Value,
    created_at_iso: &str,
) -> String {
    // Keys in lexicographic order: createdAtIso, eventType, metadata,
    // previousHash.
    let envelope = format!(
        "{{\"createdAtIso\":{},\"eventType\":{},\"metadata\":{},\"previousHash\":{}}}",
        serde_json::to_string(created_at_iso).expect("string serializes"),
        serde_json::to_string(event_type).expect("string serializes"),
        canonical_string(metadata),
        match previous_hash {
            Some(h) => serde_json::to_string(h).expect("string serializes"),
            None => "null".to_string(),
        },
    );
    let mut hasher = Sha256::new();
    hasher.update(envelope.as_bytes());
    hex::encode(hasher.finalize())
}

/// Handle to the audit chain. Cheap to clone.
#[derive(Clone)]
pub struct AuditLog {
    db: Database,
}

impl AuditLog {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Append an event, linking it to the current chain head in one
    /// transaction. Use for security-critical events whose loss must
    /// fail the caller (approval decisions, provider fallback).
    pub async fn append(&self, event: NewAuditEvent) -> Result<AuditEvent, CourierError> {
        let metadata_json = canonical_string(&event.metadata);
        let created_at = courier_storage::now_iso();
        self.db
            .connection()
            .call(move |conn| {
                let tx = conn.transaction()?;

                let previous: Option<String> = match tx.query_row(
                    "SELECT hash_chain FROM audit_events ORDER BY id DESC LIMIT 1",
                    [],
                    |row| row.get(0),
                ) {
                    Ok(hash) => Some(hash),
                    Err(rusqlite::Error::QueryReturnedNoRows) => None,
                    Err(e) => return Err(e.into()),
                };

                let metadata: Value = serde_json::from_str(&metadata_json)
                    .unwrap_or(Value::Null);
                let hash = chain_hash(
                    previous.as_deref(),
                    &event.event_type,
                    &metadata,
                    &created_at,
                );

                tx.execute(
                    "INSERT INTO audit_events
                         (actor_type, actor_id, event_type, metadata, correlation_id,
                          created_at, hash_chain)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        event.actor_type,
                        event.actor_id,
                        event.event_type,
                        metadata_json,
                        event.correlation_id,
                        created_at,
                        hash,
                    ],
                )?;
                let id = tx.last_insert_rowid();
                tx.commit()?;

                Ok(AuditEvent {
                    id,
                    actor_type: event.actor_type,
                    actor_id: event.actor_id,
                    event_type: event.event_type,
                    metadata,
                    correlation_id: event.correlation_id,
                    created_at,
                    hash_chain: hash,
                })
            })
            .await
            .map_err(map_tr_err)
    }

    /// Append an event, logging (not raising) on failure. Use for
    /// non-critical events where an audit gap beats a failed operation.
    pub async fn append_best_effort(&self, event: NewAuditEvent) {
        let event_type = event.event_type.clone();
        if let Err(e) = self.append(event).await {
            warn!(event_type = event_type.as_str(), error = %e, "audit append failed");
        }
    }

    /// Recompute the chain forward from the root and report the first
    /// divergence, if any.
    pub async fn verify_chain(&self) -> Result<ChainReport, CourierError> {
        self.db
            .connection()
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, event_type, metadata, created_at, hash_chain
                     FROM audit_events ORDER BY id ASC",
                )?;
                let rows = stmt.query_map([], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                })?;

                let mut previous: Option<String> = None;
                let mut checked = 0usize;
                for row in rows {
                    let (id, event_type, metadata_json, created_at, stored_hash) = row?;
                    let metadata: Value =
                        serde_json::from_str(&metadata_json).unwrap_or(Value::Null);
                    let expected =
                        chain_hash(previous.as_deref(), &event_type, &metadata, &created_at);
                    if expected != stored_hash {
                        return Ok(ChainReport {
                            checked,
                            first_divergence: Some(id),
                        });
                    }
                    previous = Some(stored_hash);
                    checked += 1;
                }
                Ok(ChainReport {
                    checked,
                    first_divergence: None,
                })
            })
            .await
            .map_err(map_tr_err)
    }

    /// Most recent events, newest first (operational tooling).
    pub async fn recent(&self, limit: i64) -> Result<Vec<AuditEvent>, CourierError> {
        self.db
            .connection()
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, actor_type, actor_id, event_type, metadata, correlation_id,
                            created_at, hash_chain
                     FROM audit_events ORDER BY id DESC LIMIT ?1",
                )?;
                let rows = stmt.query_map(params![limit], |row| {
                    let metadata_json: String = row.get(4)?;
                    Ok(AuditEvent {
                        id: row.get(0)?,
                        actor_type: row.get(1)?,
                        actor_id: row.get(2)?,
                        event_type: row.get(3)?,
                        metadata: serde_json::from_str(&metadata_json).unwrap_or(Value::Null),
                        correlation_id: row.get(5)?,
                        created_at: row.get(6)?,
                        hash_chain: row.get(7)?,
                    })
                })?;
                let mut events = Vec::new();
                for row in rows {
                    events.push(row?);
                }
                Ok(events)
            })
            .await
            .map_err(map_tr_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    async fn setup() -> (AuditLog, Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (AuditLog::new(db.clone()), db, dir)
    }

    #[test]
    fn canonical_string_sorts_keys_recursively() {
        let value = json!({"b": 1, "a": {"z": true, "m": [1, {"y": 2, "x": 3}]}});
        assert_eq!(
            canonical_string(&value),
            r#"{"a":{"m":[1,{"x":3,"y":2}],"z":true},"b":1}"#
        );
    }

    #[test]
    fn chain_hash_is_stable() {
        let metadata = json!({"tool": "sendMessage", "amount": 2.5});
        let h1 = chain_hash(None, "approval.requested", &metadata, "2026-01-01T00:00:00.000Z");
        let h2 = chain_hash(None, "approval.requested", &metadata, "2026-01-01T00:00:00.000Z");
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);

        // Any input change changes the hash.
        let h3 = chain_hash(Some(&h1), "approval.requested", &metadata, "2026-01-01T00:00:00.000Z");
        assert_ne!(h1, h3);
    }

    #[tokio::test]
    async fn append_links_to_previous_hash() {
        let (log, db, _dir) = setup().await;

        let first = log
            .append(NewAuditEvent::system(
                events::APPROVAL_REQUESTED,
                json!({"approval_id": "apr_1"}),
            ))
            .await
            .unwrap();
        let second = log
            .append(NewAuditEvent::user(
                200,
                events::APPROVAL_DECIDED,
                json!({"approval_id": "apr_1", "decision": "approved"}),
            ))
            .await
            .unwrap();

        let expected = chain_hash(
            Some(&first.hash_chain),
            events::APPROVAL_DECIDED,
            &second.metadata,
            &second.created_at,
        );
        assert_eq!(second.hash_chain, expected);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn verify_chain_accepts_any_prefix() {
        let (log, db, _dir) = setup().await;
        for i in 0..5 {
            log.append(NewAuditEvent::system("test.event", json!({"i": i})))
                .await
                .unwrap();
        }
        let report = log.verify_chain().await.unwrap();
        assert!(report.intact());
        assert_eq!(report.checked, 5);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn verify_chain_detects_tampering() {
        let (log, db, _dir) = setup().await;
        for i in 0..3 {
            log.append(NewAuditEvent::system("test.event", json!({"i": i})))
                .await
                .unwrap();
        }

        // Tamper with the middle row's metadata out of band.
        db.connection()
            .call(|conn| {
                conn.execute(
                    "UPDATE audit_events SET metadata = '{\"i\":99}' WHERE id = 2",
                    [],
                )?;
                Ok(())
            })
            .await
            .unwrap();

        let report = log.verify_chain().await.unwrap();
        assert_eq!(report.first_divergence, Some(2));
        assert_eq!(report.checked, 1);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn best_effort_append_never_panics() {
        let (log, db, _dir) = setup().await;
        log.append_best_effort(NewAuditEvent::system("test.event", json!({})))
            .await;
        let report = log.verify_chain().await.unwrap();
        assert_eq!(report.checked, 1);
        db.close().await.unwrap();
    }
}
