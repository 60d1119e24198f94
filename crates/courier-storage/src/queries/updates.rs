// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Update store: idempotent persistence and status tracking of platform
//! updates.

use std::str::FromStr;

use courier_core::types::UpdateStatus;
use courier_core::CourierError;
use rusqlite::params;

use crate::database::{map_tr_err, Database};
use crate::models::ProcessedUpdate;

/// Outcome of [`try_insert`].
#[derive(Debug, Clone)]
pub struct InsertOutcome {
    /// False means the update_id already existed (duplicate delivery).
    pub inserted: bool,
    pub record: ProcessedUpdate,
}

fn row_to_update(row: &rusqlite::Row<'_>) -> Result<ProcessedUpdate, rusqlite::Error> {
    let status: String = row.get(2)?;
    Ok(ProcessedUpdate {
        update_id: row.get(0)?,
        payload: row.get(1)?,
        status: UpdateStatus::from_str(&status).unwrap_or(UpdateStatus::Received),
        error: row.get(3)?,
        received_at: row.get(4)?,
        handled_at: row.get(5)?,
    })
}

const SELECT_COLUMNS: &str =
    "update_id, payload, status, error, received_at, handled_at";

/// Atomic insert-or-ignore keyed by `update_id`.
///
/// `inserted = false` means a duplicate; callers MUST NOT re-enqueue.
pub async fn try_insert(
    db: &Database,
    update_id: i64,
    payload: &str,
) -> Result<InsertOutcome, CourierError> {
    let payload = payload.to_string();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "INSERT OR IGNORE INTO processed_updates (update_id, payload) VALUES (?1, ?2)",
                params![update_id, payload],
            )?;
            let record = conn.query_row(
                &format!("SELECT {SELECT_COLUMNS} FROM processed_updates WHERE update_id = ?1"),
                params![update_id],
                row_to_update,
            )?;
            Ok(InsertOutcome {
                inserted: changed > 0,
                record,
            })
        })
        .await
        .map_err(map_tr_err)
}

/// Idempotent, monotone status update.
///
/// Terminal rows (`processed`, `failed`) never regress; re-marking a row
/// with its current status is a no-op that still reports success.
/// Returns true when a row actually changed.
pub async fn mark_status(
    db: &Database,
    update_id: i64,
    status: UpdateStatus,
    error: Option<String>,
) -> Result<bool, CourierError> {
    let status_str = status.to_string();
    let terminal = matches!(status, UpdateStatus::Processed | UpdateStatus::Failed);
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE processed_updates
                 SET status = ?2,
                     error = ?3,
                     handled_at = CASE WHEN ?4 THEN strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                                       ELSE handled_at END
                 WHERE update_id = ?1
                   AND status NOT IN ('processed', 'failed')",
                params![update_id, status_str, error, terminal],
            )?;
            Ok(changed > 0)
        })
        .await
        .map_err(map_tr_err)
}

/// Updates stuck in `received` state, oldest first, for the recovery sweep.
pub async fn list_received_for_recovery(
    db: &Database,
    limit: i64,
) -> Result<Vec<ProcessedUpdate>, CourierError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SELECT_COLUMNS} FROM processed_updates
                 WHERE status = 'received'
                 ORDER BY received_at ASC, update_id ASC
                 LIMIT ?1"
            ))?;
            let rows = stmt.query_map(params![limit], row_to_update)?;
            let mut updates = Vec::new();
            for row in rows {
                updates.push(row?);
            }
            Ok(updates)
        })
        .await
        .map_err(map_tr_err)
}

/// Fetch one stored update by id.
pub async fn get_update(
    db: &Database,
    update_id: i64,
) -> Result<Option<ProcessedUpdate>, CourierError> {
    db.connection()
        .call(move |conn| {
            let result = conn.query_row(
                &format!("SELECT {SELECT_COLUMNS} FROM processed_updates WHERE update_id = ?1"),
                params![update_id],
                row_to_update,
            );
            match result {
                Ok(update) => Ok(Some(update)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Delete terminal rows older than `days` (30-day retention policy).
pub async fn purge_older_than(db: &Database, days: i64) -> Result<usize, CourierError> {
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "DELETE FROM processed_updates
                 WHERE status IN ('processed', 'failed')
                   AND received_at < strftime('%Y-%m-%dT%H:%M:%fZ', 'now', ?1)",
                params![format!("-{days} days")],
            )?;
            Ok(changed)
        })
        .await
        .map_err(map_tr_err)
}
