// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Transcript message persistence.
//!
//! Messages are append-only and replayed to the LLM strictly ordered by
//! `created_at` (rowid breaks millisecond ties). Loads are bounded:
//! the most recent N messages, returned oldest-first.

use courier_core::CourierError;
use rusqlite::params;

use crate::database::{map_tr_err, Database};
use crate::models::MessageRow;

/// Default bounded history load.
pub const DEFAULT_HISTORY_LIMIT: i64 = 80;

const SELECT_COLUMNS: &str = "id, session_id, role, parts, correlation_id, created_at";

fn row_to_message(row: &rusqlite::Row<'_>) -> Result<MessageRow, rusqlite::Error> {
    Ok(MessageRow {
        id: row.get(0)?,
        session_id: row.get(1)?,
        role: row.get(2)?,
        parts: row.get(3)?,
        correlation_id: row.get(4)?,
        created_at: row.get(5)?,
    })
}

/// Append a message to the session transcript.
pub async fn append_message(db: &Database, message: &MessageRow) -> Result<(), CourierError> {
    let message = message.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO messages (id, session_id, role, parts, correlation_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    message.id,
                    message.session_id,
                    message.role,
                    message.parts,
                    message.correlation_id,
                    message.created_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Load the `limit` most recent messages for a session, oldest-first.
pub async fn load_recent(
    db: &Database,
    session_id: &str,
    limit: i64,
) -> Result<Vec<MessageRow>, CourierError> {
    let session_id = session_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SELECT_COLUMNS} FROM messages
                 WHERE session_id = ?1
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?2"
            ))?;
            let rows = stmt.query_map(params![session_id, limit], row_to_message)?;
            let mut messages = Vec::new();
            for row in rows {
                messages.push(row?);
            }
            messages.reverse();
            Ok(messages)
        })
        .await
        .map_err(map_tr_err)
}

/// Whether a message with this correlation id and role already exists.
/// Lets retried turn jobs skip re-persisting their incoming message.
pub async fn exists_with_correlation(
    db: &Database,
    session_id: &str,
    correlation_id: &str,
    role: &str,
) -> Result<bool, CourierError> {
    let session_id = session_id.to_string();
    let correlation_id = correlation_id.to_string();
    let role = role.to_string();
    db.connection()
        .call(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM messages
                 WHERE session_id = ?1 AND correlation_id = ?2 AND role = ?3",
                params![session_id, correlation_id, role],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
        .await
        .map_err(map_tr_err)
}

/// Count messages in a session (operational tooling).
pub async fn count_messages(db: &Database, session_id: &str) -> Result<i64, CourierError> {
    let session_id = session_id.to_string();
    db.connection()
        .call(move |conn| {
            let count = conn.query_row(
                "SELECT COUNT(*) FROM messages WHERE session_id = ?1",
                params![session_id],
                |row| row.get(0),
            )?;
            Ok(count)
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::now_iso;
    use crate::queries::sessions;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        sessions::find_or_create(&db, "s-1", 1, 2, None).await.unwrap();
        (db, dir)
    }

    fn make_message(id: &str, role: &str, text: &str) -> MessageRow {
        MessageRow {
            id: id.to_string(),
            session_id: "s-1".to_string(),
            role: role.to_string(),
            parts: format!(r#"[{{"type":"text","text":"{text}"}}]"#),
            correlation_id: Some("corr-1".to_string()),
            created_at: now_iso(),
        }
    }

    #[tokio::test]
    async fn append_and_load_preserves_order() {
        let (db, _dir) = setup_db().await;

        for (i, role) in ["user", "assistant", "user"].iter().enumerate() {
            append_message(&db, &make_message(&format!("m-{i}"), role, "x"))
                .await
                .unwrap();
        }

        let loaded = load_recent(&db, "s-1", DEFAULT_HISTORY_LIMIT).await.unwrap();
        let ids: Vec<&str> = loaded.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m-0", "m-1", "m-2"]);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn load_is_bounded_and_keeps_newest() {
        let (db, _dir) = setup_db().await;

        for i in 0..10 {
            append_message(&db, &make_message(&format!("m-{i:02}"), "user", "x"))
                .await
                .unwrap();
        }

        let loaded = load_recent(&db, "s-1", 4).await.unwrap();
        assert_eq!(loaded.len(), 4);
        // The newest four, still oldest-first.
        assert_eq!(loaded.first().unwrap().id, "m-06");
        assert_eq!(loaded.last().unwrap().id, "m-09");

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn count_reflects_appends() {
        let (db, _dir) = setup_db().await;
        assert_eq!(count_messages(&db, "s-1").await.unwrap(), 0);
        append_message(&db, &make_message("m-1", "user", "hello")).await.unwrap();
        assert_eq!(count_messages(&db, "s-1").await.unwrap(), 1);
        db.close().await.unwrap();
    }
}
