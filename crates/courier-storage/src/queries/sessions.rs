// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session CRUD keyed by (chat, user, thread) scope.

use courier_core::CourierError;
use rusqlite::params;

use crate::database::{map_tr_err, Database};
use crate::models::SessionRow;

const SELECT_COLUMNS: &str =
    "id, chat_id, user_id, thread_id, state, last_message_at, created_at, updated_at";

fn row_to_session(row: &rusqlite::Row<'_>) -> Result<SessionRow, rusqlite::Error> {
    Ok(SessionRow {
        id: row.get(0)?,
        chat_id: row.get(1)?,
        user_id: row.get(2)?,
        thread_id: row.get(3)?,
        state: row.get(4)?,
        last_message_at: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

/// Find the session for a scope tuple, if one exists.
pub async fn find_by_scope(
    db: &Database,
    chat_id: i64,
    user_id: i64,
    thread_id: Option<i64>,
) -> Result<Option<SessionRow>, CourierError> {
    db.connection()
        .call(move |conn| {
            let result = conn.query_row(
                &format!(
                    "SELECT {SELECT_COLUMNS} FROM sessions
                     WHERE chat_id = ?1 AND user_id = ?2 AND thread_id IS ?3"
                ),
                params![chat_id, user_id, thread_id],
                row_to_session,
            );
            match result {
                Ok(session) => Ok(Some(session)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Find the scope's session or create a fresh one with the given id.
///
/// The unique scope index makes concurrent creation safe: the loser of
/// the race reads the winner's row.
pub async fn find_or_create(
    db: &Database,
    id: &str,
    chat_id: i64,
    user_id: i64,
    thread_id: Option<i64>,
) -> Result<SessionRow, CourierError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO sessions (id, chat_id, user_id, thread_id)
                 VALUES (?1, ?2, ?3, ?4)",
                params![id, chat_id, user_id, thread_id],
            )?;
            let session = conn.query_row(
                &format!(
                    "SELECT {SELECT_COLUMNS} FROM sessions
                     WHERE chat_id = ?1 AND user_id = ?2 AND thread_id IS ?3"
                ),
                params![chat_id, user_id, thread_id],
                row_to_session,
            )?;
            Ok(session)
        })
        .await
        .map_err(map_tr_err)
}

/// Get a session by id.
pub async fn get_session(db: &Database, id: &str) -> Result<Option<SessionRow>, CourierError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let result = conn.query_row(
                &format!("SELECT {SELECT_COLUMNS} FROM sessions WHERE id = ?1"),
                params![id],
                row_to_session,
            );
            match result {
                Ok(session) => Ok(Some(session)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Replace the session's opaque JSON state.
pub async fn update_state(
    db: &Database,
    id: &str,
    state: Option<String>,
) -> Result<(), CourierError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE sessions
                 SET state = ?1, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?2",
                params![state, id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Stamp `last_message_at` (called on every persisted turn message).
pub async fn touch_last_message(db: &Database, id: &str) -> Result<(), CourierError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE sessions
                 SET last_message_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now'),
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?1",
                params![id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}
