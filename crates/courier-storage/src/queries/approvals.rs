// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Approval row persistence.
//!
//! The state machine lives in `courier-approval`; these queries enforce
//! terminality at the SQL level: transitions only ever apply to rows
//! still in `requested` state.

use std::str::FromStr;

use courier_core::types::{ApprovalStatus, RiskConfidence, RiskLevel};
use courier_core::CourierError;
use rusqlite::params;

use crate::database::{map_tr_err, Database};
use crate::models::ApprovalRow;

const SELECT_COLUMNS: &str = "id, callback_token, session_id, chat_id, user_id, tool_name, \
     tool_call_id, input, risk_level, risk_confidence, status, expires_at, decided_by, \
     decided_at, prompt_message_id, correlation_id, created_at, updated_at";

fn row_to_approval(row: &rusqlite::Row<'_>) -> Result<ApprovalRow, rusqlite::Error> {
    let risk_level: String = row.get(8)?;
    let risk_confidence: String = row.get(9)?;
    let status: String = row.get(10)?;
    Ok(ApprovalRow {
        id: row.get(0)?,
        callback_token: row.get(1)?,
        session_id: row.get(2)?,
        chat_id: row.get(3)?,
        user_id: row.get(4)?,
        tool_name: row.get(5)?,
        tool_call_id: row.get(6)?,
        input: row.get(7)?,
        risk_level: RiskLevel::from_str(&risk_level).unwrap_or(RiskLevel::High),
        risk_confidence: RiskConfidence::from_str(&risk_confidence)
            .unwrap_or(RiskConfidence::Low),
        status: ApprovalStatus::from_str(&status).unwrap_or(ApprovalStatus::Failed),
        expires_at: row.get(11)?,
        decided_by: row.get(12)?,
        decided_at: row.get(13)?,
        prompt_message_id: row.get(14)?,
        correlation_id: row.get(15)?,
        created_at: row.get(16)?,
        updated_at: row.get(17)?,
    })
}

/// Persist a freshly registered approval.
pub async fn insert_approval(db: &Database, approval: &ApprovalRow) -> Result<(), CourierError> {
    let a = approval.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO approvals (id, callback_token, session_id, chat_id, user_id,
                     tool_name, tool_call_id, input, risk_level, risk_confidence, status,
                     expires_at, prompt_message_id, correlation_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?15)",
                params![
                    a.id,
                    a.callback_token,
                    a.session_id,
                    a.chat_id,
                    a.user_id,
                    a.tool_name,
                    a.tool_call_id,
                    a.input,
                    a.risk_level.to_string(),
                    a.risk_confidence.to_string(),
                    a.status.to_string(),
                    a.expires_at,
                    a.prompt_message_id,
                    a.correlation_id,
                    a.created_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Look up by the short callback token carried in button data.
pub async fn get_by_token(
    db: &Database,
    callback_token: &str,
) -> Result<Option<ApprovalRow>, CourierError> {
    let token = callback_token.to_string();
    db.connection()
        .call(move |conn| {
            let result = conn.query_row(
                &format!("SELECT {SELECT_COLUMNS} FROM approvals WHERE callback_token = ?1"),
                params![token],
                row_to_approval,
            );
            match result {
                Ok(approval) => Ok(Some(approval)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Look up by approval id.
pub async fn get_by_id(db: &Database, id: &str) -> Result<Option<ApprovalRow>, CourierError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let result = conn.query_row(
                &format!("SELECT {SELECT_COLUMNS} FROM approvals WHERE id = ?1"),
                params![id],
                row_to_approval,
            );
            match result {
                Ok(approval) => Ok(Some(approval)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Transition a `requested` approval to a terminal state.
///
/// Returns false when the row was already terminal (or absent): the
/// caller lost the race and must not treat the decision as applied.
pub async fn transition_from_requested(
    db: &Database,
    id: &str,
    to: ApprovalStatus,
    decided_by: Option<i64>,
) -> Result<bool, CourierError> {
    let id = id.to_string();
    let to_str = to.to_string();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE approvals
                 SET status = ?2,
                     decided_by = ?3,
                     decided_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now'),
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?1 AND status = 'requested'",
                params![id, to_str, decided_by],
            )?;
            Ok(changed > 0)
        })
        .await
        .map_err(map_tr_err)
}

/// Track the transport message that renders this approval's prompt card.
pub async fn set_prompt_message_id(
    db: &Database,
    id: &str,
    message_id: i64,
) -> Result<(), CourierError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE approvals
                 SET prompt_message_id = ?2,
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?1",
                params![id, message_id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    fn make_approval(id: &str, token: &str) -> ApprovalRow {
        ApprovalRow {
            id: id.to_string(),
            callback_token: token.to_string(),
            session_id: "s-1".to_string(),
            chat_id: 100,
            user_id: 200,
            tool_name: "sendMessage".to_string(),
            tool_call_id: "tc-1".to_string(),
            input: r#"{"amount":2.5}"#.to_string(),
            risk_level: RiskLevel::High,
            risk_confidence: RiskConfidence::Medium,
            status: ApprovalStatus::Requested,
            expires_at: "2026-01-01T00:05:00.000Z".to_string(),
            decided_by: None,
            decided_at: None,
            prompt_message_id: None,
            correlation_id: Some("corr-1".to_string()),
            created_at: "2026-01-01T00:00:00.000Z".to_string(),
            updated_at: "2026-01-01T00:00:00.000Z".to_string(),
        }
    }

    #[tokio::test]
    async fn insert_and_lookup_by_token() {
        let (db, _dir) = setup_db().await;
        insert_approval(&db, &make_approval("apr_1", "tok_abcdef")).await.unwrap();

        let found = get_by_token(&db, "tok_abcdef").await.unwrap().unwrap();
        assert_eq!(found.id, "apr_1");
        assert_eq!(found.status, ApprovalStatus::Requested);
        assert_eq!(found.risk_level, RiskLevel::High);

        assert!(get_by_token(&db, "tok_missing").await.unwrap().is_none());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn transition_applies_once() {
        let (db, _dir) = setup_db().await;
        insert_approval(&db, &make_approval("apr_1", "tok_1")).await.unwrap();

        let applied =
            transition_from_requested(&db, "apr_1", ApprovalStatus::Approved, Some(200))
                .await
                .unwrap();
        assert!(applied);

        // Terminal rows never move again.
        let second =
            transition_from_requested(&db, "apr_1", ApprovalStatus::Denied, Some(999))
                .await
                .unwrap();
        assert!(!second);

        let row = get_by_id(&db, "apr_1").await.unwrap().unwrap();
        assert_eq!(row.status, ApprovalStatus::Approved);
        assert_eq!(row.decided_by, Some(200));
        assert!(row.decided_at.is_some());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn prompt_message_id_round_trips() {
        let (db, _dir) = setup_db().await;
        insert_approval(&db, &make_approval("apr_1", "tok_1")).await.unwrap();
        set_prompt_message_id(&db, "apr_1", 555).await.unwrap();
        let row = get_by_id(&db, "apr_1").await.unwrap().unwrap();
        assert_eq!(row.prompt_message_id, Some(555));
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn duplicate_token_is_rejected() {
        let (db, _dir) = setup_db().await;
        insert_approval(&db, &make_approval("apr_1", "tok_same")).await.unwrap();
        let result = insert_approval(&db, &make_approval("apr_2", "tok_same")).await;
        assert!(result.is_err());
        db.close().await.unwrap();
    }
}
