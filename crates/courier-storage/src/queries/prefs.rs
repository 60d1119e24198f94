// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! User and chat preference layers.
//!
//! Effective preferences resolve chat-override ?? user-default ??
//! system-default; the merge itself lives in
//! `courier_core::types::EffectivePreferences`.

use std::str::FromStr;

use courier_core::types::{Preferences, ResponseStyle, RiskProfile};
use courier_core::CourierError;
use rusqlite::params;

use crate::database::{map_tr_err, Database};
use crate::models::PrefsRow;

fn row_to_prefs(row: &rusqlite::Row<'_>) -> Result<PrefsRow, rusqlite::Error> {
    Ok(PrefsRow {
        response_style: row.get(0)?,
        risk_profile: row.get(1)?,
        network: row.get(2)?,
    })
}

fn prefs_from_row(row: Option<PrefsRow>) -> Preferences {
    let row = row.unwrap_or_default();
    Preferences {
        response_style: row
            .response_style
            .and_then(|s| ResponseStyle::from_str(&s).ok()),
        risk_profile: row
            .risk_profile
            .and_then(|s| RiskProfile::from_str(&s).ok()),
        network: row.network,
    }
}

/// Load a user's stored preference defaults (empty layer when absent).
pub async fn get_user_prefs(db: &Database, user_id: i64) -> Result<Preferences, CourierError> {
    let row = db
        .connection()
        .call(move |conn| {
            let result = conn.query_row(
                "SELECT response_style, risk_profile, network FROM user_prefs WHERE user_id = ?1",
                params![user_id],
                row_to_prefs,
            );
            match result {
                Ok(prefs) => Ok(Some(prefs)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)?;
    Ok(prefs_from_row(row))
}

/// Load a chat's stored preference overrides (empty layer when absent).
pub async fn get_chat_prefs(db: &Database, chat_id: i64) -> Result<Preferences, CourierError> {
    let row = db
        .connection()
        .call(move |conn| {
            let result = conn.query_row(
                "SELECT response_style, risk_profile, network FROM chat_prefs WHERE chat_id = ?1",
                params![chat_id],
                row_to_prefs,
            );
            match result {
                Ok(prefs) => Ok(Some(prefs)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)?;
    Ok(prefs_from_row(row))
}

/// Upsert one field of the user preference layer.
pub async fn set_user_pref(
    db: &Database,
    user_id: i64,
    field: PrefField,
    value: Option<String>,
) -> Result<(), CourierError> {
    let column = field.column();
    db.connection()
        .call(move |conn| {
            conn.execute(
                &format!(
                    "INSERT INTO user_prefs (user_id, {column})
                     VALUES (?1, ?2)
                     ON CONFLICT (user_id) DO UPDATE
                     SET {column} = ?2, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')"
                ),
                params![user_id, value],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Upsert one field of the chat preference layer.
pub async fn set_chat_pref(
    db: &Database,
    chat_id: i64,
    field: PrefField,
    value: Option<String>,
) -> Result<(), CourierError> {
    let column = field.column();
    db.connection()
        .call(move |conn| {
            conn.execute(
                &format!(
                    "INSERT INTO chat_prefs (chat_id, {column})
                     VALUES (?1, ?2)
                     ON CONFLICT (chat_id) DO UPDATE
                     SET {column} = ?2, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')"
                ),
                params![chat_id, value],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Settable preference fields. Column names are fixed at compile time so
/// the dynamic SQL above never interpolates user input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefField {
    ResponseStyle,
    RiskProfile,
    Network,
}

impl PrefField {
    fn column(self) -> &'static str {
        match self {
            PrefField::ResponseStyle => "response_style",
            PrefField::RiskProfile => "risk_profile",
            PrefField::Network => "network",
        }
    }

    /// Parse a settings-callback target into a field.
    pub fn parse(target: &str) -> Option<Self> {
        match target {
            "style" => Some(PrefField::ResponseStyle),
            "risk" => Some(PrefField::RiskProfile),
            "network" => Some(PrefField::Network),
            _ => None,
        }
    }
}
