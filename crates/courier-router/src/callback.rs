// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Callback-data grammar: `<namespace>:<section>:<action>:<value>`.
//!
//! Known namespaces: `ap` (approvals), `cfg` (settings), `wallet`.
//! Any other payload is ignored.

/// Approval button actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalAction {
    Approve,
    Deny,
    Details,
    Refresh,
}

/// Wallet-flow button actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalletAction {
    Status,
    Cancel,
}

/// A parsed callback payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackAction {
    /// `ap:<token>:{approve|deny|details|refresh}`
    Approval {
        token: String,
        action: ApprovalAction,
    },
    /// `cfg:<section>:<target>:<value>` where section is `user` or `chat`.
    Settings {
        section: SettingsSection,
        target: String,
        value: String,
    },
    /// `wallet:{status|cancel}:<session_id>`
    Wallet {
        action: WalletAction,
        session_id: String,
    },
}

/// Which preference layer a settings chip mutates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsSection {
    User,
    Chat,
}

/// Parse callback data. `None` means the payload is not ours: ignore it.
pub fn parse(data: &str) -> Option<CallbackAction> {
    let mut parts = data.splitn(2, ':');
    let namespace = parts.next()?;
    let rest = parts.next()?;

    match namespace {
        "ap" => {
            let (token, action) = rest.rsplit_once(':')?;
            if token.is_empty() {
                return None;
            }
            let action = match action {
                "approve" => ApprovalAction::Approve,
                "deny" => ApprovalAction::Deny,
                "details" => ApprovalAction::Details,
                "refresh" => ApprovalAction::Refresh,
                _ => return None,
            };
            Some(CallbackAction::Approval {
                token: token.to_string(),
                action,
            })
        }
        "cfg" => {
            let mut fields = rest.splitn(3, ':');
            let section = match fields.next()? {
                "user" => SettingsSection::User,
                "chat" => SettingsSection::Chat,
                _ => return None,
            };
            let target = fields.next()?.to_string();
            let value = fields.next()?.to_string();
            if target.is_empty() || value.is_empty() {
                return None;
            }
            Some(CallbackAction::Settings {
                section,
                target,
                value,
            })
        }
        "wallet" => {
            let (action, session_id) = rest.split_once(':')?;
            let action = match action {
                "status" => WalletAction::Status,
                "cancel" => WalletAction::Cancel,
                _ => return None,
            };
            if session_id.is_empty() {
                return None;
            }
            Some(CallbackAction::Wallet {
                action,
                session_id: session_id.to_string(),
            })
        }
        _ => None,
    }
}
