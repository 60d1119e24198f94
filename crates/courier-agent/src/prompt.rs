// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! System prompt assembly.
//!
//! One fixed template, parameterized by network, chat type, wallet
//! linkage, response style, and risk profile. The approval rules are
//! explicit: the model must never ask for approval in plain text, the
//! runtime renders approval prompts itself.

use courier_core::types::{ChatKind, ResponseStyle, RiskProfile};

/// Everything the template needs.
#[derive(Debug, Clone)]
pub struct PromptParams<'a> {
    pub agent_name: &'a str,
    pub network: &'a str,
    pub chat_kind: ChatKind,
    pub wallet_address: Option<&'a str>,
    pub response_style: ResponseStyle,
    pub risk_profile: RiskProfile,
}

/// Build the system prompt for one turn.
pub fn build_system_prompt(params: &PromptParams<'_>) -> String {
    let mut sections = Vec::new();

    sections.push(format!(
        "You are {}, an assistant operating through a chat interface. \
         You can call tools to answer questions and perform actions.",
        params.agent_name
    ));

    sections.push(format!("Active network: {}.", params.network));

    sections.push(match params.chat_kind {
        ChatKind::Private => {
            "This is a private conversation; the full tool catalog is available.".to_string()
        }
        ChatKind::Group | ChatKind::Channel => {
            "This is a shared chat; only read-only tools are available. \
             Suggest moving to a private chat for anything that changes state."
                .to_string()
        }
    });

    sections.push(match params.wallet_address {
        Some(address) => format!(
            "The user has linked wallet {address}. Use it as the default source \
             for value-moving actions."
        ),
        None => "No wallet is linked. Value-moving actions will need one; \
                 suggest /wallet link when relevant."
            .to_string(),
    });

    sections.push(match params.response_style {
        ResponseStyle::Concise => {
            "Answer concisely. Prefer short sentences over exposition.".to_string()
        }
        ResponseStyle::Detailed => {
            "Answer thoroughly: explain what you did and why.".to_string()
        }
    });

    sections.push(format!(
        "The user's risk profile is {}. Protected actions are gated accordingly.",
        params.risk_profile
    ));

    sections.push(
        "Approval rules: sensitive tool calls are gated by the runtime, which \
         shows the user an approval card with buttons. Never ask for approval, \
         confirmation, or a yes/no reply in plain text. Never claim an action \
         happened before its tool result arrives. After an approved action \
         executes, report the outcome factually."
            .to_string(),
    );

    sections.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> PromptParams<'static> {
        PromptParams {
            agent_name: "courier",
            network: "mainnet",
            chat_kind: ChatKind::Private,
            wallet_address: None,
            response_style: ResponseStyle::Concise,
            risk_profile: RiskProfile::Balanced,
        }
    }

    #[test]
    fn prompt_names_the_network_and_profile() {
        let prompt = build_system_prompt(&params());
        assert!(prompt.contains("Active network: mainnet."));
        assert!(prompt.contains("risk profile is balanced"));
    }

    #[test]
    fn prompt_forbids_plain_text_approval_asks() {
        let prompt = build_system_prompt(&params());
        assert!(prompt.contains("Never ask for approval"));
    }

    #[test]
    fn group_chats_note_the_reduced_catalog() {
        let prompt = build_system_prompt(&PromptParams {
            chat_kind: ChatKind::Group,
            ..params()
        });
        assert!(prompt.contains("only read-only tools"));
    }

    #[test]
    fn wallet_linkage_changes_the_wallet_section() {
        let without = build_system_prompt(&params());
        assert!(without.contains("No wallet is linked"));

        let with = build_system_prompt(&PromptParams {
            wallet_address: Some("EQabc123"),
            ..params()
        });
        assert!(with.contains("linked wallet EQabc123"));
    }
}
