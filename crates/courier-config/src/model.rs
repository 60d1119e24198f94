// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Courier bot runtime.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Courier configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment
/// variable overrides. All sections are optional and default to sensible
/// values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CourierConfig {
    /// Runtime identity and logging.
    #[serde(default)]
    pub agent: AgentConfig,

    /// Chat transport settings.
    #[serde(default)]
    pub transport: TransportConfig,

    /// Model selection: primary, fallback, topic naming.
    #[serde(default)]
    pub models: ModelsConfig,

    /// Rate-limit knobs.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Feature flags.
    #[serde(default)]
    pub features: FeaturesConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// HTTP gateway settings.
    #[serde(default)]
    pub gateway: GatewayConfig,
}

/// Runtime identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Display name of the bot.
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Network the agent defaults to when no preference is stored.
    #[serde(default = "default_network")]
    pub default_network: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            log_level: default_log_level(),
            default_network: default_network(),
        }
    }
}

fn default_agent_name() -> String {
    "courier".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_network() -> String {
    "mainnet".to_string()
}

/// How updates are received from the chat platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// The platform pushes updates to the HTTP webhook.
    Webhook,
    /// The runtime long-polls the platform for updates.
    #[default]
    Polling,
}

/// Chat transport configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TransportConfig {
    /// Bot API token. `None` disables the transport (tests, gateway-only).
    #[serde(default)]
    pub bot_token: Option<String>,

    /// Public base URL the webhook is registered under.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Update delivery mode.
    #[serde(default)]
    pub run_mode: RunMode,

    /// Secret segment/header value authenticating webhook posts.
    #[serde(default)]
    pub webhook_secret: Option<String>,

    /// Bearer token protecting internal endpoints (replay).
    #[serde(default)]
    pub admin_token: Option<String>,
}

/// Model selection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ModelsConfig {
    /// Primary model id for agent turns.
    #[serde(default = "default_primary_model")]
    pub primary: String,

    /// Optional fallback model id used when the primary fails pre-stream.
    #[serde(default)]
    pub fallback: Option<String>,

    /// Model id reserved for topic naming (currently heuristic-local).
    #[serde(default = "default_topic_model")]
    pub topic_naming: String,

    /// Max output tokens per turn.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            primary: default_primary_model(),
            fallback: None,
            topic_naming: default_topic_model(),
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_primary_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}

fn default_topic_model() -> String {
    "claude-haiku-4-5-20250901".to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

/// Rate-limit knobs (all windows fixed, per §rate-limiter contract).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LimitsConfig {
    /// Burst window length in seconds.
    #[serde(default = "default_burst_window_secs")]
    pub burst_window_secs: u64,

    /// Minute window length in seconds.
    #[serde(default = "default_minute_window_secs")]
    pub minute_window_secs: u64,

    /// Max inbound messages per chat per minute (anti-flood).
    #[serde(default = "default_chat_minute_max")]
    pub chat_minute_max: i64,

    /// Free-tier burst max.
    #[serde(default = "default_burst_max")]
    pub free_burst_max: i64,

    /// Free-tier minute max.
    #[serde(default = "default_minute_max")]
    pub free_minute_max: i64,

    /// Free-tier daily max (UTC midnight reset).
    #[serde(default = "default_daily_max")]
    pub free_daily_max: i64,

    /// Multiplier applied to trusted users' burst/minute/daily limits.
    #[serde(default = "default_trusted_multiplier")]
    pub trusted_multiplier: i64,

    /// Cooldown between user-visible rate-limit notices, seconds.
    #[serde(default = "default_notice_cooldown_secs")]
    pub notice_cooldown_secs: u64,

    /// User ids exempt from free-tier caps (CSV in env form).
    #[serde(default)]
    pub trusted_user_ids: Vec<i64>,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            burst_window_secs: default_burst_window_secs(),
            minute_window_secs: default_minute_window_secs(),
            chat_minute_max: default_chat_minute_max(),
            free_burst_max: default_burst_max(),
            free_minute_max: default_minute_max(),
            free_daily_max: default_daily_max(),
            trusted_multiplier: default_trusted_multiplier(),
            notice_cooldown_secs: default_notice_cooldown_secs(),
            trusted_user_ids: Vec::new(),
        }
    }
}

fn default_burst_window_secs() -> u64 {
    10
}

fn default_minute_window_secs() -> u64 {
    60
}

fn default_chat_minute_max() -> i64 {
    20
}

fn default_burst_max() -> i64 {
    3
}

fn default_minute_max() -> i64 {
    10
}

fn default_daily_max() -> i64 {
    300
}

fn default_trusted_multiplier() -> i64 {
    5
}

fn default_notice_cooldown_secs() -> u64 {
    20
}

/// Feature flags.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FeaturesConfig {
    /// Stream assistant drafts via the transport's draft surface.
    #[serde(default = "default_true")]
    pub streaming_drafts: bool,

    /// Auto-create forum topics for thread-less group turns.
    #[serde(default)]
    pub topic_auto_create: bool,

    /// Render approval prompts with inline keyboards.
    #[serde(default = "default_true")]
    pub approval_ux: bool,
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            streaming_drafts: true,
            topic_auto_create: false,
            approval_ux: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

fn default_database_path() -> String {
    "courier.db".to_string()
}

/// HTTP gateway configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Host address to bind.
    #[serde(default = "default_gateway_host")]
    pub host: String,

    /// Port to bind.
    #[serde(default = "default_gateway_port")]
    pub port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_gateway_host(),
            port: default_gateway_port(),
        }
    }
}

fn default_gateway_host() -> String {
    "127.0.0.1".to_string()
}

fn default_gateway_port() -> u16 {
    8080
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = CourierConfig::default();
        assert_eq!(config.agent.name, "courier");
        assert_eq!(config.limits.free_burst_max, 3);
        assert_eq!(config.limits.trusted_multiplier, 5);
        assert_eq!(config.transport.run_mode, RunMode::Polling);
        assert!(config.features.streaming_drafts);
        assert!(!config.features.topic_auto_create);
    }

    #[test]
    fn run_mode_deserializes_snake_case() {
        let mode: RunMode = serde_json::from_str("\"webhook\"").unwrap();
        assert_eq!(mode, RunMode::Webhook);
    }
}
