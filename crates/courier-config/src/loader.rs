// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./courier.toml` > `~/.config/courier/courier.toml`
//! > `/etc/courier/courier.toml` with environment variable overrides via the
//! `COURIER_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::CourierConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/courier/courier.toml` (system-wide)
/// 3. `~/.config/courier/courier.toml` (user XDG config)
/// 4. `./courier.toml` (local directory)
/// 5. `COURIER_*` environment variables
pub fn load_config() -> Result<CourierConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(CourierConfig::default()))
        .merge(Toml::file("/etc/courier/courier.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("courier/courier.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("courier.toml"))
        .merge(env_provider())
        .extract()
}

/// Load configuration from a TOML string only (tests and embedded configs).
pub fn load_config_from_str(toml_content: &str) -> Result<CourierConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(CourierConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<CourierConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(CourierConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Create the environment variable provider using explicit `map()` for
/// section-to-dot mapping.
///
/// Uses `Env::map()` NOT `Env::split("_")` to avoid ambiguity with
/// underscore-containing key names: `COURIER_TRANSPORT_BOT_TOKEN` must map
/// to `transport.bot_token`, not `transport.bot.token`.
fn env_provider() -> Env {
    Env::prefixed("COURIER_").map(|key| {
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("agent_", "agent.", 1)
            .replacen("transport_", "transport.", 1)
            .replacen("models_", "models.", 1)
            .replacen("limits_", "limits.", 1)
            .replacen("features_", "features.", 1)
            .replacen("storage_", "storage.", 1)
            .replacen("gateway_", "gateway.", 1);
        mapped.into()
    })
}

/// Validate invariants that cannot be expressed in serde defaults.
///
/// Returns every violation so the operator can fix the config in one pass.
/// Any violation is fatal at boot.
pub fn validate(config: &CourierConfig) -> Result<(), Vec<String>> {
    let mut problems = Vec::new();

    if config.transport.run_mode == crate::model::RunMode::Webhook {
        if config.transport.webhook_secret.is_none() {
            problems.push("transport.webhook_secret is required in webhook mode".to_string());
        }
        if config.transport.base_url.is_none() {
            problems.push("transport.base_url is required in webhook mode".to_string());
        }
    }
    if config.limits.free_burst_max <= 0
        || config.limits.free_minute_max <= 0
        || config.limits.free_daily_max <= 0
        || config.limits.chat_minute_max <= 0
    {
        problems.push("limits.* maxima must be positive".to_string());
    }
    if config.limits.trusted_multiplier < 1 {
        problems.push("limits.trusted_multiplier must be >= 1".to_string());
    }
    if config.models.primary.is_empty() {
        problems.push("models.primary must not be empty".to_string());
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(problems)
    }
}
