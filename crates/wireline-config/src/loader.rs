// SPDX-FileCopyrightText: 2026 Wireline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./wireline.toml` > `~/.config/wireline/wireline.toml`
//! > `/etc/wireline/wireline.toml` with environment variable overrides via
//! the `WIRELINE_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::BridgeConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/wireline/wireline.toml` (system-wide)
/// 3. `~/.config/wireline/wireline.toml` (user XDG config)
/// 4. `./wireline.toml` (local directory)
/// 5. `WIRELINE_*` environment variables
pub fn load_config() -> Result<BridgeConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(BridgeConfig::default()))
        .merge(Toml::file("/etc/wireline/wireline.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("wireline/wireline.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("wireline.toml"))
        .merge(env_provider())
        .extract()
}

/// Load configuration from a TOML string only (no XDG lookup).
///
/// Used for testing and explicit config specification.
pub fn load_config_from_str(toml_content: &str) -> Result<BridgeConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(BridgeConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<BridgeConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(BridgeConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Create the environment variable provider using explicit `map()` for
/// section-to-dot mapping.
///
/// Uses `Env::map()` NOT `Env::split("_")` to avoid ambiguity with
/// underscore-containing key names: `WIRELINE_PROVIDER_API_KEY` must map to
/// `provider.api_key`, not `provider.api.key`.
fn env_provider() -> Env {
    Env::prefixed("WIRELINE_").map(|key| {
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("provider_", "provider.", 1)
            .replacen("codex_", "codex.", 1)
            .replacen("storage_", "storage.", 1)
            .replacen("features_", "features.", 1)
            .replacen("notifications_", "notifications.", 1)
            .replacen("webhook_", "webhook.", 1)
            .replacen("log_", "log.", 1);
        mapped.into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_from_str_overrides_defaults() {
        let config = load_config_from_str(
            r#"
            [provider]
            api_key = "k"
            api_secret = "s"
            trusted_number = "+15550001111"
            from_number = "+15550002222"
            poll_interval_ms = 500

            [codex]
            binary_path = "/usr/local/bin/codex"

            [webhook]
            enabled = true
            secret = "hook-secret"
            port = 9000
            "#,
        )
        .unwrap();

        assert_eq!(config.provider.poll_interval_ms, 500);
        assert_eq!(config.codex.binary_path, "/usr/local/bin/codex");
        assert_eq!(config.webhook.port, 9000);
        assert!(config.webhook.enabled);
        // Untouched sections keep their defaults.
        assert_eq!(config.notifications.max_rows, 5_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn load_from_str_rejects_unknown_keys() {
        let result = load_config_from_str(
            r#"
            [provider]
            api_kee = "typo"
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn empty_config_is_all_defaults() {
        let config = load_config_from_str("").unwrap();
        assert_eq!(config.provider.poll_interval_ms, 2_000);
        assert_eq!(config.log.level, "info");
    }
}
