// SPDX-FileCopyrightText: 2026 Wireline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Wireline bridge.
//!
//! All sections are optional in the file and default to sensible values;
//! `validate()` enforces the documented ranges after loading. Secrets never
//! appear in `Debug` output.

use serde::{Deserialize, Serialize};
use wireline_core::WirelineError;

/// Top-level Wireline configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
    /// Messaging-provider credentials and polling settings.
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Agent child-process settings.
    #[serde(default)]
    pub codex: CodexConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Optional user-facing behaviors.
    #[serde(default)]
    pub features: FeatureConfig,

    /// Notification pipeline settings.
    #[serde(default)]
    pub notifications: NotificationConfig,

    /// Webhook ingress settings.
    #[serde(default)]
    pub webhook: WebhookConfig,

    /// Logging settings.
    #[serde(default)]
    pub log: LogConfig,
}

impl BridgeConfig {
    /// Validates all configured values against their documented ranges.
    pub fn validate(&self) -> Result<(), WirelineError> {
        self.provider.validate()?;
        self.codex.validate()?;
        self.features.validate()?;
        self.notifications.validate()?;
        self.webhook.validate()?;
        Ok(())
    }
}

/// Messaging-provider settings.
#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    /// Base URL of the provider HTTP API.
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Provider API key header value. Required to run.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Provider API secret header value. Required to run.
    #[serde(default)]
    pub api_secret: Option<String>,

    /// The single trusted phone number allowed to drive the bridge.
    #[serde(default)]
    pub trusted_number: Option<String>,

    /// The number outbound messages are sent from.
    #[serde(default)]
    pub from_number: Option<String>,

    /// Poll interval in milliseconds. Range 250..=30000.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Per-request timeout for inbound fetches, in seconds.
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            api_key: None,
            api_secret: None,
            trusted_number: None,
            from_number: None,
            poll_interval_ms: default_poll_interval_ms(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
        }
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_base", &self.api_base)
            .field("api_key", &self.api_key.as_ref().map(|_| "[redacted]"))
            .field("api_secret", &self.api_secret.as_ref().map(|_| "[redacted]"))
            .field("trusted_number", &self.trusted_number)
            .field("from_number", &self.from_number)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("fetch_timeout_secs", &self.fetch_timeout_secs)
            .finish()
    }
}

impl ProviderConfig {
    fn validate(&self) -> Result<(), WirelineError> {
        if self.api_key.as_deref().unwrap_or("").is_empty() {
            return Err(WirelineError::Config(
                "provider.api_key is required".into(),
            ));
        }
        if self.api_secret.as_deref().unwrap_or("").is_empty() {
            return Err(WirelineError::Config(
                "provider.api_secret is required".into(),
            ));
        }
        if self.trusted_number.as_deref().unwrap_or("").is_empty() {
            return Err(WirelineError::Config(
                "provider.trusted_number is required".into(),
            ));
        }
        if self.from_number.as_deref().unwrap_or("").is_empty() {
            return Err(WirelineError::Config(
                "provider.from_number is required".into(),
            ));
        }
        if !(250..=30_000).contains(&self.poll_interval_ms) {
            return Err(WirelineError::Config(format!(
                "provider.poll_interval_ms must be within 250..=30000, got {}",
                self.poll_interval_ms
            )));
        }
        Ok(())
    }
}

fn default_api_base() -> String {
    "https://api.sendline.dev".to_string()
}

fn default_poll_interval_ms() -> u64 {
    2_000
}

fn default_fetch_timeout_secs() -> u64 {
    10
}

/// Agent child-process settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CodexConfig {
    /// Path to the agent binary.
    #[serde(default = "default_codex_binary")]
    pub binary_path: String,

    /// Working directory the agent runs turns in.
    #[serde(default = "default_codex_cwd")]
    pub working_dir: String,

    /// Required prefix for any model id accepted by `/model`.
    #[serde(default = "default_model_prefix")]
    pub model_prefix: String,

    /// Model used when the session has none persisted.
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Sandbox mode passed through on `thread/start`.
    #[serde(default = "default_sandbox_mode")]
    pub sandbox_mode: String,

    /// Default timeout for JSON-RPC requests, in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for CodexConfig {
    fn default() -> Self {
        Self {
            binary_path: default_codex_binary(),
            working_dir: default_codex_cwd(),
            model_prefix: default_model_prefix(),
            default_model: default_model(),
            sandbox_mode: default_sandbox_mode(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl CodexConfig {
    fn validate(&self) -> Result<(), WirelineError> {
        if self.binary_path.is_empty() {
            return Err(WirelineError::Config("codex.binary_path is required".into()));
        }
        if !self.default_model.starts_with(&self.model_prefix) {
            return Err(WirelineError::Config(format!(
                "codex.default_model {:?} must start with model_prefix {:?}",
                self.default_model, self.model_prefix
            )));
        }
        Ok(())
    }
}

fn default_codex_binary() -> String {
    "codex".to_string()
}

fn default_codex_cwd() -> String {
    ".".to_string()
}

fn default_model_prefix() -> String {
    "gpt-5.3".to_string()
}

fn default_model() -> String {
    "gpt-5.3-codex".to_string()
}

fn default_sandbox_mode() -> String {
    "workspace-write".to_string()
}

fn default_request_timeout_secs() -> u64 {
    120
}

/// Storage backend settings.
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
    "wireline.db".to_string()
}

/// Optional user-facing behaviors.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FeatureConfig {
    /// Send typing indicators while a user-mode turn streams.
    #[serde(default = "default_true")]
    pub typing_indicators: bool,

    /// Typing-indicator heartbeat interval in seconds. Range 3..=30.
    #[serde(default = "default_typing_heartbeat_secs")]
    pub typing_heartbeat_secs: u64,

    /// Send read receipts for handled inbound messages.
    #[serde(default = "default_true")]
    pub read_receipts: bool,

    /// Apply Markdown-to-Unicode styling to outbound text.
    #[serde(default = "default_true")]
    pub outbound_styling: bool,

    /// Discard the inbound backlog on startup instead of replaying it.
    #[serde(default)]
    pub discard_backlog_on_start: bool,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            typing_indicators: true,
            typing_heartbeat_secs: default_typing_heartbeat_secs(),
            read_receipts: true,
            outbound_styling: true,
            discard_backlog_on_start: false,
        }
    }
}

impl FeatureConfig {
    fn validate(&self) -> Result<(), WirelineError> {
        if !(3..=30).contains(&self.typing_heartbeat_secs) {
            return Err(WirelineError::Config(format!(
                "features.typing_heartbeat_secs must be within 3..=30, got {}",
                self.typing_heartbeat_secs
            )));
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}

fn default_typing_heartbeat_secs() -> u64 {
    10
}

/// Notification pipeline settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct NotificationConfig {
    /// Master switch for the notification pipeline.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Bytes of raw payload kept as the excerpt. Clamped to 256..=32768.
    #[serde(default = "default_raw_excerpt_bytes")]
    pub raw_excerpt_bytes: usize,

    /// Days a notification row is retained before pruning. Minimum 1.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    /// Hard cap on stored notification rows. Minimum 100.
    #[serde(default = "default_max_rows")]
    pub max_rows: u32,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            raw_excerpt_bytes: default_raw_excerpt_bytes(),
            retention_days: default_retention_days(),
            max_rows: default_max_rows(),
        }
    }
}

impl NotificationConfig {
    fn validate(&self) -> Result<(), WirelineError> {
        if !(256..=32_768).contains(&self.raw_excerpt_bytes) {
            return Err(WirelineError::Config(format!(
                "notifications.raw_excerpt_bytes must be within 256..=32768, got {}",
                self.raw_excerpt_bytes
            )));
        }
        if self.retention_days < 1 {
            return Err(WirelineError::Config(
                "notifications.retention_days must be at least 1".into(),
            ));
        }
        if self.max_rows < 100 {
            return Err(WirelineError::Config(
                "notifications.max_rows must be at least 100".into(),
            ));
        }
        Ok(())
    }
}

fn default_raw_excerpt_bytes() -> usize {
    4_096
}

fn default_retention_days() -> u32 {
    30
}

fn default_max_rows() -> u32 {
    5_000
}

/// Webhook ingress settings.
#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WebhookConfig {
    /// Enable the webhook HTTP server.
    #[serde(default)]
    pub enabled: bool,

    /// Host to bind.
    #[serde(default = "default_webhook_host")]
    pub host: String,

    /// Port to bind.
    #[serde(default = "default_webhook_port")]
    pub port: u16,

    /// Request path the ingress accepts POSTs on.
    #[serde(default = "default_webhook_path")]
    pub path: String,

    /// Shared secret. Required when the webhook is enabled.
    #[serde(default)]
    pub secret: Option<String>,

    /// Maximum accepted body size in bytes.
    #[serde(default = "default_webhook_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: default_webhook_host(),
            port: default_webhook_port(),
            path: default_webhook_path(),
            secret: None,
            max_body_bytes: default_webhook_max_body_bytes(),
        }
    }
}

impl std::fmt::Debug for WebhookConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookConfig")
            .field("enabled", &self.enabled)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("path", &self.path)
            .field("secret", &self.secret.as_ref().map(|_| "[redacted]"))
            .field("max_body_bytes", &self.max_body_bytes)
            .finish()
    }
}

impl WebhookConfig {
    fn validate(&self) -> Result<(), WirelineError> {
        if self.enabled && self.secret.as_deref().unwrap_or("").is_empty() {
            return Err(WirelineError::Config(
                "webhook.secret is required when webhook.enabled is true".into(),
            ));
        }
        if !self.path.starts_with('/') {
            return Err(WirelineError::Config(format!(
                "webhook.path must start with '/', got {:?}",
                self.path
            )));
        }
        Ok(())
    }
}

fn default_webhook_host() -> String {
    "127.0.0.1".to_string()
}

fn default_webhook_port() -> u16 {
    8787
}

fn default_webhook_path() -> String {
    "/hooks/notify".to_string()
}

fn default_webhook_max_body_bytes() -> usize {
    1024 * 1024
}

/// Logging settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LogConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runnable_config() -> BridgeConfig {
        let mut config = BridgeConfig::default();
        config.provider.api_key = Some("key-abc123".into());
        config.provider.api_secret = Some("sek-def456".into());
        config.provider.trusted_number = Some("+15550001111".into());
        config.provider.from_number = Some("+15550002222".into());
        config
    }

    #[test]
    fn defaults_fill_every_section() {
        let config = BridgeConfig::default();
        assert_eq!(config.provider.poll_interval_ms, 2_000);
        assert_eq!(config.codex.default_model, "gpt-5.3-codex");
        assert_eq!(config.codex.model_prefix, "gpt-5.3");
        assert_eq!(config.storage.database_path, "wireline.db");
        assert!(config.features.typing_indicators);
        assert_eq!(config.notifications.retention_days, 30);
        assert!(!config.webhook.enabled);
    }

    #[test]
    fn validate_requires_provider_credentials() {
        let config = BridgeConfig::default();
        assert!(config.validate().is_err());
        assert!(runnable_config().validate().is_ok());
    }

    #[test]
    fn validate_rejects_out_of_range_poll_interval() {
        let mut config = runnable_config();
        config.provider.poll_interval_ms = 100;
        assert!(config.validate().is_err());
        config.provider.poll_interval_ms = 31_000;
        assert!(config.validate().is_err());
        config.provider.poll_interval_ms = 250;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_bad_typing_heartbeat() {
        let mut config = runnable_config();
        config.features.typing_heartbeat_secs = 2;
        assert!(config.validate().is_err());
        config.features.typing_heartbeat_secs = 31;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_notification_ranges() {
        let mut config = runnable_config();
        config.notifications.raw_excerpt_bytes = 64;
        assert!(config.validate().is_err());

        let mut config = runnable_config();
        config.notifications.max_rows = 10;
        assert!(config.validate().is_err());

        let mut config = runnable_config();
        config.notifications.retention_days = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_requires_webhook_secret_when_enabled() {
        let mut config = runnable_config();
        config.webhook.enabled = true;
        assert!(config.validate().is_err());
        config.webhook.secret = Some("hunter2".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_model_outside_prefix() {
        let mut config = runnable_config();
        config.codex.default_model = "o9-mini".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn debug_redacts_secrets() {
        let config = runnable_config();
        let debug = format!("{:?}", config.provider);
        assert!(!debug.contains("key-abc123"), "got: {debug}");
        assert!(!debug.contains("sek-def456"), "got: {debug}");
        assert!(debug.contains("[redacted]"));

        let mut webhook = WebhookConfig::default();
        webhook.secret = Some("hunter2".into());
        let debug = format!("{webhook:?}");
        assert!(!debug.contains("hunter2"));
    }
}
