// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Herald delivery engine.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Herald configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct HeraldConfig {
    /// Service identity and logging.
    #[serde(default)]
    pub service: ServiceConfig,

    /// HTTP and websocket listener.
    #[serde(default)]
    pub server: ServerConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Job queue reservation and stale reclaim.
    #[serde(default)]
    pub queue: QueueConfig,

    /// Outbound webhook delivery.
    #[serde(default)]
    pub webhook: WebhookConfig,

    /// Phone normalization.
    #[serde(default)]
    pub phone: PhoneConfig,

    /// Inbound, manual outbound, and history ingestion.
    #[serde(default)]
    pub ingest: IngestConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    /// Instance name reported by the health endpoint and logs.
    #[serde(default = "default_service_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_service_name() -> String {
    "herald".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Bearer token required on `/api` routes and the event stream.
    /// Mandatory when binding to a non-loopback address.
    #[serde(default)]
    pub bearer_token: Option<String>,

    /// Buffered events per live subscriber before it starts skipping.
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            bearer_token: None,
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_event_channel_capacity() -> usize {
    1024
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for concurrent reads.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("herald").join("herald.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("herald.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_wal_mode() -> bool {
    true
}

/// Job queue configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct QueueConfig {
    /// Seconds a job may stay in `processing` before it is reclaimed.
    #[serde(default = "default_stale_timeout_secs")]
    pub stale_timeout_secs: u64,

    /// Maximum jobs reclaimed per claim call.
    #[serde(default = "default_stale_batch_limit")]
    pub stale_batch_limit: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            stale_timeout_secs: default_stale_timeout_secs(),
            stale_batch_limit: default_stale_batch_limit(),
        }
    }
}

fn default_stale_timeout_secs() -> u64 {
    90
}

fn default_stale_batch_limit() -> usize {
    25
}

/// Outbound webhook configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WebhookConfig {
    /// Endpoints receiving every event envelope. Accepts a TOML array or a
    /// comma-separated string (the form environment variables use).
    #[serde(default, deserialize_with = "string_or_list")]
    pub targets: Vec<String>,

    /// Shared secret for the HMAC-SHA256 signature header. Unsigned when absent.
    #[serde(default)]
    pub secret: Option<String>,

    /// Per-attempt request timeout in milliseconds.
    #[serde(default = "default_webhook_timeout_ms")]
    pub timeout_ms: u64,

    /// Total attempts per target, including the first.
    #[serde(default = "default_webhook_max_attempts")]
    pub max_attempts: u32,

    /// Linear backoff base: attempt `n` waits `n * backoff_ms` before retrying.
    #[serde(default = "default_webhook_backoff_ms")]
    pub backoff_ms: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            targets: Vec::new(),
            secret: None,
            timeout_ms: default_webhook_timeout_ms(),
            max_attempts: default_webhook_max_attempts(),
            backoff_ms: default_webhook_backoff_ms(),
        }
    }
}

fn string_or_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        One(String),
        Many(Vec<String>),
    }

    let items = match Raw::deserialize(deserializer)? {
        Raw::One(joined) => joined.split(',').map(str::to_string).collect(),
        Raw::Many(items) => items,
    };
    Ok(items
        .into_iter()
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect())
}

fn default_webhook_timeout_ms() -> u64 {
    8000
}

fn default_webhook_max_attempts() -> u32 {
    2
}

fn default_webhook_backoff_ms() -> u64 {
    300
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PhoneConfig {
    /// Country code prefixed to bare national numbers.
    #[serde(default = "default_country_code")]
    pub default_country_code: String,
}

impl Default for PhoneConfig {
    fn default() -> Self {
        Self {
            default_country_code: default_country_code(),
        }
    }
}

fn default_country_code() -> String {
    "55".to_string()
}

/// Ingestion and dedup configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct IngestConfig {
    /// Dedup window for inbound replies, in seconds.
    #[serde(default = "default_inbound_window_secs")]
    pub inbound_window_secs: u64,

    /// Dedup window for manually sent outbound messages, in seconds.
    #[serde(default = "default_manual_outbound_window_secs")]
    pub manual_outbound_window_secs: u64,

    /// Dedup window for history sync items matched by text, in seconds.
    #[serde(default = "default_history_window_secs")]
    pub history_window_secs: u64,

    /// Recent messages compared against when deduplicating single captures.
    #[serde(default = "default_recent_scan_limit")]
    pub recent_scan_limit: usize,

    /// Minimum digits before the all-messages fuzzy campaign lookup runs.
    #[serde(default = "default_fuzzy_min_digits")]
    pub fuzzy_min_digits: usize,

    /// History items returned when the caller gives no limit.
    #[serde(default = "default_history_default_limit")]
    pub history_default_limit: usize,

    /// Upper bound on history items per request.
    #[serde(default = "default_history_max_limit")]
    pub history_max_limit: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            inbound_window_secs: default_inbound_window_secs(),
            manual_outbound_window_secs: default_manual_outbound_window_secs(),
            history_window_secs: default_history_window_secs(),
            recent_scan_limit: default_recent_scan_limit(),
            fuzzy_min_digits: default_fuzzy_min_digits(),
            history_default_limit: default_history_default_limit(),
            history_max_limit: default_history_max_limit(),
        }
    }
}

fn default_inbound_window_secs() -> u64 {
    120
}

fn default_manual_outbound_window_secs() -> u64 {
    90
}

fn default_history_window_secs() -> u64 {
    90
}

fn default_recent_scan_limit() -> usize {
    25
}

fn default_fuzzy_min_digits() -> usize {
    8
}

fn default_history_default_limit() -> usize {
    2000
}

fn default_history_max_limit() -> usize {
    5000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = HeraldConfig::default();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.queue.stale_timeout_secs, 90);
        assert_eq!(config.queue.stale_batch_limit, 25);
        assert_eq!(config.webhook.timeout_ms, 8000);
        assert_eq!(config.webhook.max_attempts, 2);
        assert_eq!(config.webhook.backoff_ms, 300);
        assert_eq!(config.phone.default_country_code, "55");
        assert_eq!(config.ingest.inbound_window_secs, 120);
        assert_eq!(config.ingest.manual_outbound_window_secs, 90);
        assert!(config.storage.database_path.ends_with("herald.db"));
    }

    #[test]
    fn webhook_targets_accept_comma_separated_string() {
        let config: WebhookConfig =
            serde_json::from_str(r#"{"targets": "https://a.test/hook, ,https://b.test/hook"}"#)
                .unwrap();
        assert_eq!(
            config.targets,
            vec!["https://a.test/hook", "https://b.test/hook"]
        );

        let config: WebhookConfig =
            serde_json::from_str(r#"{"targets": ["https://a.test/hook"]}"#).unwrap();
        assert_eq!(config.targets, vec!["https://a.test/hook"]);
    }

    #[test]
    fn default_config_serializes_to_toml() {
        let config = HeraldConfig::default();
        let rendered = toml::to_string(&config).expect("default config should serialize");
        assert!(rendered.contains("[queue]"));
        assert!(rendered.contains("stale_timeout_secs = 90"));
    }
}
