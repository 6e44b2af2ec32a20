// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes.
//! Collects every failure instead of stopping at the first.

use std::net::IpAddr;

use crate::diagnostic::ConfigError;
use crate::model::HeraldConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration for semantic correctness.
pub fn validate_config(config: &HeraldConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if !LOG_LEVELS.contains(&config.service.log_level.as_str()) {
        errors.push(ConfigError::invalid(format!(
            "service.log_level `{}` must be one of: {}",
            config.service.log_level,
            LOG_LEVELS.join(", ")
        )));
    }

    validate_server(config, &mut errors);

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::invalid("storage.database_path must not be empty"));
    }

    if config.queue.stale_timeout_secs == 0 {
        errors.push(ConfigError::invalid(
            "queue.stale_timeout_secs must be at least 1",
        ));
    }
    if !(1..=1000).contains(&config.queue.stale_batch_limit) {
        errors.push(ConfigError::invalid(format!(
            "queue.stale_batch_limit must be between 1 and 1000, got {}",
            config.queue.stale_batch_limit
        )));
    }

    validate_webhook(config, &mut errors);

    let cc = &config.phone.default_country_code;
    if cc.is_empty() || cc.len() > 3 || !cc.chars().all(|c| c.is_ascii_digit()) {
        errors.push(ConfigError::invalid(format!(
            "phone.default_country_code `{cc}` must be 1 to 3 digits"
        )));
    }

    let ingest = &config.ingest;
    if ingest.recent_scan_limit == 0 {
        errors.push(ConfigError::invalid("ingest.recent_scan_limit must be at least 1"));
    }
    if ingest.history_default_limit == 0 || ingest.history_default_limit > ingest.history_max_limit
    {
        errors.push(ConfigError::invalid(format!(
            "ingest.history_default_limit must be between 1 and ingest.history_max_limit ({}), got {}",
            ingest.history_max_limit, ingest.history_default_limit
        )));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_server(config: &HeraldConfig, errors: &mut Vec<ConfigError>) {
    let host = config.server.host.trim();
    if host.is_empty() {
        errors.push(ConfigError::invalid("server.host must not be empty"));
        return;
    }

    let is_valid_ip = host.parse::<IpAddr>().is_ok();
    let is_valid_hostname = host
        .chars()
        .all(|c| c.is_alphanumeric() || c == '.' || c == '-');
    if !is_valid_ip && !is_valid_hostname {
        errors.push(ConfigError::invalid(format!(
            "server.host `{host}` is not a valid IP address or hostname"
        )));
    }

    if config.server.event_channel_capacity == 0 {
        errors.push(ConfigError::invalid(
            "server.event_channel_capacity must be at least 1",
        ));
    }

    let has_token = config
        .server
        .bearer_token
        .as_deref()
        .is_some_and(|t| !t.trim().is_empty());
    if !has_token && !is_loopback(host) {
        errors.push(ConfigError::invalid(format!(
            "server.bearer_token is required when server.host `{host}` is not a loopback address"
        )));
    }
}

fn validate_webhook(config: &HeraldConfig, errors: &mut Vec<ConfigError>) {
    for target in &config.webhook.targets {
        if !(target.starts_with("http://") || target.starts_with("https://")) {
            errors.push(ConfigError::invalid(format!(
                "webhook target `{target}` must start with http:// or https://"
            )));
        }
    }
    if config.webhook.max_attempts == 0 {
        errors.push(ConfigError::invalid("webhook.max_attempts must be at least 1"));
    }
    if config.webhook.timeout_ms == 0 {
        errors.push(ConfigError::invalid("webhook.timeout_ms must be at least 1"));
    }
}

fn is_loopback(host: &str) -> bool {
    host.eq_ignore_ascii_case("localhost")
        || host.parse::<IpAddr>().is_ok_and(|ip| ip.is_loopback())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&HeraldConfig::default()).is_ok());
    }

    #[test]
    fn public_bind_requires_token() {
        let mut config = HeraldConfig::default();
        config.server.host = "0.0.0.0".into();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].to_string().contains("bearer_token"));

        config.server.bearer_token = Some("s3cret".into());
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn collects_all_errors() {
        let mut config = HeraldConfig::default();
        config.queue.stale_timeout_secs = 0;
        config.webhook.targets = vec!["ftp://nope".into()];
        config.webhook.max_attempts = 0;
        config.phone.default_country_code = "+55".into();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
    }

    #[test]
    fn rejects_unknown_log_level() {
        let mut config = HeraldConfig::default();
        config.service.log_level = "loud".into();
        assert!(validate_config(&config).is_err());
    }
}
