// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the Herald configuration system.

use herald_config::diagnostic::ConfigError;
use herald_config::{load_and_validate_str, load_config_from_str};

#[test]
fn valid_toml_deserializes_into_herald_config() {
    let toml = r#"
[service]
name = "herald-test"
log_level = "debug"

[server]
host = "127.0.0.1"
port = 8080
bearer_token = "t0ken"

[storage]
database_path = "/tmp/herald.db"
wal_mode = false

[queue]
stale_timeout_secs = 30
stale_batch_limit = 10

[webhook]
targets = ["https://hooks.test/a"]
secret = "shh"
timeout_ms = 2000
max_attempts = 3
backoff_ms = 50

[phone]
default_country_code = "1"

[ingest]
inbound_window_secs = 60
"#;

    let config = load_config_from_str(toml).expect("valid TOML should deserialize");
    assert_eq!(config.service.name, "herald-test");
    assert_eq!(config.server.port, 8080);
    assert_eq!(config.server.bearer_token.as_deref(), Some("t0ken"));
    assert_eq!(config.storage.database_path, "/tmp/herald.db");
    assert!(!config.storage.wal_mode);
    assert_eq!(config.queue.stale_timeout_secs, 30);
    assert_eq!(config.webhook.targets, vec!["https://hooks.test/a"]);
    assert_eq!(config.webhook.secret.as_deref(), Some("shh"));
    assert_eq!(config.webhook.max_attempts, 3);
    assert_eq!(config.phone.default_country_code, "1");
    assert_eq!(config.ingest.inbound_window_secs, 60);
    assert_eq!(config.ingest.manual_outbound_window_secs, 90);
}

#[test]
fn empty_toml_uses_defaults() {
    let config = load_and_validate_str("").expect("defaults are valid");
    assert_eq!(config.server.port, 3000);
    assert_eq!(config.queue.stale_timeout_secs, 90);
}

#[test]
fn unknown_key_gets_suggestion() {
    let toml = r#"
[queue]
stale_timout_secs = 5
"#;

    let errors = load_and_validate_str(toml).expect_err("typo should be rejected");
    let unknown = errors
        .iter()
        .find_map(|e| match e {
            ConfigError::UnknownKey {
                key, suggestion, ..
            } => Some((key.clone(), suggestion.clone())),
            _ => None,
        })
        .expect("should produce an UnknownKey error");
    assert_eq!(unknown.0, "stale_timout_secs");
    assert_eq!(unknown.1.as_deref(), Some("stale_timeout_secs"));
}

#[test]
fn wrong_type_is_reported() {
    let toml = r#"
[server]
port = "eighty"
"#;
    let errors = load_and_validate_str(toml).expect_err("string port should fail");
    assert!(!errors.is_empty());
}

#[test]
fn semantic_errors_surface_as_validation() {
    let toml = r#"
[server]
host = "0.0.0.0"

[webhook]
targets = ["mailto:ops@example.com"]
"#;
    let errors = load_and_validate_str(toml).expect_err("should fail validation");
    assert_eq!(errors.len(), 2);
    assert!(
        errors
            .iter()
            .all(|e| matches!(e, ConfigError::Validation { .. }))
    );
}
