// SPDX-FileCopyrightText: 2026 Portage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for configuration loading and defaults.

use portage_config::{DEFAULT_TOKEN, load_config_from_str};

#[test]
fn defaults_match_documented_values() {
    let config = load_config_from_str("").expect("empty config should load");

    assert_eq!(config.source.host, "127.0.0.1");
    assert_eq!(config.source.port, 63155);
    assert_eq!(config.source.path, "/messages");
    assert_eq!(config.source.timeout_ms, 3000);

    assert_eq!(config.sync.poll_secs, 6);
    assert_eq!(config.sync.max_stored_messages, 5);
    assert!(config.sync.auto_send);

    assert_eq!(config.attachments.retry_limit, 2);
    assert_eq!(config.attachments.retry_delay_ms, 1500);
    assert_eq!(config.attachments.concurrency, 2);

    assert_eq!(config.cache.ttl_ms, 300_000);
    assert_eq!(config.cache.max_entries, 50);

    assert!(config.target.webhook_url.is_none());
}

#[test]
fn toml_overrides_defaults() {
    let config = load_config_from_str(
        r#"
        [source]
        host = "10.0.0.2"
        port = 9000
        timeout_ms = 500

        [sync]
        poll_secs = 1
        max_stored_messages = 20

        [target]
        webhook_url = "http://127.0.0.1:8080/deliver"
        "#,
    )
    .expect("config should load");

    assert_eq!(config.source.host, "10.0.0.2");
    assert_eq!(config.source.port, 9000);
    assert_eq!(config.source.timeout_ms, 500);
    assert_eq!(config.sync.poll_secs, 1);
    assert_eq!(config.sync.max_stored_messages, 20);
    assert_eq!(
        config.target.webhook_url.as_deref(),
        Some("http://127.0.0.1:8080/deliver")
    );
    // Untouched sections keep their defaults.
    assert_eq!(config.attachments.retry_limit, 2);
}

#[test]
fn unknown_keys_are_rejected() {
    let result = load_config_from_str(
        r#"
        [source]
        hots = "typo"
        "#,
    );
    assert!(result.is_err(), "unknown key should be rejected");
}

#[test]
fn default_token_is_nonempty() {
    assert!(!DEFAULT_TOKEN.is_empty());
}
