//! Tests for configuration validation

use std::collections::HashMap;
use std::time::Duration;

use prometheus_shift_slots::config::{AllocationConfig, StoreBackendConfig};

fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = vars.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect();
    move |key| map.get(key).cloned()
}

#[test]
fn test_default_config_is_valid() {
    let cfg = AllocationConfig::default();
    assert!(cfg.validate().is_ok());
    assert_eq!(cfg.backend, StoreBackendConfig::InMemory);
    assert_eq!(cfg.lock_timeout(), Duration::from_millis(5_000));
}

#[test]
fn test_zero_max_connections_rejected() {
    let cfg = AllocationConfig {
        max_connections: 0,
        ..AllocationConfig::default()
    };
    assert!(cfg.validate().is_err());
}

#[test]
fn test_zero_lock_timeout_rejected() {
    let cfg = AllocationConfig {
        lock_timeout_ms: 0,
        ..AllocationConfig::default()
    };
    assert!(cfg.validate().is_err());
}

#[test]
fn test_postgres_requires_database_url() {
    let cfg = AllocationConfig {
        backend: StoreBackendConfig::Postgres,
        database_url: None,
        ..AllocationConfig::default()
    };
    assert!(cfg.validate().unwrap_err().contains("database_url"));

    let cfg = AllocationConfig {
        backend: StoreBackendConfig::Postgres,
        database_url: Some("postgres://localhost/shifts".to_string()),
        ..AllocationConfig::default()
    };
    assert!(cfg.validate().is_ok());
}

#[test]
fn test_from_json_str_applies_defaults() {
    let cfg = AllocationConfig::from_json_str(r#"{ "backend": "in_memory" }"#).unwrap();
    assert_eq!(cfg.max_connections, 10);
    assert_eq!(cfg.lock_timeout_ms, 5_000);
}

#[test]
fn test_from_json_str_rejects_invalid() {
    assert!(AllocationConfig::from_json_str(r#"{ "backend": "postgres" }"#).is_err());
    assert!(AllocationConfig::from_json_str(r#"{ "backend": "redis" }"#).is_err());
    assert!(AllocationConfig::from_json_str("not json").unwrap_err().starts_with("parse error"));
}

#[test]
fn test_from_lookup_reads_variables() {
    let cfg = AllocationConfig::from_lookup(lookup(&[
        ("SHIFT_SLOTS_BACKEND", "postgres"),
        ("DATABASE_URL", "postgres://db/shifts"),
        ("SHIFT_SLOTS_MAX_CONNECTIONS", "4"),
        ("SHIFT_SLOTS_LOCK_TIMEOUT_MS", "250"),
    ]))
    .unwrap();
    assert_eq!(cfg.backend, StoreBackendConfig::Postgres);
    assert_eq!(cfg.database_url.as_deref(), Some("postgres://db/shifts"));
    assert_eq!(cfg.max_connections, 4);
    assert_eq!(cfg.lock_timeout(), Duration::from_millis(250));
}

#[test]
fn test_from_lookup_rejects_bad_numbers() {
    let err = AllocationConfig::from_lookup(lookup(&[("SHIFT_SLOTS_LOCK_TIMEOUT_MS", "soon")])).unwrap_err();
    assert!(err.starts_with("SHIFT_SLOTS_LOCK_TIMEOUT_MS"));
}

#[test]
fn test_from_lookup_empty_uses_defaults() {
    let cfg = AllocationConfig::from_lookup(|_| None).unwrap();
    assert_eq!(cfg, AllocationConfig::default());
}
