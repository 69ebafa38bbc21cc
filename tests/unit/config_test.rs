//! Tests for configuration validation

use prometheus_dispatch::config::DispatchConfig;

#[test]
fn test_dispatch_config_validation() {
    let valid = DispatchConfig::new().with_worker_count(4).with_queue_capacity(16);
    assert!(valid.validate().is_ok());
}

#[test]
fn test_dispatch_config_invalid_worker_count() {
    let invalid = DispatchConfig::new().with_worker_count(0);
    assert!(invalid.validate().is_err());
}

#[test]
fn test_dispatch_config_invalid_capacities() {
    assert!(DispatchConfig::new().with_queue_capacity(0).validate().is_err());
    assert!(DispatchConfig::new().with_sink_capacity(0).validate().is_err());
}

#[test]
fn test_dispatch_config_invalid_stack_size() {
    let invalid = DispatchConfig::new().with_thread_stack_size(1024);
    assert!(invalid.validate().is_err());
}

#[test]
fn test_dispatch_config_invalid_prefix() {
    let invalid = DispatchConfig::new().with_thread_name_prefix("");
    assert!(invalid.validate().is_err());
}

#[test]
fn test_dispatch_config_from_json() {
    let json = r#"{
        "worker_count": 3,
        "queue_capacity": 50,
        "sink_capacity": 25,
        "thread_name_prefix": "batch",
        "default_deadline_ms": 60000
    }"#;

    let config = DispatchConfig::from_json_str(json).expect("valid json config");
    assert_eq!(config.worker_count, 3);
    assert_eq!(config.queue_capacity, 50);
    assert_eq!(config.sink_capacity, 25);
    assert_eq!(config.thread_name_prefix, "batch");
    assert_eq!(config.default_deadline_ms, Some(60_000));
    assert_eq!(config.thread_stack_size, DispatchConfig::default().thread_stack_size);
}

#[test]
fn test_dispatch_config_from_json_invalid() {
    assert!(DispatchConfig::from_json_str(r#"{"worker_count": 0}"#).is_err());
    assert!(DispatchConfig::from_json_str("not json").is_err());
}

#[test]
fn test_dispatch_config_json_roundtrip_default() {
    let config = DispatchConfig::new().with_worker_count(2);
    let json = serde_json::to_string(&config).unwrap();
    assert_eq!(DispatchConfig::from_json_str(&json).unwrap(), config);
}
