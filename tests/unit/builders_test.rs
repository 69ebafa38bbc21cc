//! Tests for dispatcher builders

use prometheus_dispatch::builders::build_dispatcher;
use prometheus_dispatch::config::DispatchConfig;
use prometheus_dispatch::core::{DispatchError, Task};

#[test]
fn test_build_dispatcher_from_config() {
    let dispatcher = build_dispatcher(DispatchConfig::new().with_worker_count(2)).expect("valid config");
    assert_eq!(dispatcher.config().worker_count, 2);

    let run = dispatcher
        .start(vec![Task::from_fn(1, 20_u32, |x| x + 1)])
        .expect("run starts");
    let results = run.await_completion(None).expect("run completes");
    assert_eq!(results[&1].value(), Some(&21));
}

#[test]
fn test_build_dispatcher_invalid_config() {
    let err = build_dispatcher(DispatchConfig::new().with_sink_capacity(0)).unwrap_err();
    assert!(matches!(err, DispatchError::InvalidConfig(_)));
}
