//! Tests for the result sink

use prometheus_dispatch::core::{bounded_sink, TaskError, TaskResult};
use std::time::{Duration, Instant};

#[test]
fn test_sink_counts_towards_expected() {
    let (publisher, sink) = bounded_sink::<u32>(4, 2);
    assert_eq!(sink.expected(), 2);
    assert!(!sink.is_complete());

    publisher.publish(TaskResult { id: 1, outcome: Ok(10) }).unwrap();
    publisher
        .publish(TaskResult {
            id: 2,
            outcome: Err(TaskError::Failure("bad".into())),
        })
        .unwrap();

    let first = sink.recv_until(Some(Instant::now() + Duration::from_secs(1))).unwrap();
    assert_eq!(first.map(|r| r.id), Some(1));
    let second = sink.try_collect().unwrap();
    assert!(second.is_failure());

    assert!(sink.is_complete());
    assert!(sink.recv_until(None).unwrap().is_none());
}

#[test]
fn test_sink_ends_when_publishers_gone() {
    let (publisher, sink) = bounded_sink::<u32>(4, 5);
    publisher.publish(TaskResult { id: 1, outcome: Ok(1) }).unwrap();
    drop(publisher);

    let collected: Vec<_> = sink.collect().collect();
    assert_eq!(collected.len(), 1);
    assert!(!sink.is_complete());
}
