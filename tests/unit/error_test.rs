//! Tests for error types

use prometheus_dispatch::core::{DispatchError, TaskError};

#[test]
fn test_queue_closed_error() {
    assert_eq!(format!("{}", DispatchError::QueueClosed), "task queue is closed");
}

#[test]
fn test_queue_full_error() {
    assert_eq!(format!("{}", DispatchError::QueueFull), "task queue is full");
}

#[test]
fn test_duplicate_task_id_error() {
    let err = DispatchError::DuplicateTaskId(42);
    assert_eq!(format!("{}", err), "duplicate task id 42 in batch");
}

#[test]
fn test_spawn_error_from_io() {
    let io = std::io::Error::new(std::io::ErrorKind::Other, "no threads left");
    let err: DispatchError = io.into();
    assert_eq!(format!("{}", err), "failed to spawn thread: no threads left");
}

#[test]
fn test_task_error_display() {
    assert_eq!(
        format!("{}", TaskError::Failure("divide by zero".into())),
        "task failed: divide by zero"
    );
    assert_eq!(format!("{}", TaskError::Cancelled), "task cancelled");
}

#[test]
fn test_task_error_serde() {
    let json = serde_json::to_string(&TaskError::Cancelled).unwrap();
    assert_eq!(json, "\"cancelled\"");
    let back: TaskError = serde_json::from_str(r#"{"failure":"boom"}"#).unwrap();
    assert_eq!(back, TaskError::Failure("boom".into()));
}
