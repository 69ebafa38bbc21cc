//! Integration tests for staged pipelines
//!
//! Covers the generator → square → consumer chain, type-changing stages,
//! ordering, rendezvous hand-off and early consumer exit.

use prometheus_dispatch::core::{DispatchError, Pipeline};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[test]
fn test_square_pipeline() {
    println!("\n=== test_square_pipeline ===");

    let out = Pipeline::source(vec![2, 3, 4], 0)
        .expect("source")
        .stage(|n: i64| n * n)
        .expect("stage")
        .finish()
        .expect("finish");

    println!("Output: {:?}", out);
    assert_eq!(out, vec![4, 9, 16]);

    println!("=== test_square_pipeline PASSED ===\n");
}

#[test]
fn test_multi_stage_preserves_order() {
    let out = Pipeline::source(0..1000_u64, 16)
        .unwrap()
        .stage(|n| n + 1)
        .unwrap()
        .stage(|n| {
            if n % 100 == 0 {
                thread::sleep(Duration::from_millis(1));
            }
            n * 2
        })
        .unwrap()
        .stage(|n| n.to_string())
        .unwrap()
        .finish()
        .unwrap();

    assert_eq!(out.len(), 1000);
    assert_eq!(out[0], "2");
    assert_eq!(out[999], "2000");
}

#[test]
fn test_streaming_consumer() {
    let pipeline = Pipeline::source(vec!["a", "bb", "ccc"], 1)
        .unwrap()
        .stage(str::len)
        .unwrap();
    assert_eq!(pipeline.stage_count(), 2);

    let total: usize = pipeline.into_iter().sum();
    assert_eq!(total, 6);
}

#[test]
fn test_empty_source() {
    let out = Pipeline::source(Vec::<u8>::new(), 4)
        .unwrap()
        .stage(|b| b.wrapping_add(1))
        .unwrap()
        .finish()
        .unwrap();
    assert!(out.is_empty());
}

#[test]
fn test_early_consumer_exit_stops_stages() {
    let processed = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&processed);

    let mut iter = Pipeline::source(0..u64::MAX, 2)
        .unwrap()
        .stage(move |n| {
            counter.fetch_add(1, Ordering::SeqCst);
            n
        })
        .unwrap()
        .into_iter();

    assert_eq!(iter.next(), Some(0));
    assert_eq!(iter.next(), Some(1));
    drop(iter);

    thread::sleep(Duration::from_millis(50));
    let after_drop = processed.load(Ordering::SeqCst);
    thread::sleep(Duration::from_millis(50));
    // Bounded buffers mean only a handful of items were ever in flight.
    assert!(after_drop < 16, "processed {after_drop} items");
    assert_eq!(processed.load(Ordering::SeqCst), after_drop);
}

#[test]
fn test_stage_panic_is_reported() {
    let result = Pipeline::source(1..=5_i32, 1)
        .unwrap()
        .stage(|n| 10 / (n - 3))
        .unwrap()
        .finish();
    assert!(matches!(result, Err(DispatchError::Internal(_))));
}
