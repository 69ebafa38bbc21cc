//! # Prometheus Dispatch
//!
//! A bounded worker-dispatch engine for batch task execution.
//!
//! A caller hands a batch of independent tasks to a [`Dispatcher`](core::Dispatcher).
//! Each run gets its own bounded task queue, a fixed set of worker threads
//! and a bounded result sink. Results come back keyed by task identifier,
//! one per task, in no particular order.
//!
//! ## Key Features
//!
//! - **Backpressure**: Bounded queue and sink cap memory use for large batches
//! - **Failure Isolation**: A task's error or panic becomes its own result and never touches siblings
//! - **Cooperative Cancellation**: Workers check a shared flag between tasks; unstarted tasks report `Cancelled`
//! - **Deadlines**: `await_completion` takes an optional deadline and keeps partial results on timeout
//! - **Pipelines**: Chain single-threaded stages over bounded channels
//!
//! ## Example
//!
//! ```rust,ignore
//! use prometheus_dispatch::config::DispatchConfig;
//! use prometheus_dispatch::core::{Dispatcher, Task};
//! use std::time::Duration;
//!
//! let dispatcher = Dispatcher::new(
//!     DispatchConfig::new()
//!         .with_worker_count(4)
//!         .with_queue_capacity(256),
//! )?;
//!
//! let tasks = (1..=5)
//!     .map(|x| Task::new(x, x, |x| if x == 3 { Err("divide by zero") } else { Ok(x * 2) }))
//!     .collect();
//!
//! let run = dispatcher.start_run(tasks, 3)?;
//! let results = run.await_completion(Some(Duration::from_secs(30)))?;
//! assert_eq!(results.len(), 5);
//! assert!(results[&3].is_failure());
//! ```
//!
//! For complete examples, see:
//! - `tests/dispatch_test.rs` - Full integration tests
//! - `tests/pipeline_test.rs` - Pipeline stages

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Dispatch engine: queue, workers, sink and run lifecycle.
pub mod core;
/// Configuration models for the dispatcher.
pub mod config;
/// Builders to construct dispatchers from configuration.
pub mod builders;
/// Shared utilities.
pub mod util;
