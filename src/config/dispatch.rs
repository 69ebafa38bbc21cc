//! Dispatcher configuration.

use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};

use crate::core::AppResult;

/// Default bound for the task queue and the result sink.
pub const DEFAULT_CAPACITY: usize = 1024;
/// Default worker thread stack size (2 MiB).
pub const DEFAULT_STACK_SIZE: usize = 2 * 1024 * 1024;
/// Smallest stack size accepted for worker threads.
pub const MIN_STACK_SIZE: usize = 64 * 1024;

/// Configuration shared by every run of a [`Dispatcher`](crate::core::Dispatcher).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Worker threads per run.
    pub worker_count: usize,
    /// Maximum pending tasks before submission blocks.
    pub queue_capacity: usize,
    /// Maximum buffered results before workers block.
    pub sink_capacity: usize,
    /// Stack size of each worker thread, in bytes.
    pub thread_stack_size: usize,
    /// Thread name prefix; workers are named `<prefix>-<ordinal>`.
    pub thread_name_prefix: String,
    /// Deadline applied when `await_completion` is given none.
    pub default_deadline_ms: Option<u64>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            worker_count: num_cpus::get().max(1),
            queue_capacity: DEFAULT_CAPACITY,
            sink_capacity: DEFAULT_CAPACITY,
            thread_stack_size: DEFAULT_STACK_SIZE,
            thread_name_prefix: "dispatch-worker".to_string(),
            default_deadline_ms: None,
        }
    }
}

impl DispatchConfig {
    /// Defaults: one worker per CPU, capacities of [`DEFAULT_CAPACITY`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of workers.
    #[must_use]
    pub const fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    /// Set the task queue bound.
    #[must_use]
    pub const fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Set the result sink bound.
    #[must_use]
    pub const fn with_sink_capacity(mut self, capacity: usize) -> Self {
        self.sink_capacity = capacity;
        self
    }

    /// Set the worker stack size.
    #[must_use]
    pub const fn with_thread_stack_size(mut self, bytes: usize) -> Self {
        self.thread_stack_size = bytes;
        self
    }

    /// Set the worker thread name prefix.
    #[must_use]
    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Set the default completion deadline.
    #[must_use]
    pub fn with_default_deadline(mut self, deadline: Duration) -> Self {
        self.default_deadline_ms = Some(u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Default completion deadline, if configured.
    pub fn default_deadline(&self) -> Option<Duration> {
        self.default_deadline_ms.map(Duration::from_millis)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.worker_count == 0 {
            return Err("worker_count must be greater than 0".into());
        }
        if self.queue_capacity == 0 {
            return Err("queue_capacity must be greater than 0".into());
        }
        if self.sink_capacity == 0 {
            return Err("sink_capacity must be greater than 0".into());
        }
        if self.thread_stack_size < MIN_STACK_SIZE {
            return Err(format!("thread_stack_size must be at least {MIN_STACK_SIZE} bytes"));
        }
        if self.thread_name_prefix.is_empty() {
            return Err("thread_name_prefix must not be empty".into());
        }
        if self.default_deadline_ms == Some(0) {
            return Err("default_deadline_ms must be greater than 0".into());
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    ///
    /// Missing fields take their default values.
    ///
    /// # Errors
    ///
    /// Returns a description of the parse or validation failure.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load configuration from `DISPATCH_*` environment variables, reading
    /// a `.env` file first if one exists.
    ///
    /// | Variable | Field |
    /// |---|---|
    /// | `DISPATCH_WORKER_COUNT` | `worker_count` |
    /// | `DISPATCH_QUEUE_CAPACITY` | `queue_capacity` |
    /// | `DISPATCH_SINK_CAPACITY` | `sink_capacity` |
    /// | `DISPATCH_THREAD_STACK_SIZE` | `thread_stack_size` |
    /// | `DISPATCH_THREAD_NAME_PREFIX` | `thread_name_prefix` |
    /// | `DISPATCH_DEFAULT_DEADLINE_MS` | `default_deadline_ms` |
    ///
    /// # Errors
    ///
    /// Fails if a variable cannot be parsed or the result is invalid.
    pub fn from_env() -> AppResult<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup, starting from
    /// defaults. Used by [`DispatchConfig::from_env`].
    ///
    /// # Errors
    ///
    /// Fails if a value cannot be parsed or the result is invalid.
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        if let Some(v) = parse_var(&lookup, "DISPATCH_WORKER_COUNT")? {
            cfg.worker_count = v;
        }
        if let Some(v) = parse_var(&lookup, "DISPATCH_QUEUE_CAPACITY")? {
            cfg.queue_capacity = v;
        }
        if let Some(v) = parse_var(&lookup, "DISPATCH_SINK_CAPACITY")? {
            cfg.sink_capacity = v;
        }
        if let Some(v) = parse_var(&lookup, "DISPATCH_THREAD_STACK_SIZE")? {
            cfg.thread_stack_size = v;
        }
        if let Some(v) = lookup("DISPATCH_THREAD_NAME_PREFIX") {
            cfg.thread_name_prefix = v;
        }
        if let Some(v) = parse_var(&lookup, "DISPATCH_DEFAULT_DEADLINE_MS")? {
            cfg.default_deadline_ms = Some(v);
        }
        cfg.validate()
            .map_err(|e| anyhow!("dispatch config from environment invalid: {e}"))?;
        Ok(cfg)
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> AppResult<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .with_context(|| format!("invalid value for {key}: {raw:?}"))
        })
        .transpose()
}
