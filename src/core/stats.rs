//! Per-run counters and serialisable snapshots.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use super::task::{TaskId, TaskResult};
use super::RunStatus;

/// Statistics about one dispatch run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    /// Number of worker threads.
    pub worker_count: usize,
    /// Tasks in the batch.
    pub total_tasks: u64,
    /// Tasks admitted to the queue.
    pub submitted_tasks: u64,
    /// Tasks waiting in the queue.
    pub queued_tasks: u64,
    /// Tasks currently executing.
    pub active_tasks: u64,
    /// Tasks that produced a value.
    pub succeeded_tasks: u64,
    /// Tasks that ran and failed.
    pub failed_tasks: u64,
    /// Tasks reported as cancelled.
    pub cancelled_tasks: u64,
    /// Run start, milliseconds since epoch.
    pub started_at_ms: u128,
}

impl RunStats {
    /// Tasks that have reported a result.
    pub const fn finished_tasks(&self) -> u64 {
        self.succeeded_tasks + self.failed_tasks + self.cancelled_tasks
    }
}

/// Serialisable summary of a run, for logs and API responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Run identifier.
    pub run_id: String,
    /// Lifecycle state at snapshot time.
    pub status: RunStatus,
    /// Counter snapshot.
    pub stats: RunStats,
}

/// Thread-safe counters owned by one run and shared with its threads.
#[derive(Debug, Default)]
pub(crate) struct RunCounters {
    pub submitted: AtomicU64,
    pub queued: AtomicU64,
    pub active: AtomicU64,
    pub succeeded: AtomicU64,
    pub failed: AtomicU64,
    pub cancelled: AtomicU64,
    /// One flag per batch task; an id is counted by outcome at most once.
    /// Ids outside the map are always counted.
    recorded: HashMap<TaskId, AtomicBool>,
}

impl RunCounters {
    /// Counters for a batch with the given task ids.
    pub fn for_tasks(ids: &[TaskId]) -> Self {
        Self {
            recorded: ids.iter().map(|&id| (id, AtomicBool::new(false))).collect(),
            ..Self::default()
        }
    }

    /// Count a finished task by outcome.
    ///
    /// Returns `false` if the task was already counted, e.g. reported
    /// cancelled at a deadline before a detached worker finished it.
    pub fn record<R>(&self, result: &TaskResult<R>) -> bool {
        if let Some(flag) = self.recorded.get(&result.id) {
            if flag.swap(true, Ordering::AcqRel) {
                return false;
            }
        }
        let counter = if result.is_success() {
            &self.succeeded
        } else if result.is_cancelled() {
            &self.cancelled
        } else {
            &self.failed
        };
        counter.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Get a snapshot of current statistics.
    pub fn snapshot(&self, worker_count: usize, total_tasks: u64, started_at_ms: u128) -> RunStats {
        RunStats {
            worker_count,
            total_tasks,
            submitted_tasks: self.submitted.load(Ordering::Relaxed),
            queued_tasks: self.queued.load(Ordering::Relaxed),
            active_tasks: self.active.load(Ordering::Relaxed),
            succeeded_tasks: self.succeeded.load(Ordering::Relaxed),
            failed_tasks: self.failed.load(Ordering::Relaxed),
            cancelled_tasks: self.cancelled.load(Ordering::Relaxed),
            started_at_ms,
        }
    }
}
