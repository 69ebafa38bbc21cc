//! Worker set: a fixed number of OS threads draining one run's task queue.
//!
//! Workers are symmetric and hold no state between tasks. Each fetched task
//! produces exactly one published result: a value, a captured failure, or
//! `Cancelled` when the run was cancelled before the task started.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::{debug, warn};
use uuid::Uuid;

use super::queue::TaskQueue;
use super::sink::ResultPublisher;
use super::stats::RunCounters;
use super::task::Task;

/// Everything a worker thread shares with its run.
pub(crate) struct WorkerContext<P, R> {
    pub run_id: Uuid,
    pub queue: Arc<TaskQueue<Task<P, R>>>,
    pub publisher: ResultPublisher<R>,
    pub cancelled: Arc<AtomicBool>,
    pub counters: Arc<RunCounters>,
}

impl<P, R> Clone for WorkerContext<P, R> {
    fn clone(&self) -> Self {
        Self {
            run_id: self.run_id,
            queue: Arc::clone(&self.queue),
            publisher: self.publisher.clone(),
            cancelled: Arc::clone(&self.cancelled),
            counters: Arc::clone(&self.counters),
        }
    }
}

/// Signals worker exit when dropped, including on unwind.
struct ExitGuard {
    worker_id: usize,
    tx: Sender<usize>,
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        let _ = self.tx.send(self.worker_id);
    }
}

/// Handles for the worker threads of one run.
#[derive(Debug)]
pub(crate) struct WorkerSet {
    handles: Vec<JoinHandle<()>>,
    exit_rx: Receiver<usize>,
}

impl WorkerSet {
    /// Spawn `count` workers named `<prefix>-<ordinal>`.
    ///
    /// If a spawn fails, the threads already started are returned alongside
    /// the error so the caller can shut them down.
    pub fn spawn<P, R>(
        count: usize,
        ctx: &WorkerContext<P, R>,
        name_prefix: &str,
        stack_size: usize,
    ) -> Result<Self, (Self, std::io::Error)>
    where
        P: Send + 'static,
        R: Send + 'static,
    {
        let (exit_tx, exit_rx) = unbounded();
        let mut set = Self {
            handles: Vec::with_capacity(count),
            exit_rx,
        };
        for worker_id in 0..count {
            let ctx = ctx.clone();
            let guard = ExitGuard {
                worker_id,
                tx: exit_tx.clone(),
            };
            let spawned = thread::Builder::new()
                .name(format!("{name_prefix}-{worker_id}"))
                .stack_size(stack_size)
                .spawn(move || {
                    let _guard = guard;
                    worker_loop(worker_id, &ctx);
                });
            match spawned {
                Ok(handle) => set.handles.push(handle),
                Err(err) => return Err((set, err)),
            }
        }
        Ok(set)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Join workers that exit within `grace`; detach the rest.
    ///
    /// Returns the number of detached workers.
    pub fn join_within(&mut self, grace: Duration) -> usize {
        let deadline = Instant::now() + grace;
        let mut exited = 0;
        while exited < self.handles.len() {
            if self.exit_rx.recv_deadline(deadline).is_err() {
                break;
            }
            exited += 1;
        }

        let all_exited = exited == self.handles.len();
        let mut detached = 0;
        for (worker_id, handle) in self.handles.drain(..).enumerate() {
            if !all_exited && !handle.is_finished() {
                warn!(worker_id = worker_id, "Worker did not exit within grace period - detaching");
                detached += 1;
                continue;
            }
            if handle.join().is_err() {
                warn!(worker_id = worker_id, "Worker thread panicked");
            }
        }
        detached
    }
}

fn worker_loop<P, R>(worker_id: usize, ctx: &WorkerContext<P, R>) {
    debug!(run_id = %ctx.run_id, worker_id = worker_id, "Worker thread started");

    let mut sink_gone = false;

    // Blocks on the queue; returns None once it is closed and drained.
    while let Some(task) = ctx.queue.next() {
        ctx.counters.queued.fetch_sub(1, Ordering::Relaxed);
        let task_id = task.id();

        // Cancellation is checked between tasks, never mid-task.
        let result = if sink_gone || ctx.cancelled.load(Ordering::Acquire) {
            debug!(run_id = %ctx.run_id, worker_id = worker_id, task_id = task_id, "Run cancelled, skipping task");
            task.cancel()
        } else {
            ctx.counters.active.fetch_add(1, Ordering::Relaxed);
            debug!(run_id = %ctx.run_id, worker_id = worker_id, task_id = task_id, "Worker executing task");
            let result = task.run();
            ctx.counters.active.fetch_sub(1, Ordering::Relaxed);
            if let Some(err) = result.error() {
                debug!(run_id = %ctx.run_id, worker_id = worker_id, task_id = task_id, error = %err, "Task failed");
            }
            result
        };

        ctx.counters.record(&result);
        // Keep draining after the sink is gone so a feeder blocked on a
        // full queue is released; remaining tasks are not run.
        if ctx.publisher.publish(result).is_err() && !sink_gone {
            warn!(run_id = %ctx.run_id, worker_id = worker_id, "Result sink dropped, draining queue without running tasks");
            sink_gone = true;
        }
    }

    debug!(run_id = %ctx.run_id, worker_id = worker_id, "Worker thread exiting");
}
