//! Dispatcher and run handle.
//!
//! [`Dispatcher::start_run`] creates the queue, sink and worker set for one
//! batch and returns a [`RunHandle`] that owns the run's lifecycle:
//!
//! ```text
//! Idle → Running → Draining → Completed
//!           └──────────┴──→ Cancelled → Completed
//! ```
//!
//! Tasks are fed into the bounded queue from a dedicated feeder thread, so
//! the caller gets its handle immediately and can collect results while
//! submission is still under backpressure.
//!
//! # Example
//!
//! ```rust,ignore
//! use prometheus_dispatch::config::DispatchConfig;
//! use prometheus_dispatch::core::{Dispatcher, Task};
//!
//! let dispatcher = Dispatcher::new(DispatchConfig::new().with_worker_count(3))?;
//! let tasks = (1..=5).map(|x| Task::from_fn(x, x, |x| x * 2)).collect();
//! let run = dispatcher.start_run(tasks, 3)?;
//! let results = run.await_completion(None)?;
//! assert_eq!(results[&3].value(), Some(&6));
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::DispatchConfig;
use crate::util::clock::now_ms;

use super::error::DispatchError;
use super::queue::TaskQueue;
use super::sink::{bounded_sink, ResultPublisher, ResultSink};
use super::state::{RunState, RunStatus};
use super::stats::{RunCounters, RunStats, RunSummary};
use super::task::{Task, TaskId, TaskResult};
use super::worker::{WorkerContext, WorkerSet};

/// How long workers get to exit once a run is finished.
const WORKER_JOIN_GRACE: Duration = Duration::from_secs(2);

/// Entry point for dispatch runs.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    config: DispatchConfig,
}

impl Dispatcher {
    /// Create a dispatcher from a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::InvalidConfig` if the configuration is invalid.
    pub fn new(config: DispatchConfig) -> Result<Self, DispatchError> {
        config.validate().map_err(DispatchError::InvalidConfig)?;
        Ok(Self { config })
    }

    /// Configuration used for every run.
    pub const fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Start a run with the configured worker count.
    ///
    /// # Errors
    ///
    /// See [`Dispatcher::start_run`].
    pub fn start<P, R>(&self, tasks: Vec<Task<P, R>>) -> Result<RunHandle<P, R>, DispatchError>
    where
        P: Send + 'static,
        R: Send + 'static,
    {
        self.start_run(tasks, self.config.worker_count)
    }

    /// Start a run over `tasks` with `worker_count` workers.
    ///
    /// A `worker_count` of zero falls back to the configured count. The
    /// returned handle is already `Running` (or `Draining` once every task
    /// has been enqueued).
    ///
    /// # Errors
    ///
    /// - `DispatchError::DuplicateTaskId` if two tasks share an identifier
    /// - `DispatchError::Spawn` if a worker or feeder thread cannot start
    pub fn start_run<P, R>(
        &self,
        tasks: Vec<Task<P, R>>,
        worker_count: usize,
    ) -> Result<RunHandle<P, R>, DispatchError>
    where
        P: Send + 'static,
        R: Send + 'static,
    {
        let worker_count = if worker_count == 0 {
            self.config.worker_count
        } else {
            worker_count
        };

        let mut seen = HashSet::with_capacity(tasks.len());
        for task in &tasks {
            if !seen.insert(task.id()) {
                return Err(DispatchError::DuplicateTaskId(task.id()));
            }
        }
        let task_ids: Vec<TaskId> = tasks.iter().map(Task::id).collect();

        let run_id = Uuid::new_v4();
        let queue = Arc::new(TaskQueue::bounded(self.config.queue_capacity));
        let (publisher, sink) = bounded_sink(self.config.sink_capacity, tasks.len());
        let cancelled = Arc::new(AtomicBool::new(false));
        let counters = Arc::new(RunCounters::for_tasks(&task_ids));
        let state = Arc::new(RunState::new());
        state.transition(RunStatus::Idle, RunStatus::Running);

        let ctx = WorkerContext {
            run_id,
            queue: Arc::clone(&queue),
            publisher,
            cancelled: Arc::clone(&cancelled),
            counters: Arc::clone(&counters),
        };

        let workers = match WorkerSet::spawn(
            worker_count,
            &ctx,
            &self.config.thread_name_prefix,
            self.config.thread_stack_size,
        ) {
            Ok(workers) => workers,
            Err((mut started, err)) => {
                error!(run_id = %run_id, error = %err, "Failed to spawn worker thread");
                queue.close();
                started.join_within(WORKER_JOIN_GRACE);
                return Err(DispatchError::Spawn(err));
            }
        };

        let feeder = Feeder {
            run_id,
            queue: Arc::clone(&queue),
            publisher: ctx.publisher.clone(),
            cancelled: Arc::clone(&cancelled),
            counters: Arc::clone(&counters),
            state: Arc::clone(&state),
        };
        // Workers hold their own clones; the sink must only see theirs.
        drop(ctx);

        let feeder = match thread::Builder::new()
            .name(format!("{}-feeder", self.config.thread_name_prefix))
            .spawn(move || feeder.feed(tasks))
        {
            Ok(handle) => handle,
            Err(err) => {
                error!(run_id = %run_id, error = %err, "Failed to spawn feeder thread");
                queue.close();
                let mut workers = workers;
                workers.join_within(WORKER_JOIN_GRACE);
                return Err(DispatchError::Spawn(err));
            }
        };

        info!(
            run_id = %run_id,
            tasks = task_ids.len(),
            worker_count = workers.len(),
            queue_capacity = queue.capacity(),
            "Dispatch run started"
        );

        Ok(RunHandle {
            shared: Arc::new(RunShared {
                run_id,
                state,
                cancelled,
                queue,
                sink,
                counters,
                task_ids,
                worker_count,
                started_at_ms: now_ms(),
                default_deadline: self.config.default_deadline(),
                receiving: Mutex::new(()),
                collected: Mutex::new(Collected {
                    results: HashMap::new(),
                    seen: HashSet::new(),
                    taken: false,
                }),
                threads: Mutex::new(RunThreads {
                    workers,
                    feeder: Some(feeder),
                }),
            }),
        })
    }

    /// Start a run and wait for all of its results.
    ///
    /// # Errors
    ///
    /// Any error from [`Dispatcher::start_run`] or
    /// [`RunHandle::await_completion`].
    pub fn run<P, R>(
        &self,
        tasks: Vec<Task<P, R>>,
        worker_count: usize,
        deadline: Option<Duration>,
    ) -> Result<HashMap<TaskId, TaskResult<R>>, DispatchError>
    where
        P: Send + 'static,
        R: Send + 'static,
    {
        self.start_run(tasks, worker_count)?.await_completion(deadline)
    }
}

/// Feeds a batch into the queue, then closes it.
struct Feeder<P, R> {
    run_id: Uuid,
    queue: Arc<TaskQueue<Task<P, R>>>,
    publisher: ResultPublisher<R>,
    cancelled: Arc<AtomicBool>,
    counters: Arc<RunCounters>,
    state: Arc<RunState>,
}

impl<P, R> Feeder<P, R> {
    fn feed(self, tasks: Vec<Task<P, R>>) {
        let mut pending = tasks.into_iter();
        let mut admitted = 0_usize;

        for task in pending.by_ref() {
            if self.cancelled.load(Ordering::Acquire) {
                self.reject(task);
                break;
            }
            self.counters.queued.fetch_add(1, Ordering::Relaxed);
            match self.queue.submit(task) {
                Ok(()) => {
                    self.counters.submitted.fetch_add(1, Ordering::Relaxed);
                    admitted += 1;
                }
                Err(rejected) => {
                    self.counters.queued.fetch_sub(1, Ordering::Relaxed);
                    self.reject(rejected.into_inner());
                    break;
                }
            }
        }

        let mut rejected = 0_usize;
        for task in pending {
            self.reject(task);
            rejected += 1;
        }

        self.queue.close();
        // Fails if the run was cancelled meanwhile; Cancelled stays.
        self.state.transition(RunStatus::Running, RunStatus::Draining);
        debug!(
            run_id = %self.run_id,
            admitted = admitted,
            rejected = rejected,
            status = ?self.state.get(),
            "Submission closed"
        );
    }

    /// Report a task that never reached the queue as cancelled.
    fn reject(&self, task: Task<P, R>) {
        let result = task.cancel();
        self.counters.record(&result);
        // A dropped sink means nobody is collecting any more.
        let _ = self.publisher.publish(result);
    }
}

struct Collected<R> {
    results: HashMap<TaskId, TaskResult<R>>,
    /// Every id received so far, including results handed out early.
    seen: HashSet<TaskId>,
    taken: bool,
}

struct RunThreads {
    workers: WorkerSet,
    feeder: Option<JoinHandle<()>>,
}

struct RunShared<P, R> {
    run_id: Uuid,
    state: Arc<RunState>,
    cancelled: Arc<AtomicBool>,
    queue: Arc<TaskQueue<Task<P, R>>>,
    sink: ResultSink<R>,
    counters: Arc<RunCounters>,
    task_ids: Vec<TaskId>,
    worker_count: usize,
    started_at_ms: u128,
    default_deadline: Option<Duration>,
    /// Held while a result moves from the sink into `collected`, so no
    /// receiver observes a complete sink before the last result is recorded.
    receiving: Mutex<()>,
    collected: Mutex<Collected<R>>,
    threads: Mutex<RunThreads>,
}

impl<P, R> Drop for RunShared<P, R> {
    fn drop(&mut self) {
        // Don't join here: the sink receiver drops with us, which makes any
        // worker still publishing exit on its own.
        if !self.state.get().is_terminal() {
            self.cancelled.store(true, Ordering::Release);
            self.queue.close();
            debug!(run_id = %self.run_id, "RunHandle dropped before completion - workers will be detached");
        }
    }
}

/// Handle to one dispatch run.
///
/// Cloning the handle is cheap; all clones refer to the same run, so one
/// thread can `cancel` while another waits in `await_completion`.
pub struct RunHandle<P, R> {
    shared: Arc<RunShared<P, R>>,
}

impl<P, R> Clone for RunHandle<P, R> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<P, R> RunHandle<P, R> {
    /// Unique identifier of this run, used in log fields.
    pub fn run_id(&self) -> Uuid {
        self.shared.run_id
    }

    /// Current lifecycle state.
    pub fn status(&self) -> RunStatus {
        self.shared.state.get()
    }

    /// Request early termination.
    ///
    /// No further tasks are admitted and queued tasks are reported as
    /// `Cancelled`; tasks already executing finish and report normally.
    /// No-op once the run has completed.
    pub fn cancel(&self) {
        if self.shared.state.cancel() {
            self.shared.cancelled.store(true, Ordering::Release);
            self.shared.queue.close();
            info!(run_id = %self.shared.run_id, "Dispatch run cancelled");
        }
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.shared.cancelled.load(Ordering::Acquire)
    }

    /// Snapshot of the run's counters.
    pub fn stats(&self) -> RunStats {
        self.shared.counters.snapshot(
            self.shared.worker_count,
            self.shared.task_ids.len() as u64,
            self.shared.started_at_ms,
        )
    }

    /// Serialisable summary of the run.
    pub fn summary(&self) -> RunSummary {
        RunSummary {
            run_id: self.shared.run_id.to_string(),
            status: self.status(),
            stats: self.stats(),
        }
    }

    /// Number of results received from workers so far.
    pub fn collected_count(&self) -> usize {
        self.shared.sink.received()
    }

    /// Take one result if it is immediately available.
    ///
    /// Results handed out here are not repeated by
    /// [`RunHandle::await_completion`].
    pub fn try_collect(&self) -> Option<TaskResult<R>> {
        if self.status().is_terminal() {
            return None;
        }
        // Another receiver is busy; report nothing rather than block.
        let _receiving = self.shared.receiving.try_lock()?;
        let result = self.shared.sink.try_collect()?;
        self.shared.collected.lock().seen.insert(result.id);
        Some(result)
    }

    /// Lazily yield results as they arrive, until every task has reported.
    ///
    /// Results handed out here are not repeated by
    /// [`RunHandle::await_completion`], which still performs the final
    /// transition to `Completed`.
    pub fn collect(&self) -> impl Iterator<Item = TaskResult<R>> + '_ {
        std::iter::from_fn(move || {
            if self.status().is_terminal() {
                return None;
            }
            self.receive(None, |_, result| result).ok().flatten()
        })
    }

    /// Wait until every task has reported and return the results by id.
    ///
    /// `deadline` bounds the wait; `None` falls back to the configured
    /// default deadline, and waits indefinitely if none is configured.
    ///
    /// On expiry, a cancelled run reports every still-missing task as
    /// `Cancelled` and completes. A run that was not cancelled returns
    /// `Timeout`; results gathered so far stay in the handle and a later
    /// call resumes collecting.
    ///
    /// # Errors
    ///
    /// - `DispatchError::Timeout` if the deadline elapses on a live run
    /// - `DispatchError::AlreadyCollected` if results were already returned
    pub fn await_completion(
        &self,
        deadline: Option<Duration>,
    ) -> Result<HashMap<TaskId, TaskResult<R>>, DispatchError> {
        let shared = &self.shared;
        if shared.collected.lock().taken {
            return Err(DispatchError::AlreadyCollected);
        }
        let deadline = deadline
            .or(shared.default_deadline)
            // Too far out to represent: wait without a deadline.
            .and_then(|d| Instant::now().checked_add(d));

        loop {
            let received = self.receive(deadline, |collected, result| {
                collected.results.insert(result.id, result);
            });
            match received {
                Ok(Some(())) => {}
                Ok(None) => break,
                Err(DispatchError::Timeout { collected, expected }) => {
                    if self.status() == RunStatus::Cancelled {
                        warn!(
                            run_id = %shared.run_id,
                            collected = collected,
                            expected = expected,
                            "Cancelled run timed out, reporting unfinished tasks as cancelled"
                        );
                        self.fill_missing(TaskResult::cancelled);
                        return self.finish(false);
                    }
                    warn!(
                        run_id = %shared.run_id,
                        collected = collected,
                        expected = expected,
                        "Timed out waiting for run completion"
                    );
                    return Err(DispatchError::Timeout { collected, expected });
                }
                Err(err) => return Err(err),
            }
        }

        if !shared.sink.is_complete() {
            // Every publisher is gone yet results are missing.
            error!(
                run_id = %shared.run_id,
                collected = shared.sink.received(),
                expected = shared.sink.expected(),
                "Workers exited without reporting every task"
            );
            self.fill_missing(|id| TaskResult::lost(id, "worker exited without reporting".into()));
        }
        self.finish(true)
    }

    /// Receive one result and hand it to `keep` with the run's collected
    /// state locked. `Ok(None)` once every task has reported or every
    /// publisher is gone.
    fn receive<T>(
        &self,
        deadline: Option<Instant>,
        keep: impl FnOnce(&mut Collected<R>, TaskResult<R>) -> T,
    ) -> Result<Option<T>, DispatchError> {
        let shared = &self.shared;
        let _receiving = match deadline {
            Some(deadline) => shared
                .receiving
                .try_lock_until(deadline)
                .ok_or_else(|| DispatchError::Timeout {
                    collected: shared.sink.received(),
                    expected: shared.sink.expected(),
                })?,
            None => shared.receiving.lock(),
        };
        let Some(result) = shared.sink.recv_until(deadline)? else {
            return Ok(None);
        };
        let mut collected = shared.collected.lock();
        collected.seen.insert(result.id);
        Ok(Some(keep(&mut collected, result)))
    }

    /// Insert a synthetic result for every task that never reported.
    fn fill_missing(&self, make: impl Fn(TaskId) -> TaskResult<R>) {
        let mut collected = self.shared.collected.lock();
        for &id in &self.shared.task_ids {
            if collected.seen.insert(id) {
                let result = make(id);
                self.shared.counters.record(&result);
                collected.results.insert(id, result);
            }
        }
    }

    /// Release threads, enter `Completed` and hand out the results.
    ///
    /// With `drained` set every task has reported, so the feeder is done (or
    /// about to close the queue) and workers are on their way out. Otherwise
    /// threads still stuck in a task or a blocked send are detached.
    fn finish(&self, drained: bool) -> Result<HashMap<TaskId, TaskResult<R>>, DispatchError> {
        let shared = &self.shared;
        let detached = {
            let mut threads = shared.threads.lock();
            if let Some(feeder) = threads.feeder.take() {
                if drained || feeder.is_finished() {
                    if feeder.join().is_err() {
                        warn!(run_id = %shared.run_id, "Feeder thread panicked");
                    }
                } else {
                    warn!(run_id = %shared.run_id, "Feeder thread still blocked - detaching");
                }
            }
            let grace = if drained { WORKER_JOIN_GRACE } else { Duration::ZERO };
            threads.workers.join_within(grace)
        };

        // Completion is reached from Draining, or from Cancelled. A run that
        // finished before the feeder flipped it to Draining goes there first.
        shared.state.transition(RunStatus::Running, RunStatus::Draining);
        shared.state.complete();

        let mut collected = shared.collected.lock();
        if collected.taken {
            return Err(DispatchError::AlreadyCollected);
        }
        collected.taken = true;
        let results = std::mem::take(&mut collected.results);

        info!(
            run_id = %shared.run_id,
            results = results.len(),
            detached_workers = detached,
            "Dispatch run completed"
        );
        Ok(results)
    }
}

#[cfg(feature = "tokio-runtime")]
impl<P, R> RunHandle<P, R>
where
    P: Send + 'static,
    R: Send + 'static,
{
    /// Async variant of [`RunHandle::await_completion`].
    ///
    /// The blocking wait runs on tokio's blocking thread pool so the calling
    /// runtime is never stalled.
    ///
    /// # Errors
    ///
    /// Same as [`RunHandle::await_completion`], plus
    /// `DispatchError::Internal` if the blocking task fails.
    pub async fn await_completion_async(
        &self,
        deadline: Option<Duration>,
    ) -> Result<HashMap<TaskId, TaskResult<R>>, DispatchError> {
        let handle = self.clone();
        tokio::task::spawn_blocking(move || handle.await_completion(deadline))
            .await
            .map_err(|e| DispatchError::Internal(format!("blocking wait failed: {e}")))?
    }
}
