//! Bounded result sink shared by the workers of one run.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};

use super::error::DispatchError;
use super::task::TaskResult;

/// Publishing half of a result sink, cloned into every worker.
pub struct ResultPublisher<R> {
    tx: Sender<TaskResult<R>>,
}

impl<R> Clone for ResultPublisher<R> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<R> ResultPublisher<R> {
    /// Publish one result, blocking while the sink is full.
    ///
    /// # Errors
    ///
    /// Hands the result back if the collecting side has been dropped.
    pub fn publish(&self, result: TaskResult<R>) -> Result<(), TaskResult<R>> {
        self.tx.send(result).map_err(|err| err.into_inner())
    }
}

/// Collecting half of a result sink.
///
/// The sink knows how many results the run will produce; collection stops
/// once that many have been received, even if publishers are still alive.
pub struct ResultSink<R> {
    rx: Receiver<TaskResult<R>>,
    expected: usize,
    received: AtomicUsize,
}

/// Create a sink buffering at most `capacity` results for a run of
/// `expected` tasks.
pub fn bounded_sink<R>(capacity: usize, expected: usize) -> (ResultPublisher<R>, ResultSink<R>) {
    let (tx, rx) = bounded(capacity.max(1));
    (
        ResultPublisher { tx },
        ResultSink {
            rx,
            expected,
            received: AtomicUsize::new(0),
        },
    )
}

impl<R> ResultSink<R> {
    /// Results the run will produce in total.
    pub const fn expected(&self) -> usize {
        self.expected
    }

    /// Results received so far.
    pub fn received(&self) -> usize {
        self.received.load(Ordering::Acquire)
    }

    /// Whether every expected result has been received.
    pub fn is_complete(&self) -> bool {
        self.received() >= self.expected
    }

    fn count(&self, result: TaskResult<R>) -> TaskResult<R> {
        self.received.fetch_add(1, Ordering::AcqRel);
        result
    }

    /// Take a result if one is immediately available.
    pub fn try_collect(&self) -> Option<TaskResult<R>> {
        if self.is_complete() {
            return None;
        }
        self.rx.try_recv().ok().map(|result| self.count(result))
    }

    /// Wait for the next result until `deadline`, or forever if `None`.
    ///
    /// Returns `Ok(None)` once the sink is complete or every publisher is
    /// gone.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::Timeout` if the deadline passes first.
    pub fn recv_until(&self, deadline: Option<Instant>) -> Result<Option<TaskResult<R>>, DispatchError> {
        if self.is_complete() {
            return Ok(None);
        }
        let received = match deadline {
            None => self.rx.recv().ok(),
            Some(deadline) => match self.rx.recv_deadline(deadline) {
                Ok(result) => Some(result),
                Err(RecvTimeoutError::Disconnected) => None,
                Err(RecvTimeoutError::Timeout) => {
                    return Err(DispatchError::Timeout {
                        collected: self.received(),
                        expected: self.expected,
                    });
                }
            },
        };
        Ok(received.map(|result| self.count(result)))
    }

    /// Lazily yield results as they arrive until the sink is complete.
    pub fn collect(&self) -> impl Iterator<Item = TaskResult<R>> + '_ {
        std::iter::from_fn(move || self.recv_until(None).ok().flatten())
    }
}
