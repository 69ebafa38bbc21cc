//! Bounded task queue with explicit close semantics.
//!
//! The queue wraps a bounded `crossbeam_channel`. Closing drops the stored
//! sender; consumers observe end-of-input once the channel is closed *and*
//! drained, so no queued task is ever lost to a close.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;

use super::error::SubmitError;

/// Bounded multi-producer, multi-consumer task queue.
pub struct TaskQueue<T> {
    /// Sender side. `None` once the queue is closed.
    tx: Mutex<Option<Sender<T>>>,
    rx: Receiver<T>,
    capacity: usize,
}

impl<T> TaskQueue<T> {
    /// Create a queue holding at most `capacity` pending tasks.
    ///
    /// A capacity of zero is raised to one so that `try_submit` can ever
    /// succeed.
    pub fn bounded(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = bounded(capacity);
        Self {
            tx: Mutex::new(Some(tx)),
            rx,
            capacity,
        }
    }

    /// Clone the sender out of the lock so a blocking send never holds it.
    fn sender(&self) -> Option<Sender<T>> {
        self.tx.lock().clone()
    }

    /// Enqueue a task, blocking while the queue is at capacity.
    ///
    /// # Errors
    ///
    /// Returns `SubmitError::Closed` with the task if the queue was closed.
    pub fn submit(&self, task: T) -> Result<(), SubmitError<T>> {
        let Some(tx) = self.sender() else {
            return Err(SubmitError::Closed(task));
        };
        tx.send(task).map_err(|err| SubmitError::Closed(err.into_inner()))
    }

    /// Enqueue a task without blocking.
    ///
    /// # Errors
    ///
    /// - `SubmitError::Full` if the queue is at capacity
    /// - `SubmitError::Closed` if the queue was closed
    pub fn try_submit(&self, task: T) -> Result<(), SubmitError<T>> {
        let guard = self.tx.lock();
        let Some(tx) = guard.as_ref() else {
            return Err(SubmitError::Closed(task));
        };
        match tx.try_send(task) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(task)) => Err(SubmitError::Full(task)),
            Err(TrySendError::Disconnected(task)) => Err(SubmitError::Closed(task)),
        }
    }

    /// Mark that no more tasks will arrive.
    ///
    /// Idempotent; returns `true` only for the call that performed the close.
    pub fn close(&self) -> bool {
        self.tx.lock().take().is_some()
    }

    /// Whether the queue has been closed for submission.
    pub fn is_closed(&self) -> bool {
        self.tx.lock().is_none()
    }

    /// Block until a task is available.
    ///
    /// Returns `None` once the queue is closed and drained.
    pub fn next(&self) -> Option<T> {
        self.rx.recv().ok()
    }

    /// Take a task if one is immediately available.
    pub fn try_next(&self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Number of tasks currently waiting.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Whether no task is waiting.
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Maximum number of pending tasks.
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_submit_then_drain_after_close() {
        let queue = TaskQueue::bounded(4);
        queue.submit(1).unwrap();
        queue.submit(2).unwrap();
        assert!(queue.close());

        assert_eq!(queue.next(), Some(1));
        assert_eq!(queue.next(), Some(2));
        assert_eq!(queue.next(), None);
    }

    #[test]
    fn test_close_is_idempotent() {
        let queue: TaskQueue<u32> = TaskQueue::bounded(1);
        assert!(!queue.is_closed());
        assert!(queue.close());
        assert!(!queue.close());
        assert!(queue.is_closed());
    }

    #[test]
    fn test_submit_after_close_rejected() {
        let queue = TaskQueue::bounded(2);
        queue.close();
        let err = queue.submit(9).unwrap_err();
        assert!(err.is_closed());
        assert_eq!(err.into_inner(), 9);
        assert!(queue.try_submit(10).unwrap_err().is_closed());
    }

    #[test]
    fn test_try_submit_reports_full() {
        let queue = TaskQueue::bounded(2);
        queue.try_submit(1).unwrap();
        queue.try_submit(2).unwrap();
        let err = queue.try_submit(3).unwrap_err();
        assert!(err.is_full());
        assert_eq!(queue.len(), 2);

        assert_eq!(queue.try_next(), Some(1));
        queue.try_submit(3).unwrap();
    }

    #[test]
    fn test_zero_capacity_is_raised() {
        let queue = TaskQueue::bounded(0);
        assert_eq!(queue.capacity(), 1);
        queue.try_submit("only").unwrap();
        assert!(queue.try_submit("extra").unwrap_err().is_full());
    }

    #[test]
    fn test_blocking_submit_waits_for_space() {
        let queue = Arc::new(TaskQueue::bounded(1));
        queue.submit(1).unwrap();

        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.submit(2).is_ok())
        };

        thread::sleep(Duration::from_millis(50));
        assert!(!producer.is_finished());
        assert_eq!(queue.next(), Some(1));

        assert!(producer.join().unwrap());
        assert_eq!(queue.next(), Some(2));
    }

    #[test]
    fn test_next_unblocks_on_close() {
        let queue: Arc<TaskQueue<u32>> = Arc::new(TaskQueue::bounded(1));
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.next())
        };
        thread::sleep(Duration::from_millis(20));
        queue.close();
        assert_eq!(consumer.join().unwrap(), None);
    }
}
