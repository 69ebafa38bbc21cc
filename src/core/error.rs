//! Error types for dispatch operations.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::task::TaskId;

/// Failure descriptor carried inside a task's [`TaskResult`](super::TaskResult).
///
/// Task-level errors never propagate to the dispatcher; they are recorded
/// per result and leave sibling tasks untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskError {
    /// The task function returned an error or panicked.
    #[error("task failed: {0}")]
    Failure(String),
    /// The task never ran because its run was cancelled first.
    #[error("task cancelled")]
    Cancelled,
}

/// Run-level errors surfaced to the caller of a dispatch operation.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Submission attempted after the task queue was closed.
    #[error("task queue is closed")]
    QueueClosed,
    /// Non-blocking submission found the task queue at capacity.
    #[error("task queue is full")]
    QueueFull,
    /// The completion deadline elapsed before every result arrived.
    #[error("timed out after collecting {collected} of {expected} results")]
    Timeout {
        /// Results received so far.
        collected: usize,
        /// Results the run will eventually produce.
        expected: usize,
    },
    /// Configuration validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Two tasks in the same batch share an identifier.
    #[error("duplicate task id {0} in batch")]
    DuplicateTaskId(TaskId),
    /// The results of this run were already handed out.
    #[error("run results already collected")]
    AlreadyCollected,
    /// A worker or feeder thread could not be spawned.
    #[error("failed to spawn thread: {0}")]
    Spawn(#[from] std::io::Error),
    /// Internal failure (stage panic, join error, ...).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Rejection from a [`TaskQueue`](super::TaskQueue) submission.
///
/// The rejected task is handed back so the caller can retry or report it.
pub enum SubmitError<T> {
    /// The queue was closed.
    Closed(T),
    /// The queue was at capacity (non-blocking submission only).
    Full(T),
}

impl<T> SubmitError<T> {
    /// Recover the rejected task.
    pub fn into_inner(self) -> T {
        match self {
            Self::Closed(task) | Self::Full(task) => task,
        }
    }

    /// Whether the rejection was caused by a full queue.
    pub const fn is_full(&self) -> bool {
        matches!(self, Self::Full(_))
    }

    /// Whether the rejection was caused by a closed queue.
    pub const fn is_closed(&self) -> bool {
        matches!(self, Self::Closed(_))
    }
}

impl<T> fmt::Debug for SubmitError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed(_) => f.write_str("Closed(..)"),
            Self::Full(_) => f.write_str("Full(..)"),
        }
    }
}

impl<T> fmt::Display for SubmitError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed(_) => write!(f, "task queue is closed"),
            Self::Full(_) => write!(f, "task queue is full"),
        }
    }
}

impl<T> std::error::Error for SubmitError<T> {}

impl<T> From<SubmitError<T>> for DispatchError {
    fn from(err: SubmitError<T>) -> Self {
        match err {
            SubmitError::Closed(_) => Self::QueueClosed,
            SubmitError::Full(_) => Self::QueueFull,
        }
    }
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
