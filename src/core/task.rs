//! Task and result types.
//!
//! A [`Task`] bundles an identifier, a payload and the function that turns the
//! payload into a value. Running a task never unwinds into the caller: both
//! `Err` returns and panics become a [`TaskError::Failure`].

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use super::error::TaskError;

/// Task identifier, unique within a dispatch run.
pub type TaskId = u64;

type TaskFn<P, R> = Box<dyn FnOnce(P) -> Result<R, String> + Send + 'static>;

/// One unit of work submitted to a dispatch run.
pub struct Task<P, R> {
    id: TaskId,
    payload: P,
    func: TaskFn<P, R>,
}

impl<P, R> Task<P, R>
where
    P: Send + 'static,
    R: Send + 'static,
{
    /// Create a task from a fallible function.
    ///
    /// The error type only needs `Display`; it is rendered into the
    /// failure descriptor of the task's result.
    pub fn new<F, E>(id: TaskId, payload: P, func: F) -> Self
    where
        F: FnOnce(P) -> Result<R, E> + Send + 'static,
        E: fmt::Display + 'static,
    {
        Self {
            id,
            payload,
            func: Box::new(move |payload| func(payload).map_err(|e| e.to_string())),
        }
    }

    /// Create a task from an infallible function.
    pub fn from_fn<F>(id: TaskId, payload: P, func: F) -> Self
    where
        F: FnOnce(P) -> R + Send + 'static,
    {
        Self {
            id,
            payload,
            func: Box::new(move |payload| Ok(func(payload))),
        }
    }
}

impl<P, R> Task<P, R> {
    /// Task identifier.
    pub const fn id(&self) -> TaskId {
        self.id
    }

    /// Borrow the payload.
    pub const fn payload(&self) -> &P {
        &self.payload
    }

    /// Execute the task, capturing errors and panics into the result.
    pub(crate) fn run(self) -> TaskResult<R> {
        let Self { id, payload, func } = self;
        let outcome = match panic::catch_unwind(AssertUnwindSafe(move || func(payload))) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(message)) => Err(TaskError::Failure(message)),
            Err(panic) => Err(TaskError::Failure(panic_message(panic.as_ref()))),
        };
        TaskResult { id, outcome }
    }

    /// Report the task as cancelled without running it.
    pub(crate) fn cancel(self) -> TaskResult<R> {
        TaskResult::cancelled(self.id)
    }
}

impl<P, R> fmt::Debug for Task<P, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task").field("id", &self.id).finish_non_exhaustive()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        format!("panicked: {msg}")
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        format!("panicked: {msg}")
    } else {
        "panicked".to_string()
    }
}

/// Outcome of executing one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskResult<R> {
    /// Identifier of the originating task.
    pub id: TaskId,
    /// Success value or failure descriptor.
    pub outcome: Result<R, TaskError>,
}

impl<R> TaskResult<R> {
    pub(crate) const fn cancelled(id: TaskId) -> Self {
        Self {
            id,
            outcome: Err(TaskError::Cancelled),
        }
    }

    pub(crate) const fn lost(id: TaskId, message: String) -> Self {
        Self {
            id,
            outcome: Err(TaskError::Failure(message)),
        }
    }

    /// Whether the task produced a value.
    pub const fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Whether the task ran and failed.
    pub const fn is_failure(&self) -> bool {
        matches!(self.outcome, Err(TaskError::Failure(_)))
    }

    /// Whether the task was cancelled before it ran.
    pub const fn is_cancelled(&self) -> bool {
        matches!(self.outcome, Err(TaskError::Cancelled))
    }

    /// Borrow the success value, if any.
    pub fn value(&self) -> Option<&R> {
        self.outcome.as_ref().ok()
    }

    /// Borrow the failure descriptor, if any.
    pub fn error(&self) -> Option<&TaskError> {
        self.outcome.as_ref().err()
    }

    /// Consume the result, returning the success value if any.
    pub fn into_value(self) -> Option<R> {
        self.outcome.ok()
    }
}
