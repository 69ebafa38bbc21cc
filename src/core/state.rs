//! Run lifecycle state machine.

use std::sync::atomic::{AtomicU8, Ordering};

use serde::{Deserialize, Serialize};

/// Lifecycle of a dispatch run.
///
/// `Idle → Running → Draining → Completed`, with `Cancelled` reachable from
/// `Running` or `Draining` and always ending in `Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum RunStatus {
    /// No run active.
    Idle = 0,
    /// Queue open; tasks being submitted and consumed.
    Running = 1,
    /// Submission closed; waiting for in-flight work and collection.
    Draining = 2,
    /// Every result collected and resources released.
    Completed = 3,
    /// Early termination requested; in-flight work still drains.
    Cancelled = 4,
}

impl RunStatus {
    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Running,
            2 => Self::Draining,
            3 => Self::Completed,
            _ => Self::Cancelled,
        }
    }

    /// Whether the run can no longer change state.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// Atomic holder for a [`RunStatus`], shared between the handle and the
/// feeder thread.
#[derive(Debug)]
pub(crate) struct RunState(AtomicU8);

impl RunState {
    pub const fn new() -> Self {
        Self(AtomicU8::new(RunStatus::Idle as u8))
    }

    pub fn get(&self) -> RunStatus {
        RunStatus::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Move from `from` to `to`; fails if the current state is not `from`.
    pub fn transition(&self, from: RunStatus, to: RunStatus) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Enter `Cancelled` from `Running` or `Draining`.
    pub fn cancel(&self) -> bool {
        self.transition(RunStatus::Running, RunStatus::Cancelled)
            || self.transition(RunStatus::Draining, RunStatus::Cancelled)
    }

    /// Enter `Completed` from `Draining` or `Cancelled`.
    pub fn complete(&self) -> bool {
        self.transition(RunStatus::Draining, RunStatus::Completed)
            || self.transition(RunStatus::Cancelled, RunStatus::Completed)
    }
}
