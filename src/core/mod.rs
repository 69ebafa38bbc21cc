//! Dispatch engine: task queue, worker set, result sink and run lifecycle.

pub mod dispatcher;
pub mod error;
pub mod pipeline;
pub mod queue;
pub mod sink;
pub mod state;
pub mod stats;
pub mod task;
mod worker;

pub use dispatcher::{Dispatcher, RunHandle};
pub use error::{AppResult, DispatchError, SubmitError, TaskError};
pub use pipeline::Pipeline;
pub use queue::TaskQueue;
pub use sink::{bounded_sink, ResultPublisher, ResultSink};
pub use state::RunStatus;
pub use stats::{RunStats, RunSummary};
pub use task::{Task, TaskId, TaskResult};
