//! Staged pipeline over bounded channels.
//!
//! Each stage runs on its own thread, reads from the previous stage's channel
//! and forwards mapped items to a fresh bounded channel. A stage closes its
//! output when its input ends, so completion flows downstream; if the
//! consumer goes away, upstream stages stop on their next failed send.
//!
//! A capacity of zero gives rendezvous channels: every hand-off waits for
//! the next stage.
//!
//! ```rust,ignore
//! use prometheus_dispatch::core::Pipeline;
//!
//! let squares = Pipeline::source(vec![2, 3, 4], 0)?
//!     .stage(|n| n * n)?
//!     .finish()?;
//! assert_eq!(squares, vec![4, 9, 16]);
//! ```

use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver};
use tracing::{debug, warn};

use super::error::DispatchError;

/// A chain of running stages whose final output can be consumed in order.
pub struct Pipeline<T> {
    rx: Receiver<T>,
    capacity: usize,
    stages: Vec<JoinHandle<()>>,
}

impl<T: Send + 'static> Pipeline<T> {
    /// Start a pipeline whose source thread emits `items`.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::Spawn` if the source thread cannot start.
    pub fn source<I>(items: I, capacity: usize) -> Result<Self, DispatchError>
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: Send + 'static,
    {
        let (tx, rx) = bounded(capacity);
        let items = items.into_iter();
        let source = thread::Builder::new()
            .name("pipeline-source".into())
            .spawn(move || {
                for item in items {
                    if tx.send(item).is_err() {
                        debug!("Pipeline consumer gone, source stopping");
                        return;
                    }
                }
            })?;
        Ok(Self {
            rx,
            capacity,
            stages: vec![source],
        })
    }

    /// Append a stage mapping every item through `f`.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::Spawn` if the stage thread cannot start.
    pub fn stage<U, F>(self, mut f: F) -> Result<Pipeline<U>, DispatchError>
    where
        U: Send + 'static,
        F: FnMut(T) -> U + Send + 'static,
    {
        let Self {
            rx: input,
            capacity,
            mut stages,
        } = self;
        let stage_index = stages.len();
        let (tx, rx) = bounded(capacity);
        let handle = thread::Builder::new()
            .name(format!("pipeline-stage-{stage_index}"))
            .spawn(move || {
                for item in &input {
                    if tx.send(f(item)).is_err() {
                        debug!(stage = stage_index, "Pipeline consumer gone, stage stopping");
                        return;
                    }
                }
            })?;
        stages.push(handle);
        Ok(Pipeline {
            rx,
            capacity,
            stages,
        })
    }

    /// Number of running threads, source included.
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Consume every output item, then join all stages.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::Internal` if any stage panicked; the output of
    /// a panicked stage is truncated.
    pub fn finish(self) -> Result<Vec<T>, DispatchError> {
        let Self { rx, stages, .. } = self;
        let items: Vec<T> = rx.iter().collect();

        let mut panicked = Vec::new();
        for (index, stage) in stages.into_iter().enumerate() {
            if stage.join().is_err() {
                warn!(stage = index, "Pipeline stage panicked");
                panicked.push(index);
            }
        }
        if panicked.is_empty() {
            Ok(items)
        } else {
            Err(DispatchError::Internal(format!(
                "pipeline stages panicked: {panicked:?}"
            )))
        }
    }
}

impl<T> IntoIterator for Pipeline<T> {
    type Item = T;
    type IntoIter = crossbeam_channel::IntoIter<T>;

    /// Stream the final output. Stage threads are detached and exit once
    /// their input ends or the iterator is dropped.
    fn into_iter(self) -> Self::IntoIter {
        self.rx.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_then_square() {
        let out = Pipeline::source(vec![2, 3, 4], 0)
            .unwrap()
            .stage(|n: i32| n * n)
            .unwrap()
            .finish()
            .unwrap();
        assert_eq!(out, vec![4, 9, 16]);
    }

    #[test]
    fn test_stages_change_type() {
        let pipeline = Pipeline::source(1..=3_u32, 2)
            .unwrap()
            .stage(|n| n * 10)
            .unwrap()
            .stage(|n| format!("item-{n}"))
            .unwrap();
        assert_eq!(pipeline.stage_count(), 3);
        let out: Vec<String> = pipeline.into_iter().collect();
        assert_eq!(out, vec!["item-10", "item-20", "item-30"]);
    }

    #[test]
    fn test_stage_panic_reported() {
        let result = Pipeline::source(vec![1, 2, 3], 1)
            .unwrap()
            .stage(|n: i32| {
                assert!(n != 2, "bad item");
                n
            })
            .unwrap()
            .finish();
        assert!(matches!(result, Err(DispatchError::Internal(_))));
    }

    #[test]
    fn test_early_drop_stops_upstream() {
        let mut iter = Pipeline::source(0..1_000_000_u64, 1)
            .unwrap()
            .stage(|n| n + 1)
            .unwrap()
            .into_iter();
        assert_eq!(iter.next(), Some(1));
        drop(iter);
    }
}
