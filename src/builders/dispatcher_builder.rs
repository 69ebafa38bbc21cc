//! Build a [`Dispatcher`] from explicit or environment configuration.

use anyhow::Context;
use tracing::info;

use crate::config::DispatchConfig;
use crate::core::{AppResult, DispatchError, Dispatcher};

/// Validate `cfg` and build a dispatcher from it.
///
/// # Errors
///
/// Returns `DispatchError::InvalidConfig` if the configuration is invalid.
pub fn build_dispatcher(cfg: DispatchConfig) -> Result<Dispatcher, DispatchError> {
    let dispatcher = Dispatcher::new(cfg)?;
    let cfg = dispatcher.config();
    info!(
        worker_count = cfg.worker_count,
        queue_capacity = cfg.queue_capacity,
        sink_capacity = cfg.sink_capacity,
        default_deadline_ms = ?cfg.default_deadline_ms,
        "Dispatcher configured"
    );
    Ok(dispatcher)
}

/// Build a dispatcher from `DISPATCH_*` environment variables (and `.env`).
///
/// # Errors
///
/// Fails if the environment holds unparsable or invalid values.
pub fn build_dispatcher_from_env() -> AppResult<Dispatcher> {
    let cfg = DispatchConfig::from_env().context("loading dispatch configuration")?;
    build_dispatcher(cfg).context("building dispatcher")
}
