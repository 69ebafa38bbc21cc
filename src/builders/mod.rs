//! Builders to construct dispatchers from configuration.

pub mod dispatcher_builder;

pub use dispatcher_builder::{build_dispatcher, build_dispatcher_from_env};
