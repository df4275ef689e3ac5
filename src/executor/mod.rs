//! Execution module.
//!
//! This module dispatches the operations of a change set to a provisioning
//! backend and gathers every per-identifier outcome into a result.

mod backend;
mod engine;
mod options;
mod result;

#[cfg(test)]
mod scripted;

pub use backend::{Backend, ServiceParams};
pub use engine::Executor;
pub use options::ExecutorOptions;
pub use result::{ExecutionResult, OperationResult};
