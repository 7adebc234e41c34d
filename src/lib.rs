// Shared infrastructure: errors, configuration, logging setup
pub mod core;

// The coordinator itself
pub mod parallel;

// Re-exports for convenience
pub use crate::core::config::{RunConfig, RunConfigBuilder};
pub use crate::core::errors::{ParallelError, Result, RunError};
pub use crate::parallel::{parallel, run_all, Batch, Completion, ParallelRunner, SlotState, TaskFn};
