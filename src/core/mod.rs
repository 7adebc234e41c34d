// Infrastructure shared by the callback coordinator and the async runner

pub mod config;
pub mod errors;
pub mod telemetry;

// Re-export commonly used types
pub use config::{RunConfig, RunConfigBuilder};
pub use errors::{ParallelError, Result, RunError};
pub use telemetry::{init_test_tracing, init_tracing};
