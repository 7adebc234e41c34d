// Parallel coordinator: callback batches and the async front end built on them
pub mod batch;
pub mod runner;

pub use batch::{parallel, Batch, Completion, SlotState, TaskFn};
pub use runner::{run_all, ParallelRunner};
