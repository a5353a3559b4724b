//! Batch execution: worker pool, progress and cancellation

pub mod coordinator;
pub mod progress;

pub use coordinator::BatchCoordinator;
pub use progress::{spawn_reporter, ProgressTracker};
