//! Worker process: claims jobs and drives them through the pipeline.
//!
//! The services here are plain structs constructed once per process and
//! passed by reference; there is no global mutable state. The only
//! cross-process coordination point is the database itself.

pub mod config;
pub mod dispatcher;
pub mod feedback;
pub mod queue;
pub mod runner;

pub use config::WorkerConfig;
pub use dispatcher::JobDispatcher;
pub use feedback::FeedbackAggregator;
pub use queue::{JobProgress, JobQueue, QueueError};
pub use runner::JobRunner;
