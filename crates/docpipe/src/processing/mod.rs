//! Background processing pipeline
//!
//! - Progress tracking shared by every job
//! - Job state machine (`uploading -> processing -> ready | failed`)
//! - Bounded job runner with a completion channel

pub mod events;
pub mod job;
pub mod progress_store;
pub mod runner;

pub use events::{RunnerEvent, RunnerReporter, TracingRunnerReporter};
pub use job::{run_job, JobContext, JobOutcome, JobResult, ProgressSchedule};
pub use progress_store::{ProgressEntry, ProgressStore};
pub use runner::JobRunner;
