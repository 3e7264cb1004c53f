//! Import orchestration: jobs, per-URL outcomes and the sequential run loop.

mod job;
mod orchestrator;
mod outcome;

pub use job::ImportJob;
pub use orchestrator::{INTERRUPTED_MESSAGE, Orchestrator};
pub use outcome::{ImportOutcome, ImportRun, ImportStatus, Phase, RunStatistics};
