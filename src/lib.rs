//! Recipe Importer Core Library
//!
//! Bulk-imports recipes into a self-hosted recipe server from a list of source
//! URLs. The server does the page extraction; this library decides which URLs
//! to send, in what order, how to back off when the server pushes back, and
//! what happened to each one.
//!
//! # Architecture
//!
//! - [`config`] - Immutable importer settings and the config file loader
//! - [`input`] - URL list file reading
//! - [`filter`] - Offline URL classification
//! - [`api`] - Recipe server capability trait and its HTTP client
//! - [`retry`] - Retry policy, async retry driver and interruptible sleeps
//! - [`dedup`] - Snapshot of source URLs already on the server
//! - [`import`] - The per-URL state machine and run statistics
//! - [`report`] - Progress reporters and the final summary

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod api;
pub mod config;
pub mod dedup;
pub mod filter;
pub mod import;
pub mod input;
pub mod report;
pub mod retry;
mod user_agent;

// Re-export commonly used types
pub use api::{
    ApiError, RecipeApi, RecipeDetail, RecipeId, ScrapedPayload, ServerClient, SourceUrlPage,
};
pub use config::{ConfigError, ImporterConfig, resolve_config_path};
pub use dedup::{DuplicateIndex, IndexError, canonical_source_url, normalize_source_url};
pub use filter::{FilterReason, FilterRules, UrlFilter, UrlVerdict};
pub use import::{ImportJob, ImportOutcome, ImportRun, ImportStatus, Orchestrator, RunStatistics};
pub use input::{InputError, read_url_file};
pub use report::{
    LogFileReporter, MultiReporter, ProgressReporter, ReportError, TracingReporter, render_summary,
};
pub use retry::{
    DEFAULT_MAX_RETRIES, FailureType, RetryDecision, RetryPolicy, SleepOutcome, Sleeper,
    TokioSleeper, classify_error, run_with_retry,
};
