//! Observers of a running import.
//!
//! Reporters are told about every terminal [`ImportOutcome`] and about the end
//! of the run. They are purely observational: a reporter that errors or even
//! panics is logged and ignored, and never changes what gets imported.

mod summary;

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, warn};

use crate::import::{ImportOutcome, RunStatistics};

pub use summary::{render_statistics, render_summary};

/// Failure inside a reporter.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to write report to {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("reporter failed: {0}")]
    Failed(String),
}

/// Receives run events from the orchestrator.
pub trait ProgressReporter {
    /// Called once per URL, after its outcome is final. `stats` already includes it.
    ///
    /// # Errors
    ///
    /// Errors are logged by the caller and otherwise ignored.
    fn on_outcome(
        &mut self,
        outcome: &ImportOutcome,
        stats: &RunStatistics,
    ) -> Result<(), ReportError>;

    /// Called once when the run ends, interrupted or not.
    ///
    /// # Errors
    ///
    /// Errors are logged by the caller and otherwise ignored.
    fn on_finish(&mut self, _stats: &RunStatistics) -> Result<(), ReportError> {
        Ok(())
    }
}

/// Runs one reporter callback, swallowing errors and panics.
pub(crate) fn notify<F>(event: &'static str, callback: F)
where
    F: FnOnce() -> Result<(), ReportError>,
{
    match catch_unwind(AssertUnwindSafe(callback)) {
        Ok(Ok(())) => {}
        Ok(Err(error)) => warn!(event, %error, "progress reporter failed"),
        Err(_) => warn!(event, "progress reporter panicked"),
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn on_outcome(&mut self, _: &ImportOutcome, _: &RunStatistics) -> Result<(), ReportError> {
        Ok(())
    }
}

/// Logs each outcome and a running progress line through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ProgressReporter for TracingReporter {
    fn on_outcome(
        &mut self,
        outcome: &ImportOutcome,
        stats: &RunStatistics,
    ) -> Result<(), ReportError> {
        let message = outcome.message.as_deref().unwrap_or("");
        if outcome.status.is_failure() {
            warn!(
                index = outcome.index,
                url = %outcome.url,
                status = %outcome.status,
                http_status = ?outcome.http_status,
                message,
                "URL failed"
            );
        } else {
            info!(
                index = outcome.index,
                url = %outcome.url,
                status = %outcome.status,
                recipe_id = ?outcome.recipe_id,
                "URL done"
            );
        }

        #[allow(clippy::cast_precision_loss)]
        let percent = if stats.in_range() == 0 {
            100.0
        } else {
            stats.processed() as f64 / stats.in_range() as f64 * 100.0
        };
        info!(
            "Progress {}/{} ({percent:.1}%) | success rate {:.1}%",
            stats.processed(),
            stats.in_range(),
            stats.success_rate()
        );
        Ok(())
    }
}

/// Appends plain-text result lines to a file, flushed after every write.
#[derive(Debug)]
pub struct LogFileReporter {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl LogFileReporter {
    /// Opens `path` for appending, creating it when needed.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Io`] when the file cannot be opened.
    pub fn create(path: &Path) -> Result<Self, ReportError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|source| ReportError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
        })
    }

    fn write_lines<I, S>(&mut self, lines: I) -> Result<(), ReportError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let result = lines
            .into_iter()
            .try_for_each(|line| writeln!(self.writer, "{}", line.as_ref()))
            .and_then(|()| self.writer.flush());
        result.map_err(|source| ReportError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

impl ProgressReporter for LogFileReporter {
    fn on_outcome(
        &mut self,
        outcome: &ImportOutcome,
        stats: &RunStatistics,
    ) -> Result<(), ReportError> {
        let mut line = format!(
            "[{}/{}] #{} {} {}",
            stats.processed(),
            stats.in_range(),
            outcome.index,
            outcome.status,
            outcome.url
        );
        if let Some(id) = outcome.recipe_id {
            line.push_str(&format!(" (id {id})"));
        }
        if let Some(message) = &outcome.message {
            line.push_str(&format!(" - {message}"));
        }
        self.write_lines([line])
    }

    fn on_finish(&mut self, stats: &RunStatistics) -> Result<(), ReportError> {
        self.write_lines(render_statistics(stats))
    }
}

/// Fans events out to several reporters; one failing does not starve the others.
#[derive(Default)]
pub struct MultiReporter {
    reporters: Vec<Box<dyn ProgressReporter>>,
}

impl MultiReporter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, reporter: impl ProgressReporter + 'static) -> Self {
        self.reporters.push(Box::new(reporter));
        self
    }

    pub fn push(&mut self, reporter: Box<dyn ProgressReporter>) {
        self.reporters.push(reporter);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.reporters.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.reporters.is_empty()
    }
}

impl ProgressReporter for MultiReporter {
    fn on_outcome(
        &mut self,
        outcome: &ImportOutcome,
        stats: &RunStatistics,
    ) -> Result<(), ReportError> {
        for reporter in &mut self.reporters {
            notify("outcome", || reporter.on_outcome(outcome, stats));
        }
        Ok(())
    }

    fn on_finish(&mut self, stats: &RunStatistics) -> Result<(), ReportError> {
        for reporter in &mut self.reporters {
            notify("finish", || reporter.on_finish(stats));
        }
        Ok(())
    }
}
