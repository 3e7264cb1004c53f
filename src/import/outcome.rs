//! Per-URL results and the running tally of a run.

use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

use serde_json::Value;

use crate::api::RecipeId;
use crate::filter::FilterReason;

/// Server-side phase a URL failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Scrape,
    Create,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Scrape => "scrape",
            Self::Create => "create",
        })
    }
}

/// Terminal state of one URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImportStatus {
    Imported,
    Duplicate,
    Filtered(FilterReason),
    ScrapeFailed,
    CreateFailed,
    /// Hit at least one rate limit, then imported.
    RateLimitedThenImported,
    /// Hit a rate limit, then failed for another reason.
    RateLimitedThenFailed,
}

impl ImportStatus {
    #[must_use]
    pub fn is_imported(self) -> bool {
        matches!(self, Self::Imported | Self::RateLimitedThenImported)
    }

    #[must_use]
    pub fn is_failure(self) -> bool {
        matches!(
            self,
            Self::ScrapeFailed | Self::CreateFailed | Self::RateLimitedThenFailed
        )
    }

    /// Short label for log lines and reports.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Imported => "imported",
            Self::Duplicate => "duplicate",
            Self::Filtered(_) => "filtered",
            Self::ScrapeFailed => "scrape failed",
            Self::CreateFailed => "create failed",
            Self::RateLimitedThenImported => "imported after rate limit",
            Self::RateLimitedThenFailed => "failed after rate limit",
        }
    }
}

/// Key of the per-status tally. Filter reasons share one bucket, and URLs cut
/// short by an interrupt get their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Tally {
    Imported,
    Duplicate,
    Filtered,
    ScrapeFailed,
    CreateFailed,
    RateLimitedThenImported,
    RateLimitedThenFailed,
    Interrupted,
}

impl From<ImportStatus> for Tally {
    fn from(status: ImportStatus) -> Self {
        match status {
            ImportStatus::Imported => Self::Imported,
            ImportStatus::Duplicate => Self::Duplicate,
            ImportStatus::Filtered(_) => Self::Filtered,
            ImportStatus::ScrapeFailed => Self::ScrapeFailed,
            ImportStatus::CreateFailed => Self::CreateFailed,
            ImportStatus::RateLimitedThenImported => Self::RateLimitedThenImported,
            ImportStatus::RateLimitedThenFailed => Self::RateLimitedThenFailed,
        }
    }
}

impl fmt::Display for ImportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Filtered(reason) => write!(f, "filtered ({reason})"),
            other => f.write_str(other.label()),
        }
    }
}

/// Everything known about one processed URL. Emitted once, never changed.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportOutcome {
    /// 0-based position in the URL list.
    pub index: usize,
    pub url: String,
    pub status: ImportStatus,
    /// Phase that produced a failure status.
    pub failed_phase: Option<Phase>,
    pub http_status: Option<u16>,
    pub message: Option<String>,
    pub recipe_id: Option<RecipeId>,
    pub rate_limit_hits: u32,
    pub backoff_sleeps: u32,
    /// Prepared recipe kept when create failed, so it can be inspected or resubmitted.
    pub payload: Option<Value>,
    /// An image was uploaded to the new or duplicate recipe.
    pub image_attached: bool,
    /// The operator interrupted a backoff for this URL; it was never finished.
    pub interrupted: bool,
}

impl ImportOutcome {
    pub(crate) fn new(index: usize, url: &str, status: ImportStatus) -> Self {
        Self {
            index,
            url: url.to_string(),
            status,
            failed_phase: None,
            http_status: None,
            message: None,
            recipe_id: None,
            rate_limit_hits: 0,
            backoff_sleeps: 0,
            payload: None,
            image_attached: false,
            interrupted: false,
        }
    }

    /// Duplicate whose stored recipe gained an image from this URL.
    #[must_use]
    pub fn enhanced_duplicate(&self) -> bool {
        self.status == ImportStatus::Duplicate && self.image_attached
    }
}

/// Counters accumulated by the orchestrator while a run progresses.
#[derive(Debug, Clone)]
pub struct RunStatistics {
    in_range: usize,
    processed: usize,
    current_index: Option<usize>,
    counts: BTreeMap<Tally, usize>,
    filter_reasons: BTreeMap<FilterReason, usize>,
    duplicates_enhanced: usize,
    backoff_sleeps: usize,
    rate_limit_hits: usize,
    started: Instant,
    elapsed: Option<Duration>,
    interrupted: bool,
}

impl RunStatistics {
    /// Starts a tally for a run covering `in_range` URLs.
    #[must_use]
    pub fn new(in_range: usize) -> Self {
        Self {
            in_range,
            processed: 0,
            current_index: None,
            counts: BTreeMap::new(),
            filter_reasons: BTreeMap::new(),
            duplicates_enhanced: 0,
            backoff_sleeps: 0,
            rate_limit_hits: 0,
            started: Instant::now(),
            elapsed: None,
            interrupted: false,
        }
    }

    pub(crate) fn begin(&mut self, index: usize) {
        self.current_index = Some(index);
    }

    pub(crate) fn record(&mut self, outcome: &ImportOutcome) {
        self.processed += 1;
        let key = if outcome.interrupted {
            Tally::Interrupted
        } else {
            Tally::from(outcome.status)
        };
        *self.counts.entry(key).or_insert(0) += 1;
        if let ImportStatus::Filtered(reason) = outcome.status {
            *self.filter_reasons.entry(reason).or_insert(0) += 1;
        }
        if outcome.enhanced_duplicate() {
            self.duplicates_enhanced += 1;
        }
        self.backoff_sleeps += outcome.backoff_sleeps as usize;
        self.rate_limit_hits += outcome.rate_limit_hits as usize;
    }

    pub(crate) fn finish(&mut self, interrupted: bool) {
        self.interrupted = interrupted;
        self.elapsed = Some(self.started.elapsed());
    }

    /// Outcomes recorded with exactly this status.
    ///
    /// `Filtered` counts every filter reason together. URLs cut short by an
    /// interrupt are not counted under their status.
    #[must_use]
    pub fn count(&self, status: ImportStatus) -> usize {
        self.tally(Tally::from(status))
    }

    fn tally(&self, key: Tally) -> usize {
        self.counts.get(&key).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn imported(&self) -> usize {
        self.count(ImportStatus::Imported) + self.count(ImportStatus::RateLimitedThenImported)
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(ImportStatus::ScrapeFailed)
            + self.count(ImportStatus::CreateFailed)
            + self.count(ImportStatus::RateLimitedThenFailed)
    }

    #[must_use]
    pub fn duplicates(&self) -> usize {
        self.count(ImportStatus::Duplicate)
    }

    /// Duplicates that were missing an image and received one.
    #[must_use]
    pub fn duplicates_enhanced(&self) -> usize {
        self.duplicates_enhanced
    }

    /// URLs left unfinished because the operator interrupted a backoff.
    #[must_use]
    pub fn interrupted_urls(&self) -> usize {
        self.tally(Tally::Interrupted)
    }

    #[must_use]
    pub fn filtered(&self) -> usize {
        self.filter_reasons.values().sum()
    }

    #[must_use]
    pub fn filtered_by(&self, reason: FilterReason) -> usize {
        self.filter_reasons.get(&reason).copied().unwrap_or(0)
    }

    /// Filter reasons with non-zero counts, in a stable order.
    pub fn filter_breakdown(&self) -> impl Iterator<Item = (FilterReason, usize)> + '_ {
        self.filter_reasons.iter().map(|(r, n)| (*r, *n))
    }

    /// Imported share of processed URLs, in percent.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn success_rate(&self) -> f64 {
        if self.processed == 0 {
            0.0
        } else {
            self.imported() as f64 / self.processed as f64 * 100.0
        }
    }

    #[must_use]
    pub fn in_range(&self) -> usize {
        self.in_range
    }

    #[must_use]
    pub fn processed(&self) -> usize {
        self.processed
    }

    /// Index of the URL being processed, or the last one processed.
    #[must_use]
    pub fn current_index(&self) -> Option<usize> {
        self.current_index
    }

    #[must_use]
    pub fn backoff_sleeps(&self) -> usize {
        self.backoff_sleeps
    }

    #[must_use]
    pub fn rate_limit_hits(&self) -> usize {
        self.rate_limit_hits
    }

    /// Wall time of the run; live until the run finishes.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.elapsed.unwrap_or_else(|| self.started.elapsed())
    }

    #[must_use]
    pub fn was_interrupted(&self) -> bool {
        self.interrupted
    }
}

/// Return value of a run: every emitted outcome in input order plus the final tally.
#[derive(Debug, Clone)]
pub struct ImportRun {
    pub outcomes: Vec<ImportOutcome>,
    pub stats: RunStatistics,
}

impl ImportRun {
    /// Outcomes that ended in a failure status, excluding URLs cut short by an interrupt.
    pub fn failures(&self) -> impl Iterator<Item = &ImportOutcome> {
        self.outcomes
            .iter()
            .filter(|o| o.status.is_failure() && !o.interrupted)
    }

    /// Index to pass as the start offset to continue after this run.
    ///
    /// A URL whose backoff was interrupted is not finished, so the offset
    /// points back at it.
    #[must_use]
    pub fn resume_offset(&self) -> Option<usize> {
        self.outcomes.last().map(|o| {
            if o.interrupted {
                o.index
            } else {
                o.index + 1
            }
        })
    }
}
