//! The per-URL import state machine.
//!
//! ```text
//! Pending ─filter rejects──────────────▶ Filtered
//!    │    ─already in index────────────▶ Duplicate
//!    ▼
//! Scraping ─server reports duplicate───▶ Duplicate (image added if it had none)
//!    │     ─error / empty payload──────▶ ScrapeFailed
//!    ▼
//! Creating ─error──────────────────────▶ CreateFailed
//!    │
//!    ▼
//! Imported (then best-effort image attach)
//! ```
//!
//! A URL that hit a rate limit and still got imported ends as
//! `RateLimitedThenImported`; one that hit a rate limit and later failed for a
//! different reason ends as `RateLimitedThenFailed`.
//!
//! The server is always sent the canonical form of a URL (see
//! [`canonical_source_url`]); outcomes keep the URL as listed.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use super::job::ImportJob;
use super::outcome::{ImportOutcome, ImportRun, ImportStatus, Phase, RunStatistics};
use crate::api::payload::{QualityVerdict, assess_quality, prepare_for_create, primary_image_url};
use crate::api::{ApiError, RecipeApi, RecipeId, ScrapedPayload};
use crate::config::ImporterConfig;
use crate::dedup::{DuplicateIndex, canonical_source_url};
use crate::filter::UrlFilter;
use crate::report::{ProgressReporter, notify};
use crate::retry::{RetryOutcome, RetryPolicy, SleepOutcome, Sleeper, run_with_retry};

/// Message recorded when a backoff is cut short by the operator.
pub const INTERRUPTED_MESSAGE: &str = "interrupted";

/// Drives an [`ImportJob`] against a [`RecipeApi`], one URL at a time.
pub struct Orchestrator {
    config: ImporterConfig,
    api: Arc<dyn RecipeApi>,
    sleeper: Arc<dyn Sleeper>,
    filter: UrlFilter,
    policy: RetryPolicy,
    interrupt: Option<Arc<AtomicBool>>,
}

/// Result of one URL plus what the loop needs to know about it.
struct Processed {
    outcome: ImportOutcome,
    contacted_server: bool,
    interrupted: bool,
}

impl Processed {
    fn offline(outcome: ImportOutcome) -> Self {
        Self {
            outcome,
            contacted_server: false,
            interrupted: false,
        }
    }

    fn remote(outcome: ImportOutcome) -> Self {
        Self {
            outcome,
            contacted_server: true,
            interrupted: false,
        }
    }
}

/// Retry counters summed across both phases of one URL.
#[derive(Debug, Default, Clone, Copy)]
struct Counters {
    rate_limit_hits: u32,
    backoff_sleeps: u32,
}

impl Counters {
    fn add<T>(&mut self, outcome: &RetryOutcome<T>) {
        self.rate_limit_hits += outcome.rate_limit_hits;
        self.backoff_sleeps += outcome.backoff_sleeps;
    }

    fn apply(self, outcome: &mut ImportOutcome) {
        outcome.rate_limit_hits = self.rate_limit_hits;
        outcome.backoff_sleeps = self.backoff_sleeps;
    }
}

impl Orchestrator {
    /// Creates an orchestrator with the default URL filter and no interrupt flag.
    #[must_use]
    pub fn new(config: ImporterConfig, api: Arc<dyn RecipeApi>, sleeper: Arc<dyn Sleeper>) -> Self {
        let policy = config.retry_policy();
        Self {
            config,
            api,
            sleeper,
            filter: UrlFilter::default(),
            policy,
            interrupt: None,
        }
    }

    #[must_use]
    pub fn with_filter(mut self, filter: UrlFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Flag checked before each URL; setting it stops the run at the next boundary.
    #[must_use]
    pub fn with_interrupt(mut self, interrupt: Arc<AtomicBool>) -> Self {
        self.interrupt = Some(interrupt);
        self
    }

    fn is_interrupted(&self) -> bool {
        self.interrupt
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
            || self.sleeper.is_interrupted()
    }

    /// Processes every URL in the job's range, in order.
    ///
    /// Always returns the outcomes produced so far and the final statistics,
    /// including when the run is interrupted.
    #[instrument(skip_all, fields(start = job.start(), in_range = job.len_in_range()))]
    pub async fn run(
        &self,
        job: &ImportJob,
        index: &DuplicateIndex,
        reporter: &mut dyn ProgressReporter,
    ) -> ImportRun {
        let range = job.range();
        let last = range.end.saturating_sub(1);
        let mut stats = RunStatistics::new(range.len());
        let mut outcomes = Vec::with_capacity(range.len());
        let mut interrupted = false;

        info!(
            urls = range.len(),
            existing = index.len(),
            "starting import"
        );

        for position in range {
            if self.is_interrupted() {
                interrupted = true;
                break;
            }
            stats.begin(position);

            let url = job.urls()[position].as_str();
            let processed = self.process_url(position, url, index).await;
            stats.record(&processed.outcome);
            notify("outcome", || reporter.on_outcome(&processed.outcome, &stats));
            outcomes.push(processed.outcome);

            if processed.interrupted {
                interrupted = true;
                break;
            }

            let delay = self.config.delay_between_requests();
            if processed.contacted_server && position != last && !delay.is_zero() {
                debug!(delay_secs = delay.as_secs(), "pacing before next URL");
                if self.sleeper.sleep(delay).await == SleepOutcome::Interrupted {
                    interrupted = true;
                    break;
                }
            }
        }

        stats.finish(interrupted);
        notify("finish", || reporter.on_finish(&stats));
        info!(
            processed = stats.processed(),
            imported = stats.imported(),
            duplicates = stats.duplicates(),
            filtered = stats.filtered(),
            failed = stats.failed(),
            interrupted,
            "import finished"
        );

        ImportRun { outcomes, stats }
    }

    #[instrument(skip(self, index))]
    async fn process_url(&self, position: usize, url: &str, index: &DuplicateIndex) -> Processed {
        let verdict = self.filter.classify(url);
        if !verdict.accepted {
            debug!(reason = %verdict.reason, "filtered");
            return Processed::offline(ImportOutcome::new(
                position,
                url,
                ImportStatus::Filtered(verdict.reason),
            ));
        }

        if index.contains(url) {
            let mut outcome = ImportOutcome::new(position, url, ImportStatus::Duplicate);
            outcome.message = Some("source URL already on server".to_string());
            return Processed::offline(outcome);
        }

        let canonical = canonical_source_url(url);
        if canonical != url {
            debug!(%canonical, "sending canonical URL");
        }
        info!("scraping");
        let mut counters = Counters::default();
        let scrape = run_with_retry(&self.policy, self.sleeper.as_ref(), "scrape", || {
            self.api.scrape(&canonical)
        })
        .await;
        counters.add(&scrape);
        let interrupted = scrape.interrupted;
        let payload = match scrape.result {
            Ok(payload) => payload,
            Err(error) => {
                return failure(position, url, Phase::Scrape, &error, counters, interrupted, None);
            }
        };

        if let Some(existing) = payload.duplicates.first() {
            let mut outcome = ImportOutcome::new(position, url, ImportStatus::Duplicate);
            outcome.recipe_id = existing.id;
            if let Some(id) = existing.id {
                outcome.image_attached = self.enhance_duplicate(id, &payload).await;
            }
            outcome.message = Some(format!(
                "server reports duplicate: {}{}",
                existing.name.as_deref().unwrap_or("unnamed recipe"),
                if outcome.image_attached { " (image added)" } else { "" }
            ));
            counters.apply(&mut outcome);
            return Processed::remote(outcome);
        }

        let Some(recipe) = payload.recipe.clone() else {
            return Processed::remote(rejected_payload(
                position,
                url,
                "scrape returned no recipe data",
                counters,
            ));
        };
        if let QualityVerdict::Unusable { reason } = assess_quality(&recipe, &canonical) {
            return Processed::remote(rejected_payload(position, url, &reason, counters));
        }

        let prepared = prepare_for_create(recipe, &canonical);
        info!("creating recipe");
        let create = run_with_retry(&self.policy, self.sleeper.as_ref(), "create", || {
            self.api.create(&prepared)
        })
        .await;
        counters.add(&create);
        let recipe_id = match create.result {
            Ok(id) => id,
            Err(error) => {
                return failure(
                    position,
                    url,
                    Phase::Create,
                    &error,
                    counters,
                    create.interrupted,
                    Some(prepared),
                );
            }
        };

        let status = if counters.rate_limit_hits > 0 {
            ImportStatus::RateLimitedThenImported
        } else {
            ImportStatus::Imported
        };
        let mut outcome = ImportOutcome::new(position, url, status);
        outcome.recipe_id = Some(recipe_id);
        counters.apply(&mut outcome);
        info!(recipe_id = %recipe_id, "imported");

        if let Some(image_url) = primary_image_url(&payload) {
            outcome.image_attached = self.attach_image(recipe_id, image_url).await;
        }

        Processed::remote(outcome)
    }

    /// Gives a duplicate the scraped image when the stored recipe has none.
    async fn enhance_duplicate(&self, id: RecipeId, payload: &ScrapedPayload) -> bool {
        let Some(image_url) = primary_image_url(payload) else {
            return false;
        };
        match self.api.recipe_detail(id).await {
            Ok(detail) if detail.has_image() => {
                debug!(recipe_id = %id, "duplicate already has an image");
                false
            }
            Ok(_) => {
                info!(recipe_id = %id, "adding image to duplicate recipe");
                self.attach_image(id, image_url).await
            }
            Err(error) => {
                warn!(recipe_id = %id, %error, "cannot read duplicate recipe");
                false
            }
        }
    }

    /// Best effort: failures are logged and never change the URL's status.
    async fn attach_image(&self, id: RecipeId, image_url: &str) -> bool {
        match self.api.attach_image(id, image_url).await {
            Ok(()) => {
                debug!(recipe_id = %id, image_url, "image attached");
                true
            }
            Err(error) => {
                warn!(recipe_id = %id, image_url, %error, "image attach failed");
                false
            }
        }
    }
}

/// Outcome for a scrape that answered but produced nothing worth creating.
fn rejected_payload(
    position: usize,
    url: &str,
    reason: &str,
    counters: Counters,
) -> ImportOutcome {
    let status = if counters.rate_limit_hits > 0 {
        ImportStatus::RateLimitedThenFailed
    } else {
        ImportStatus::ScrapeFailed
    };
    let mut outcome = ImportOutcome::new(position, url, status);
    outcome.failed_phase = Some(Phase::Scrape);
    outcome.message = Some(reason.to_string());
    counters.apply(&mut outcome);
    debug!(url, reason, "scrape payload rejected");
    outcome
}

fn failure(
    position: usize,
    url: &str,
    phase: Phase,
    error: &ApiError,
    counters: Counters,
    interrupted: bool,
    payload: Option<Value>,
) -> Processed {
    let phase_status = match phase {
        Phase::Scrape => ImportStatus::ScrapeFailed,
        Phase::Create => ImportStatus::CreateFailed,
    };
    // Exhausting the rate-limit budget keeps the phase's own failure state.
    let status = if interrupted || error.is_rate_limited() || counters.rate_limit_hits == 0 {
        phase_status
    } else {
        ImportStatus::RateLimitedThenFailed
    };

    let mut outcome = ImportOutcome::new(position, url, status);
    outcome.failed_phase = Some(phase);
    outcome.http_status = error.http_status();
    outcome.message = Some(if interrupted {
        INTERRUPTED_MESSAGE.to_string()
    } else {
        error.to_string()
    });
    outcome.payload = payload;
    outcome.interrupted = interrupted;
    counters.apply(&mut outcome);
    debug!(%phase, %error, interrupted, "URL failed");

    Processed {
        outcome,
        contacted_server: true,
        interrupted,
    }
}
