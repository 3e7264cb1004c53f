//! End-of-run report text.

use std::collections::BTreeMap;

use crate::import::{ImportOutcome, ImportRun, ImportStatus, Phase, RunStatistics};

/// Totals block: counts per status, filter breakdown, backoffs, time and success rate.
#[must_use]
pub fn render_statistics(stats: &RunStatistics) -> Vec<String> {
    let mut lines = Vec::new();
    lines.push(if stats.was_interrupted() {
        "Import interrupted".to_string()
    } else {
        "Import complete".to_string()
    });
    lines.push(format!(
        "  Processed:               {} of {}",
        stats.processed(),
        stats.in_range()
    ));
    lines.push(format!("  Imported:                {}", stats.imported()));
    let after_limit = stats.count(ImportStatus::RateLimitedThenImported);
    if after_limit > 0 {
        lines.push(format!("    after rate limit:      {after_limit}"));
    }
    lines.push(format!("  Duplicates skipped:      {}", stats.duplicates()));
    let enhanced = stats.duplicates_enhanced();
    if enhanced > 0 {
        lines.push(format!("    image added:           {enhanced}"));
    }
    lines.push(format!("  Filtered:                {}", stats.filtered()));
    for (reason, count) in stats.filter_breakdown() {
        lines.push(format!("    {reason}: {count}"));
    }
    lines.push(format!(
        "  Scrape failed:           {}",
        stats.count(ImportStatus::ScrapeFailed)
    ));
    lines.push(format!(
        "  Create failed:           {}",
        stats.count(ImportStatus::CreateFailed)
    ));
    lines.push(format!(
        "  Failed after rate limit: {}",
        stats.count(ImportStatus::RateLimitedThenFailed)
    ));
    let cut_short = stats.interrupted_urls();
    if cut_short > 0 {
        lines.push(format!("  Interrupted:             {cut_short}"));
    }
    lines.push(format!("  Backoff sleeps:          {}", stats.backoff_sleeps()));
    lines.push(format!(
        "  Elapsed:                 {:.1}s",
        stats.elapsed().as_secs_f64()
    ));
    lines.push(format!("  Success rate:            {:.1}%", stats.success_rate()));
    lines
}

/// Full final report: the totals block, failed and filtered URLs grouped by
/// category, and where to resume when the run was interrupted.
#[must_use]
pub fn render_summary(run: &ImportRun) -> Vec<String> {
    let mut lines = render_statistics(&run.stats);

    let mut groups: BTreeMap<String, Vec<&ImportOutcome>> = BTreeMap::new();
    for outcome in &run.outcomes {
        if let Some(category) = category(outcome) {
            groups.entry(category).or_default().push(outcome);
        }
    }
    if !groups.is_empty() {
        lines.push("Unimported URLs:".to_string());
        for (category, outcomes) in &groups {
            lines.push(format!("  {category} ({}):", outcomes.len()));
            for outcome in outcomes {
                match &outcome.message {
                    Some(message) => {
                        lines.push(format!("    #{} {} - {message}", outcome.index, outcome.url));
                    }
                    None => lines.push(format!("    #{} {}", outcome.index, outcome.url)),
                }
            }
        }
    }

    if run.stats.was_interrupted()
        && let Some(next) = run.resume_offset()
    {
        lines.push(format!("Resume from index {next} to continue."));
    }
    lines
}

fn category(outcome: &ImportOutcome) -> Option<String> {
    let phase = outcome.failed_phase.unwrap_or(Phase::Scrape);
    if outcome.interrupted {
        return Some(format!("interrupted during {phase}"));
    }
    match outcome.status {
        ImportStatus::Filtered(reason) => Some(format!("filtered: {reason}")),
        ImportStatus::ScrapeFailed => Some("scrape failed".to_string()),
        ImportStatus::CreateFailed => Some("create failed".to_string()),
        ImportStatus::RateLimitedThenFailed => Some(format!("{phase} failed after rate limit")),
        ImportStatus::Imported | ImportStatus::RateLimitedThenImported | ImportStatus::Duplicate => {
            None
        }
    }
}
