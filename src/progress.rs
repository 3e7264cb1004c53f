//! Progress bar for interactive runs.

use std::time::Duration;

use importer_core::{ImportOutcome, ProgressReporter, ReportError, RunStatistics};
use indicatif::{ProgressBar, ProgressStyle};
use url::Url;

/// Whether to draw the progress bar: only on an interactive, non-dumb stderr.
pub(crate) fn should_use_progress_bar(stderr_is_terminal: bool, quiet: bool) -> bool {
    let dumb_terminal = std::env::var("TERM")
        .map(|value| value.eq_ignore_ascii_case("dumb"))
        .unwrap_or(false);
    stderr_is_terminal && !quiet && !dumb_terminal
}

/// Reporter drawing an indicatif bar of processed URLs.
pub(crate) struct BarReporter {
    bar: ProgressBar,
}

impl BarReporter {
    pub(crate) fn new(total: usize) -> Self {
        let bar = ProgressBar::new(total as u64);
        bar.set_style(
            ProgressStyle::with_template("{spinner} [{pos}/{len}] {wide_bar} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar.enable_steady_tick(Duration::from_millis(120));
        Self { bar }
    }
}

impl ProgressReporter for BarReporter {
    fn on_outcome(
        &mut self,
        outcome: &ImportOutcome,
        stats: &RunStatistics,
    ) -> Result<(), ReportError> {
        let host = Url::parse(&outcome.url)
            .ok()
            .and_then(|url| url.host_str().map(str::to_string))
            .unwrap_or_else(|| "?".to_string());
        self.bar.set_position(stats.processed() as u64);
        self.bar.set_message(format!(
            "{} {host} | {:.0}% ok",
            outcome.status,
            stats.success_rate()
        ));
        Ok(())
    }

    fn on_finish(&mut self, _stats: &RunStatistics) -> Result<(), ReportError> {
        self.bar.finish_and_clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_bar_disabled_when_quiet_or_piped() {
        assert!(!should_use_progress_bar(true, true));
        assert!(!should_use_progress_bar(false, false));
    }

    #[test]
    fn test_bar_reporter_finishes_on_run_end() {
        let mut reporter = BarReporter::new(3);
        let stats = RunStatistics::new(3);
        reporter.on_finish(&stats).ok();
        assert!(reporter.bar.is_finished());
    }
}
