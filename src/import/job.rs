//! The immutable description of one import run.

use std::ops::Range;

/// Ordered URL list plus the slice of it to process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportJob {
    urls: Vec<String>,
    start: usize,
    max: Option<usize>,
}

impl ImportJob {
    /// Job covering every URL.
    #[must_use]
    pub fn new(urls: Vec<String>) -> Self {
        Self {
            urls,
            start: 0,
            max: None,
        }
    }

    /// Skips the first `start` URLs (0-based offset for resuming).
    #[must_use]
    pub fn starting_at(mut self, start: usize) -> Self {
        self.start = start;
        self
    }

    /// Processes at most `max` URLs.
    #[must_use]
    pub fn with_max(mut self, max: Option<usize>) -> Self {
        self.max = max;
        self
    }

    #[must_use]
    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    #[must_use]
    pub fn start(&self) -> usize {
        self.start
    }

    #[must_use]
    pub fn max(&self) -> Option<usize> {
        self.max
    }

    /// Indices to process: `start .. min(start + max, len)`, empty when `start >= len`.
    #[must_use]
    pub fn range(&self) -> Range<usize> {
        let len = self.urls.len();
        if self.start >= len {
            return len..len;
        }
        let end = match self.max {
            Some(max) => self.start.saturating_add(max).min(len),
            None => len,
        };
        self.start..end
    }

    /// Number of URLs the run will reach when not interrupted.
    #[must_use]
    pub fn len_in_range(&self) -> usize {
        self.range().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn urls(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("https://r.example.com/{i}")).collect()
    }

    #[test]
    fn test_range_defaults_to_everything() {
        assert_eq!(ImportJob::new(urls(5)).range(), 0..5);
    }

    #[test]
    fn test_range_with_start_and_max() {
        let job = ImportJob::new(urls(10)).starting_at(3).with_max(Some(4));
        assert_eq!(job.range(), 3..7);
        assert_eq!(job.len_in_range(), 4);
    }

    #[test]
    fn test_range_max_clamped_to_len() {
        let job = ImportJob::new(urls(5)).starting_at(3).with_max(Some(100));
        assert_eq!(job.range(), 3..5);
    }

    #[test]
    fn test_range_start_past_end_is_empty() {
        let job = ImportJob::new(urls(3)).starting_at(3);
        assert!(job.range().is_empty());
        let job = ImportJob::new(urls(3)).starting_at(50);
        assert_eq!(job.len_in_range(), 0);
    }

    #[test]
    fn test_range_max_zero_is_empty() {
        let job = ImportJob::new(urls(3)).with_max(Some(0));
        assert!(job.range().is_empty());
    }

    #[test]
    fn test_range_huge_max_does_not_overflow() {
        let job = ImportJob::new(urls(3)).starting_at(1).with_max(Some(usize::MAX));
        assert_eq!(job.range(), 1..3);
    }
}
