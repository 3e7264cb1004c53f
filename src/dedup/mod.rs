//! Snapshot of source URLs already stored on the recipe server.
//!
//! The index is built once before the run by walking the server's recipe list
//! page by page, then consulted read-only for every candidate URL. Recipes
//! created during the run are not added; the scrape endpoint's own duplicate
//! report covers those.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::api::{ApiError, RecipeApi};
use crate::retry::{RetryPolicy, Sleeper, run_with_retry};

/// Host renames applied during normalization so old bookmarks match new recipes.
const HOST_REBRANDS: [(&str, &str); 1] = [("kingarthurflour.com", "kingarthurbaking.com")];

/// Upper bound on list pages walked while building the index.
pub const MAX_INDEX_PAGES: u32 = 10_000;

/// `/YYYY/MM/DD/` archive segments many blogs put in front of the slug.
#[allow(clippy::expect_used)]
static DATE_SEGMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/\d{4}/\d{2}/\d{2}/").expect("date segment regex is valid") // Static pattern, safe to panic
});

/// Category level of chilipeppermadness.com recipe paths; the same recipe is
/// served under several categories.
#[allow(clippy::expect_used)]
static CHILI_CATEGORY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^/chili-pepper-recipes/[^/]+/([^/]+/)$").expect("category regex is valid") // Static pattern, safe to panic
});

/// Reasons the index could not be built. The run never starts without one.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("failed to read existing recipes (page {page}): {source}")]
    Authentication {
        page: u32,
        #[source]
        source: ApiError,
    },

    #[error("failed to read existing recipes (page {page}): {source}")]
    Api {
        page: u32,
        #[source]
        source: ApiError,
    },

    #[error("interrupted while reading existing recipes (page {page})")]
    Interrupted { page: u32 },

    #[error("recipe list still reports more results after {limit} pages")]
    TooManyPages { limit: u32 },
}

impl IndexError {
    fn from_api(page: u32, source: ApiError) -> Self {
        match source {
            ApiError::Unauthorized { .. } => Self::Authentication { page, source },
            other => Self::Api {
                page,
                source: other,
            },
        }
    }
}

/// Rewrites a recipe URL to the canonical form sent to the server.
///
/// Upgrades `http` to `https`, applies known host rebrands, removes
/// `/YYYY/MM/DD/` date segments and collapses chilipeppermadness.com category
/// paths. Case and query are kept. Strings that do not parse come back trimmed.
#[must_use]
pub fn canonical_source_url(url: &str) -> String {
    let trimmed = url.trim();
    let Ok(mut parsed) = Url::parse(trimmed) else {
        return trimmed.to_string();
    };
    if parsed.scheme() == "http" {
        // set_scheme only fails between special and non-special schemes.
        let _ = parsed.set_scheme("https");
    }

    let Some(host) = parsed.host_str().map(str::to_string) else {
        return parsed.to_string();
    };
    for (old, new) in HOST_REBRANDS {
        if let Some(prefix) = host
            .strip_suffix(old)
            .filter(|p| p.is_empty() || p.ends_with('.'))
        {
            let _ = parsed.set_host(Some(&format!("{prefix}{new}")));
            break;
        }
    }

    let mut path = DATE_SEGMENT.replace_all(parsed.path(), "/").into_owned();
    if host_matches(&host, "chilipeppermadness.com") {
        path = CHILI_CATEGORY
            .replace(&path, "/chili-pepper-recipes/$1")
            .into_owned();
    }
    if path != parsed.path() {
        debug!(from = parsed.path(), to = %path, "rewrote recipe path");
        parsed.set_path(&path);
    }

    parsed.to_string()
}

fn host_matches(host: &str, domain: &str) -> bool {
    host.strip_suffix(domain)
        .is_some_and(|prefix| prefix.is_empty() || prefix.ends_with('.'))
}

/// Normalizes a source URL for duplicate comparison.
///
/// Starts from [`canonical_source_url`], then lowercases and drops the
/// fragment and trailing slashes. Strings that do not parse fall back to
/// trimmed, lowercased text without trailing slashes.
#[must_use]
pub fn normalize_source_url(url: &str) -> String {
    let lowered = canonical_source_url(url).to_lowercase();

    let Ok(mut parsed) = Url::parse(&lowered) else {
        return lowered.trim_end_matches('/').to_string();
    };
    parsed.set_fragment(None);

    parsed.as_str().trim_end_matches('/').to_string()
}

/// Set of normalized source URLs present on the server.
#[derive(Debug, Clone, Default)]
pub struct DuplicateIndex {
    urls: HashSet<String>,
}

impl DuplicateIndex {
    /// Builds an index from URLs already in hand.
    pub fn from_urls<I, S>(urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            urls: urls
                .into_iter()
                .map(|u| normalize_source_url(u.as_ref()))
                .collect(),
        }
    }

    /// Walks every page of the server's recipe list.
    ///
    /// Each page fetch goes through the shared retry policy. The walk ends at
    /// the last page or at the first page with no recipes on it.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError`] when a page cannot be fetched after retries, the
    /// operator interrupts a backoff, or the list runs past [`MAX_INDEX_PAGES`].
    #[instrument(skip(api, policy, sleeper))]
    pub async fn build(
        api: &dyn RecipeApi,
        policy: &RetryPolicy,
        sleeper: &dyn Sleeper,
        page_size: u32,
    ) -> Result<Self, IndexError> {
        let mut index = Self::default();
        let mut page = 1;

        loop {
            let outcome = run_with_retry(policy, sleeper, "list recipes", || {
                api.list_recipe_source_urls(page, page_size)
            })
            .await;
            if outcome.interrupted {
                return Err(IndexError::Interrupted { page });
            }
            let listing = outcome
                .result
                .map_err(|source| IndexError::from_api(page, source))?;

            debug!(
                page,
                entries = listing.entries,
                source_urls = listing.source_urls.len(),
                "fetched recipe page"
            );
            for url in &listing.source_urls {
                index.insert(url);
            }

            if !listing.has_more {
                break;
            }
            if listing.entries == 0 {
                warn!(page, "recipe list returned an empty page but claims more; stopping");
                break;
            }
            if page >= MAX_INDEX_PAGES {
                return Err(IndexError::TooManyPages {
                    limit: MAX_INDEX_PAGES,
                });
            }
            page += 1;
        }

        info!(existing = index.len(), pages = page, "duplicate index built");
        Ok(index)
    }

    fn insert(&mut self, url: &str) {
        self.urls.insert(normalize_source_url(url));
    }

    /// Whether `url` (after normalization) is already on the server.
    #[must_use]
    pub fn contains(&self, url: &str) -> bool {
        self.urls.contains(&normalize_source_url(url))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.urls.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }
}
