//! Offline classification of candidate URLs.
//!
//! [`UrlFilter::classify`] decides, without any network access, whether a URL
//! is worth sending to the recipe server at all. Rules are checked in order and
//! the first match wins:
//!
//! 1. not an absolute URL, or no dotted host → [`FilterReason::Malformed`]
//! 2. scheme other than http(s), or longer than [`MAX_URL_LENGTH`] → [`FilterReason::Other`]
//! 3. last path segment has a blocklisted extension → [`FilterReason::NonRecipeExtension`]
//! 4. host and path match a social-media rule → [`FilterReason::SocialMedia`]
//!
//! Anything else is accepted with [`FilterReason::Ok`].

use std::fmt;

use tracing::trace;
use url::Url;

/// Longest URL the importer will send to the server.
pub const MAX_URL_LENGTH: usize = 2048;

const IMAGE_EXTENSIONS: [&str; 7] = ["jpg", "jpeg", "png", "gif", "webp", "svg", "bmp"];
const VIDEO_EXTENSIONS: [&str; 6] = ["mp4", "mov", "avi", "wmv", "flv", "webm"];
const DOCUMENT_EXTENSIONS: [&str; 5] = ["pdf", "doc", "docx", "txt", "csv"];
const ARCHIVE_EXTENSIONS: [&str; 4] = ["zip", "rar", "tar", "gz"];

/// Why a URL was accepted or rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FilterReason {
    Ok,
    NonRecipeExtension,
    Malformed,
    SocialMedia,
    Other,
}

impl FilterReason {
    /// Short label used in reports.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::NonRecipeExtension => "non-recipe file",
            Self::Malformed => "malformed URL",
            Self::SocialMedia => "social media",
            Self::Other => "unsupported URL",
        }
    }
}

impl fmt::Display for FilterReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Verdict returned by [`UrlFilter::classify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UrlVerdict {
    pub accepted: bool,
    pub reason: FilterReason,
}

impl UrlVerdict {
    fn accept() -> Self {
        Self {
            accepted: true,
            reason: FilterReason::Ok,
        }
    }

    fn reject(reason: FilterReason) -> Self {
        Self {
            accepted: false,
            reason,
        }
    }
}

/// Host-based rejection rule.
///
/// Matches the domain itself and any subdomain. When `path_contains` is set the
/// lowercased path must also contain it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostRule {
    pub domain: String,
    pub path_contains: Option<String>,
}

impl HostRule {
    /// Rejects every URL on `domain`.
    #[must_use]
    pub fn domain(domain: &str) -> Self {
        Self {
            domain: domain.to_ascii_lowercase(),
            path_contains: None,
        }
    }

    /// Rejects URLs on `domain` whose path contains `fragment`.
    #[must_use]
    pub fn domain_with_path(domain: &str, fragment: &str) -> Self {
        Self {
            domain: domain.to_ascii_lowercase(),
            path_contains: Some(fragment.to_ascii_lowercase()),
        }
    }

    fn matches(&self, host: &str, path: &str) -> bool {
        let host_matches = host == self.domain
            || host
                .strip_suffix(self.domain.as_str())
                .is_some_and(|prefix| prefix.ends_with('.'));
        host_matches
            && self
                .path_contains
                .as_deref()
                .is_none_or(|fragment| path.contains(fragment))
    }
}

/// Rule data for a [`UrlFilter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterRules {
    /// Lowercase extensions without the dot.
    pub blocked_extensions: Vec<String>,
    pub social_media: Vec<HostRule>,
}

impl Default for FilterRules {
    fn default() -> Self {
        let blocked_extensions = IMAGE_EXTENSIONS
            .iter()
            .chain(VIDEO_EXTENSIONS.iter())
            .chain(DOCUMENT_EXTENSIONS.iter())
            .chain(ARCHIVE_EXTENSIONS.iter())
            .map(|ext| (*ext).to_string())
            .collect();
        let social_media = vec![
            HostRule::domain_with_path("facebook.com", "/photo"),
            HostRule::domain_with_path("instagram.com", "/p/"),
            HostRule::domain_with_path("twitter.com", "/status"),
            HostRule::domain_with_path("x.com", "/status"),
            HostRule::domain("i.redd.it"),
            HostRule::domain("v.redd.it"),
            HostRule::domain_with_path("reddit.com", "/gallery"),
            HostRule::domain("i.imgur.com"),
            HostRule::domain_with_path("dropbox.com", "/s/"),
            HostRule::domain_with_path("drive.google.com", "/file"),
        ];
        Self {
            blocked_extensions,
            social_media,
        }
    }
}

/// Pure URL classifier.
#[derive(Debug, Clone, Default)]
pub struct UrlFilter {
    rules: FilterRules,
}

impl UrlFilter {
    #[must_use]
    pub fn new(rules: FilterRules) -> Self {
        Self { rules }
    }

    #[must_use]
    pub fn rules(&self) -> &FilterRules {
        &self.rules
    }

    /// Classifies `url`. Total: every input gets a verdict.
    #[must_use]
    pub fn classify(&self, url: &str) -> UrlVerdict {
        let verdict = self.classify_inner(url.trim());
        trace!(url, reason = %verdict.reason, "classified URL");
        verdict
    }

    fn classify_inner(&self, url: &str) -> UrlVerdict {
        let Ok(parsed) = Url::parse(url) else {
            return UrlVerdict::reject(FilterReason::Malformed);
        };
        if !matches!(parsed.scheme(), "http" | "https") {
            return UrlVerdict::reject(FilterReason::Other);
        }
        let host = match parsed.host_str() {
            Some(host) if host.contains('.') => host.to_ascii_lowercase(),
            _ => return UrlVerdict::reject(FilterReason::Malformed),
        };
        if url.chars().count() > MAX_URL_LENGTH {
            return UrlVerdict::reject(FilterReason::Other);
        }

        let path = parsed.path().to_lowercase();
        if self.has_blocked_extension(&path) {
            return UrlVerdict::reject(FilterReason::NonRecipeExtension);
        }
        if self
            .rules
            .social_media
            .iter()
            .any(|rule| rule.matches(&host, &path))
        {
            return UrlVerdict::reject(FilterReason::SocialMedia);
        }

        UrlVerdict::accept()
    }

    fn has_blocked_extension(&self, path: &str) -> bool {
        let last_segment = path.rsplit('/').next().unwrap_or_default();
        let Some((stem, extension)) = last_segment.rsplit_once('.') else {
            return false;
        };
        !stem.is_empty()
            && self
                .rules
                .blocked_extensions
                .iter()
                .any(|blocked| blocked == extension)
    }
}
