//! Error type for calls against the recipe server.
//!
//! Each variant maps onto one class of server answer so the retry policy can
//! decide without looking at raw status codes again.

use std::time::Duration;

use thiserror::Error;

/// Longest body excerpt carried in a [`ApiError::ClientError`] message.
pub const BODY_EXCERPT_LIMIT: usize = 100;

/// Errors returned by a [`RecipeApi`](super::RecipeApi) implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// HTTP 429; `retry_after` is the parsed `Retry-After` header when present.
    #[error("rate limited by server{}", format_retry_after(*retry_after))]
    RateLimited {
        /// Server-requested wait before the next call.
        retry_after: Option<Duration>,
    },

    /// HTTP 5xx.
    #[error("server error (HTTP {status})")]
    ServerError {
        /// The HTTP status code.
        status: u16,
    },

    /// Any other non-2xx answer the server gave for this request.
    #[error("request rejected (HTTP {status}): {message}")]
    ClientError {
        /// The HTTP status code.
        status: u16,
        /// Short excerpt of the response body.
        message: String,
    },

    /// HTTP 401/403: the API token was refused.
    #[error("authentication failed (HTTP {status})\n  Suggestion: check `api_token` in your config file")]
    Unauthorized {
        /// The HTTP status code.
        status: u16,
    },

    /// Transport failure, timeout, or the server could not reach the page.
    #[error("network error: {message}")]
    Network {
        /// What went wrong.
        message: String,
    },

    /// The server answered but found no recipe on the page.
    #[error("no recipe found: {message}")]
    NotARecipe {
        /// Message reported by the server.
        message: String,
    },

    /// The server answered 2xx with a body the client could not use.
    #[error("invalid response from server: {message}")]
    InvalidResponse {
        /// What was wrong with the body.
        message: String,
    },
}

fn format_retry_after(retry_after: Option<Duration>) -> String {
    match retry_after {
        Some(delay) => format!(" (retry after {}s)", delay.as_secs()),
        None => String::new(),
    }
}

impl ApiError {
    /// Creates a rate-limit error.
    pub fn rate_limited(retry_after: Option<Duration>) -> Self {
        Self::RateLimited { retry_after }
    }

    /// Maps a non-success HTTP status and body to the matching variant.
    pub fn from_status(status: u16, body: &str, retry_after: Option<Duration>) -> Self {
        match status {
            429 => Self::RateLimited { retry_after },
            401 | 403 => Self::Unauthorized { status },
            500..=599 => Self::ServerError { status },
            _ => Self::ClientError {
                status,
                message: body_excerpt(body),
            },
        }
    }

    /// Creates a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Creates a not-a-recipe error.
    pub fn not_a_recipe(message: impl Into<String>) -> Self {
        Self::NotARecipe {
            message: message.into(),
        }
    }

    /// Creates an invalid-response error.
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            message: message.into(),
        }
    }

    /// HTTP status associated with this error, if the server answered.
    #[must_use]
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::RateLimited { .. } => Some(429),
            Self::ServerError { status }
            | Self::ClientError { status, .. }
            | Self::Unauthorized { status } => Some(*status),
            Self::Network { .. } | Self::NotARecipe { .. } | Self::InvalidResponse { .. } => None,
        }
    }

    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}

/// First [`BODY_EXCERPT_LIMIT`] characters of a body, whitespace-collapsed.
#[must_use]
pub fn body_excerpt(body: &str) -> String {
    let collapsed = body.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= BODY_EXCERPT_LIMIT {
        return collapsed;
    }
    let mut excerpt: String = collapsed.chars().take(BODY_EXCERPT_LIMIT).collect();
    excerpt.push_str("...");
    excerpt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_mapping() {
        assert_eq!(
            ApiError::from_status(429, "", Some(Duration::from_secs(5))),
            ApiError::RateLimited {
                retry_after: Some(Duration::from_secs(5))
            }
        );
        assert_eq!(
            ApiError::from_status(401, "", None),
            ApiError::Unauthorized { status: 401 }
        );
        assert_eq!(
            ApiError::from_status(403, "", None),
            ApiError::Unauthorized { status: 403 }
        );
        assert_eq!(
            ApiError::from_status(502, "bad gateway", None),
            ApiError::ServerError { status: 502 }
        );
        assert_eq!(
            ApiError::from_status(400, "{\"name\": [\"too long\"]}", None),
            ApiError::ClientError {
                status: 400,
                message: "{\"name\": [\"too long\"]}".to_string()
            }
        );
    }

    #[test]
    fn test_body_excerpt_truncates_long_bodies() {
        let body = "x".repeat(500);
        let excerpt = body_excerpt(&body);
        assert_eq!(excerpt.chars().count(), BODY_EXCERPT_LIMIT + 3);
        assert!(excerpt.ends_with("..."));
    }

    #[test]
    fn test_body_excerpt_collapses_whitespace() {
        assert_eq!(body_excerpt("  a\n\n b\tc "), "a b c");
    }

    #[test]
    fn test_http_status_accessor() {
        assert_eq!(ApiError::rate_limited(None).http_status(), Some(429));
        assert_eq!(ApiError::network("reset").http_status(), None);
        assert_eq!(
            ApiError::ServerError { status: 503 }.http_status(),
            Some(503)
        );
    }

    #[test]
    fn test_display_messages() {
        let err = ApiError::rate_limited(Some(Duration::from_secs(30)));
        assert_eq!(err.to_string(), "rate limited by server (retry after 30s)");
        assert_eq!(
            ApiError::rate_limited(None).to_string(),
            "rate limited by server"
        );
        assert!(
            ApiError::Unauthorized { status: 401 }
                .to_string()
                .contains("api_token")
        );
    }
}
