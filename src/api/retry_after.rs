//! `Retry-After` header parsing (RFC 7231 §7.1.3).

use std::time::{Duration, SystemTime};

use tracing::{debug, warn};

/// Upper bound for a server-requested wait.
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);

/// Parses a `Retry-After` value given either as delay-seconds or an HTTP-date.
///
/// Values above [`MAX_RETRY_AFTER`] are capped. Dates in the past yield zero.
/// Negative or unparseable values return `None` so the caller falls back to its
/// configured rate-limit delay.
#[must_use]
pub fn parse_retry_after(header_value: &str) -> Option<Duration> {
    let header_value = header_value.trim();

    if let Ok(seconds) = header_value.parse::<i64>() {
        let Ok(seconds) = u64::try_from(seconds) else {
            debug!(seconds, "negative Retry-After value, ignoring");
            return None;
        };
        return Some(cap(Duration::from_secs(seconds)));
    }

    match httpdate::parse_http_date(header_value) {
        Ok(when) => match when.duration_since(SystemTime::now()) {
            Ok(delay) => Some(cap(delay)),
            Err(_) => {
                debug!(header_value, "Retry-After date is in the past");
                Some(Duration::ZERO)
            }
        },
        Err(_) => {
            debug!(header_value, "unparseable Retry-After value");
            None
        }
    }
}

fn cap(delay: Duration) -> Duration {
    if delay > MAX_RETRY_AFTER {
        warn!(
            delay_secs = delay.as_secs(),
            max_secs = MAX_RETRY_AFTER.as_secs(),
            "Retry-After exceeds maximum, capping"
        );
        MAX_RETRY_AFTER
    } else {
        delay
    }
}
