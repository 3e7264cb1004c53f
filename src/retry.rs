//! Bounded retry with backoff for recipe server calls.
//!
//! The module is split in two halves:
//!
//! - [`RetryPolicy::should_retry`] is a pure decision function: given the error
//!   and how far along we are, it says whether to try again and after how long.
//! - [`run_with_retry`] is the async driver that calls the operation, consults
//!   the policy and sleeps through a [`Sleeper`], counting what happened.
//!
//! Failure classes and their handling:
//!
//! | Error | [`FailureType`] | Handling |
//! |-------|-----------------|----------|
//! | `RateLimited` | `RateLimited` | wait `Retry-After` or the configured rate-limit delay |
//! | `ServerError`, HTTP 408 | `Transient` | exponential backoff with jitter |
//! | `Network` | `Network` | a single immediate retry |
//! | `Unauthorized` | `NeedsAuth` | no retry |
//! | everything else | `Permanent` | no retry |
//!
//! Every class is bounded by `max_attempts`.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tracing::{debug, info, instrument};

use crate::api::ApiError;

/// Default maximum attempts per phase, including the first call.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default wait after a 429 without `Retry-After`.
pub const DEFAULT_RATE_LIMIT_DELAY: Duration = Duration::from_secs(60);

const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(32);
const DEFAULT_BACKOFF_MULTIPLIER: f32 = 2.0;
const MAX_JITTER: Duration = Duration::from_millis(500);

/// How many immediate retries a network failure gets within one phase.
const NETWORK_RETRY_BUDGET: u32 = 1;

/// Granularity at which [`TokioSleeper`] checks the interrupt flag.
const INTERRUPT_POLL_SLICE: Duration = Duration::from_millis(200);

/// Classification of an [`ApiError`] for retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// HTTP 429.
    RateLimited,
    /// Server-side trouble that may clear up (5xx, 408).
    Transient,
    /// Transport failure; the request may not have reached the server.
    Network,
    /// Retrying cannot change the answer.
    Permanent,
    /// The API token was refused.
    NeedsAuth,
}

/// Decision on whether to retry a failed call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after `delay`.
    Retry {
        /// How long to wait before retrying.
        delay: Duration,
        /// Which attempt the retry will be (first retry is attempt 2).
        attempt: u32,
    },
    /// Give up.
    DoNotRetry {
        /// Human-readable reason.
        reason: String,
    },
}

/// Retry configuration.
///
/// ```text
/// transient delay = min(base_delay * multiplier^(attempt-1), max_delay) + jitter
/// ```
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    rate_limit_delay: Duration,
    base_delay: Duration,
    max_delay: Duration,
    backoff_multiplier: f32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_RETRIES,
            rate_limit_delay: DEFAULT_RATE_LIMIT_DELAY,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }
}

impl RetryPolicy {
    /// Creates a fully custom policy. `max_attempts` is clamped to at least 1.
    #[must_use]
    pub fn new(
        max_attempts: u32,
        rate_limit_delay: Duration,
        base_delay: Duration,
        max_delay: Duration,
        backoff_multiplier: f32,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            rate_limit_delay,
            base_delay,
            max_delay,
            backoff_multiplier,
        }
    }

    /// Default policy with a custom attempt bound.
    #[must_use]
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Overrides the wait used for 429 answers without `Retry-After`.
    #[must_use]
    pub fn with_rate_limit_delay(mut self, delay: Duration) -> Self {
        self.rate_limit_delay = delay;
        self
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    #[must_use]
    pub fn rate_limit_delay(&self) -> Duration {
        self.rate_limit_delay
    }

    /// Decides whether the call that just failed on `attempt` (1-based) should be retried.
    ///
    /// `network_retries_used` is the number of network retries already spent
    /// in the current phase.
    #[instrument(skip(self), fields(max_attempts = self.max_attempts))]
    pub fn should_retry(
        &self,
        error: &ApiError,
        attempt: u32,
        network_retries_used: u32,
    ) -> RetryDecision {
        let failure = classify_error(error);
        match failure {
            FailureType::Permanent => {
                return RetryDecision::DoNotRetry {
                    reason: "permanent failure - retry would not help".to_string(),
                };
            }
            FailureType::NeedsAuth => {
                return RetryDecision::DoNotRetry {
                    reason: "authentication refused - check the API token".to_string(),
                };
            }
            FailureType::Network if network_retries_used >= NETWORK_RETRY_BUDGET => {
                return RetryDecision::DoNotRetry {
                    reason: "network retry already used".to_string(),
                };
            }
            FailureType::Network | FailureType::RateLimited | FailureType::Transient => {}
        }

        if attempt >= self.max_attempts {
            debug!(attempt, max = self.max_attempts, "max attempts reached");
            return RetryDecision::DoNotRetry {
                reason: format!("max attempts ({}) exhausted", self.max_attempts),
            };
        }

        let delay = match (failure, error) {
            (FailureType::RateLimited, ApiError::RateLimited { retry_after }) => {
                retry_after.unwrap_or(self.rate_limit_delay)
            }
            (FailureType::RateLimited, _) => self.rate_limit_delay,
            (FailureType::Network, _) => Duration::ZERO,
            _ => self.calculate_delay(attempt),
        };

        debug!(
            attempt,
            next_attempt = attempt + 1,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            ?failure,
            "will retry"
        );

        RetryDecision::Retry {
            delay,
            attempt: attempt + 1,
        }
    }

    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    fn calculate_delay(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as f64;
        let exponent = f64::from(attempt.saturating_sub(1));
        let delay_ms = base_ms * f64::from(self.backoff_multiplier).powf(exponent);
        let capped_ms = delay_ms.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped_ms as u64) + calculate_jitter()
    }
}

fn calculate_jitter() -> Duration {
    let max_ms = u64::try_from(MAX_JITTER.as_millis()).unwrap_or(500);
    Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
}

/// Classifies an API error for retry decisions.
#[must_use]
pub fn classify_error(error: &ApiError) -> FailureType {
    match error {
        ApiError::RateLimited { .. } => FailureType::RateLimited,
        ApiError::ServerError { .. } | ApiError::ClientError { status: 408, .. } => {
            FailureType::Transient
        }
        ApiError::Network { .. } => FailureType::Network,
        ApiError::Unauthorized { .. } => FailureType::NeedsAuth,
        ApiError::ClientError { .. }
        | ApiError::NotARecipe { .. }
        | ApiError::InvalidResponse { .. } => FailureType::Permanent,
    }
}

/// Result of a [`Sleeper::sleep`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepOutcome {
    /// The full duration elapsed.
    Completed,
    /// The operator asked to stop; the sleep ended early.
    Interrupted,
}

/// Source of waiting, injectable so tests never sleep for real.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration) -> SleepOutcome;

    /// Whether an interrupt has been requested, without sleeping.
    fn is_interrupted(&self) -> bool {
        false
    }
}

/// Real sleeper that wakes early once the shared interrupt flag is set.
#[derive(Debug, Clone, Default)]
pub struct TokioSleeper {
    interrupt: Arc<AtomicBool>,
}

impl TokioSleeper {
    #[must_use]
    pub fn new(interrupt: Arc<AtomicBool>) -> Self {
        Self { interrupt }
    }
}

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) -> SleepOutcome {
        let deadline = tokio::time::Instant::now() + duration;
        loop {
            if self.interrupt.load(Ordering::SeqCst) {
                return SleepOutcome::Interrupted;
            }
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return SleepOutcome::Completed;
            }
            tokio::time::sleep(remaining.min(INTERRUPT_POLL_SLICE)).await;
        }
    }

    fn is_interrupted(&self) -> bool {
        self.interrupt.load(Ordering::SeqCst)
    }
}

/// What happened while driving one operation through [`run_with_retry`].
#[derive(Debug)]
pub struct RetryOutcome<T> {
    /// Final result; on failure the last error seen.
    pub result: Result<T, ApiError>,
    /// Calls made, including the first.
    pub attempts: u32,
    /// 429 answers received.
    pub rate_limit_hits: u32,
    /// Sleeps taken before retrying.
    pub backoff_sleeps: u32,
    /// A backoff sleep was cut short by an interrupt.
    pub interrupted: bool,
}

impl<T> RetryOutcome<T> {
    /// Whether any call in this operation was rate-limited.
    #[must_use]
    pub fn was_rate_limited(&self) -> bool {
        self.rate_limit_hits > 0
    }
}

/// Calls `call` until it succeeds, the policy gives up, or a backoff is interrupted.
///
/// `operation` only labels log lines.
pub async fn run_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
    operation: &str,
    mut call: F,
) -> RetryOutcome<T>
where
    F: FnMut() -> Fut + Send,
    Fut: Future<Output = Result<T, ApiError>> + Send,
{
    let mut attempt = 1;
    let mut rate_limit_hits = 0;
    let mut backoff_sleeps = 0;
    let mut network_retries = 0;

    loop {
        let error = match call().await {
            Ok(value) => {
                return RetryOutcome {
                    result: Ok(value),
                    attempts: attempt,
                    rate_limit_hits,
                    backoff_sleeps,
                    interrupted: false,
                };
            }
            Err(error) => error,
        };

        if error.is_rate_limited() {
            rate_limit_hits += 1;
        }

        match policy.should_retry(&error, attempt, network_retries) {
            RetryDecision::DoNotRetry { reason } => {
                debug!(operation, attempt, %error, reason, "giving up");
                return RetryOutcome {
                    result: Err(error),
                    attempts: attempt,
                    rate_limit_hits,
                    backoff_sleeps,
                    interrupted: false,
                };
            }
            RetryDecision::Retry {
                delay,
                attempt: next,
            } => {
                if classify_error(&error) == FailureType::Network {
                    network_retries += 1;
                    debug!(operation, attempt, %error, "retrying network failure immediately");
                } else {
                    backoff_sleeps += 1;
                    info!(
                        operation,
                        attempt,
                        delay_secs = delay.as_secs(),
                        %error,
                        "backing off before retry"
                    );
                    if sleeper.sleep(delay).await == SleepOutcome::Interrupted {
                        return RetryOutcome {
                            result: Err(error),
                            attempts: attempt,
                            rate_limit_hits,
                            backoff_sleeps,
                            interrupted: true,
                        };
                    }
                }
                attempt = next;
            }
        }
    }
}
