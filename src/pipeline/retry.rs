use chrono::{DateTime, Utc};
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::error::{Result, ScrapingError};

/// Exponential backoff: `multiplier * 2^(attempt - 1)` seconds clamped to
/// `[min_delay, max_delay]`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub multiplier: f64,
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            multiplier: 1.0,
            min_delay: Duration::from_secs(4),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after `attempt` (1-based) has failed.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(62) as i32;
        let seconds = self.multiplier * 2f64.powi(exponent);
        let min = self.min_delay.as_secs_f64();
        let max = self.max_delay.as_secs_f64().max(min);
        let clamped = if seconds.is_finite() { seconds.max(min).min(max) } else { max };
        Duration::from_secs_f64(clamped)
    }
}

/// One try of a retried operation.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptRecord {
    pub attempt: u32,
    pub at: DateTime<Utc>,
    /// `None` when the attempt succeeded.
    pub error: Option<String>,
}

#[derive(Debug)]
pub enum RetryOutcome<T> {
    Success {
        value: T,
        attempts: Vec<AttemptRecord>,
    },
    /// The attempt budget ran out, or the last error was not worth retrying.
    Exhausted {
        error: ScrapingError,
        attempts: Vec<AttemptRecord>,
    },
}

impl<T> RetryOutcome<T> {
    pub fn attempts(&self) -> &[AttemptRecord] {
        match self {
            RetryOutcome::Success { attempts, .. } | RetryOutcome::Exhausted { attempts, .. } => attempts,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RetryOutcome::Success { .. })
    }

    pub fn into_result(self) -> Result<T> {
        match self {
            RetryOutcome::Success { value, .. } => Ok(value),
            RetryOutcome::Exhausted { error, .. } => Err(error),
        }
    }
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// `policy.max_attempts` is used up. The operation receives the 1-based
/// attempt number.
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, clock: &dyn Clock, label: &str, mut operation: F) -> RetryOutcome<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempts = Vec::with_capacity(max_attempts as usize);
    let mut attempt = 0;

    loop {
        attempt += 1;
        info!(attempt, max_attempts, "Attempt {}/{} of {}", attempt, max_attempts, label);

        match operation(attempt).await {
            Ok(value) => {
                attempts.push(AttemptRecord {
                    attempt,
                    at: Utc::now(),
                    error: None,
                });
                if attempt > 1 {
                    info!("{} succeeded after {} attempts", label, attempt);
                }
                return RetryOutcome::Success { value, attempts };
            }
            Err(error) => {
                attempts.push(AttemptRecord {
                    attempt,
                    at: Utc::now(),
                    error: Some(error.to_string()),
                });

                if !error.is_retryable() || attempt >= max_attempts {
                    warn!("Giving up on {} after {} attempts: {}", label, attempt, error);
                    return RetryOutcome::Exhausted { error, attempts };
                }

                let delay = policy.delay_after(attempt);
                warn!("{} failed on attempt {}: {}. Retrying in {:?}", label, attempt, error, delay);
                clock.sleep(delay).await;
            }
        }
    }
}
