//! Retry policy with exponential backoff and jitter.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts (not including the initial attempt).
    pub max_retries: u32,

    /// Delay before the first retry (milliseconds).
    pub initial_delay_ms: u64,

    /// Upper bound for any single delay (milliseconds).
    pub max_delay_ms: u64,

    /// Base for exponential backoff (2.0 doubles the delay on every attempt).
    pub exponential_base: f64,

    /// Jitter factor (0.0 to 1.0) applied symmetrically around the computed delay.
    pub jitter_factor: f64,

    /// Whether to honour `Retry-After` hints on throttled responses.
    pub respect_retry_after: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 1_000,
            max_delay_ms: 10_000,
            exponential_base: 2.0,
            jitter_factor: 0.1,
            respect_retry_after: true,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self::new(0)
    }

    /// Total attempts a retryable call may make.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Backoff before retry number `retry` (0 for the first retry).
    ///
    /// # Examples
    ///
    /// ```
    /// use esim_gateway::resilience::RetryPolicy;
    ///
    /// let policy = RetryPolicy { jitter_factor: 0.0, ..RetryPolicy::default() };
    /// assert_eq!(policy.backoff_delay(0).as_millis(), 1_000);
    /// assert_eq!(policy.backoff_delay(2).as_millis(), 4_000);
    /// assert_eq!(policy.backoff_delay(10).as_millis(), 10_000);
    /// ```
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        let exponent = retry.min(i32::MAX as u32) as i32;
        let base_delay = self.initial_delay_ms as f64 * self.exponential_base.powi(exponent);
        let capped_delay = base_delay.min(self.max_delay_ms as f64);

        let delay_with_jitter = if self.jitter_factor > 0.0 {
            let mut rng = rand::thread_rng();
            let jitter_range = capped_delay * self.jitter_factor.min(1.0);
            let jitter = rng.gen_range(-jitter_range..=jitter_range);
            (capped_delay + jitter).clamp(0.0, self.max_delay_ms as f64)
        } else {
            capped_delay
        };

        Duration::from_millis(delay_with_jitter as u64)
    }

    /// Delay before retry number `retry`, preferring a vendor hint when allowed.
    /// Hints are capped at `max_delay_ms`.
    pub fn delay_for(&self, retry: u32, retry_after: Option<Duration>) -> Duration {
        match retry_after {
            Some(hint) if self.respect_retry_after => {
                hint.min(Duration::from_millis(self.max_delay_ms))
            }
            _ => self.backoff_delay(retry),
        }
    }
}

/// Extracts the `Retry-After` header if present.
///
/// Both the delta-seconds form and the HTTP-date form are understood; dates in the
/// past yield a zero delay.
pub(crate) fn retry_after_from_headers(headers: &HashMap<String, String>) -> Option<Duration> {
    let value = headers
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("retry-after"))
        .map(|(_, value)| value.trim())?;

    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    let wait = (at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
    Some(wait)
}
