//! Retry policy and request pacing shared by every HTTP surface.

use anyhow::Result;
use rand::RngExt;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Status codes that are worth another attempt.
pub const RETRY_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

/// Bounded retry with exponential backoff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after the first one.
    pub max_retries: u32,
    /// Backoff base; attempt `n` waits `factor * 2^(n-1)`.
    pub backoff_factor_ms: u64,
    /// Upper bound for a single backoff.
    pub max_backoff_ms: u64,
    /// Responses with these statuses are retried.
    pub retry_statuses: Vec<u16>,
    /// Replaces the exponential backoff with a jittered pause when set.
    pub pause: Option<Pacing>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_factor_ms: 1000,
            max_backoff_ms: 30_000,
            retry_statuses: RETRY_STATUSES.to_vec(),
            pause: None,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy with the default status list.
    pub fn new(max_retries: u32, backoff_factor_ms: u64) -> Self {
        Self { max_retries, backoff_factor_ms, ..Self::default() }
    }

    /// Retries with the same jittered pause before every attempt.
    pub fn paced(max_retries: u32, pause: Pacing) -> Self {
        Self { max_retries, backoff_factor_ms: 0, pause: Some(pause), ..Self::default() }
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        Self::new(0, 0)
    }

    /// Delay before attempt `attempt` (0 is the first try and never waits).
    pub fn backoff(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        if let Some(pause) = self.pause {
            return pause.sample();
        }
        if self.backoff_factor_ms == 0 {
            return Duration::ZERO;
        }
        let exp = 2u64.saturating_pow((attempt - 1).min(20));
        let delay = self.backoff_factor_ms.saturating_mul(exp).min(self.max_backoff_ms);
        Duration::from_millis(delay)
    }

    /// Returns true if a response with this status should be retried.
    pub fn should_retry(&self, status: u16) -> bool {
        self.retry_statuses.contains(&status)
    }

    /// Total number of attempts, including the first.
    pub fn attempts(&self) -> u32 {
        self.max_retries + 1
    }
}

/// Runs `op` until it succeeds or the policy is exhausted.
///
/// The closure receives the zero-based attempt number. The last error is
/// returned unchanged.
pub async fn retry_async<T, E, F, Fut>(policy: &RetryPolicy, label: &str, op: F) -> Result<T, E>
where
    E: Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    retry_async_when(policy, label, |_| true, op).await
}

/// Like [`retry_async`], but errors rejected by `retryable` end the loop at once.
pub async fn retry_async_when<T, E, R, F, Fut>(policy: &RetryPolicy, label: &str, retryable: R, mut op: F) -> Result<T, E>
where
    E: Display,
    R: Fn(&E) -> bool,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0;
    loop {
        let wait = policy.backoff(attempt);
        if !wait.is_zero() {
            debug!("{}: backing off {}ms before attempt {}", label, wait.as_millis(), attempt + 1);
            tokio::time::sleep(wait).await;
        }

        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < policy.max_retries && retryable(&e) => {
                warn!("{} failed (attempt {}/{}): {:#}", label, attempt + 1, policy.attempts(), e);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// A base delay plus uniform random jitter, used to space out requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pacing {
    pub base_ms: u64,
    pub jitter_ms: u64,
}

impl Pacing {
    pub fn new(base_ms: u64, jitter_ms: u64) -> Self {
        Self { base_ms, jitter_ms }
    }

    /// No waiting at all.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_none(&self) -> bool {
        self.base_ms == 0 && self.jitter_ms == 0
    }

    /// Draws one delay.
    pub fn sample(&self) -> Duration {
        let jitter = if self.jitter_ms > 0 {
            rand::rng().random_range(0..=self.jitter_ms)
        } else {
            0
        };
        Duration::from_millis(self.base_ms + jitter)
    }

    /// Sleeps for one sampled delay.
    pub async fn wait(&self) {
        if self.is_none() {
            return;
        }
        let delay = self.sample();
        debug!("Delaying {}ms", delay.as_millis());
        tokio::time::sleep(delay).await;
    }
}
