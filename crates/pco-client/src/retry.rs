//! Retry eligibility and backoff delays.

use std::time::Duration;

use crate::error::FailureClass;

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Whether failed requests are retried at all.
    pub enabled: bool,
    /// Maximum number of retries after the first attempt.
    pub max_retries: u32,
    /// Delay unit the backoff strategy scales.
    pub base_delay: Duration,
    /// Upper bound for any computed delay.
    pub max_delay: Duration,
    /// Backoff strategy to use.
    pub backoff: BackoffStrategy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(30),
            backoff: BackoffStrategy::Exponential,
        }
    }
}

impl RetryConfig {
    /// Set the maximum number of retries.
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set the base delay.
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Set the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the backoff strategy.
    pub fn with_backoff(mut self, backoff: BackoffStrategy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Disable retries.
    pub fn no_retry() -> Self {
        Self {
            enabled: false,
            max_retries: 0,
            ..Default::default()
        }
    }
}

/// Backoff strategy for determining retry delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackoffStrategy {
    /// `base * n`
    Linear,
    /// `base * 2^(n-1)`
    #[default]
    Exponential,
}

impl BackoffStrategy {
    /// Delay before retry number `attempt` (1-based), capped at `max_delay`.
    pub fn delay(&self, attempt: u32, base_delay: Duration, max_delay: Duration) -> Duration {
        let attempt = attempt.max(1);
        let delay = match self {
            BackoffStrategy::Linear => base_delay.checked_mul(attempt),
            BackoffStrategy::Exponential => 2u32
                .checked_pow(attempt - 1)
                .and_then(|factor| base_delay.checked_mul(factor)),
        };

        delay.map_or(max_delay, |d| d.min(max_delay))
    }
}

/// Stateless retry decisions for one client.
#[derive(Debug, Clone)]
pub struct RetryScheduler {
    config: RetryConfig,
}

impl RetryScheduler {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Whether retry number `attempt` (1-based) may be made for a failure
    /// of the given class.
    pub fn should_retry(&self, attempt: u32, class: FailureClass) -> bool {
        self.config.enabled && attempt <= self.config.max_retries && class.is_retryable()
    }

    /// Scheduler delay before retry number `attempt`.
    pub fn delay(&self, attempt: u32) -> Duration {
        self.config
            .backoff
            .delay(attempt, self.config.base_delay, self.config.max_delay)
    }

    /// The actual wait: the larger of the scheduler delay and any server hint.
    pub fn wait_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let delay = self.delay(attempt);
        retry_after.map_or(delay, |hint| hint.max(delay))
    }
}
