//! Retry policy with exponential backoff and jitter.

use std::time::Duration;

use rand::Rng;

use crate::error::OutboxError;

/// Default attempt budget per operation.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Backoff exponent cap; keeps the shift well inside `u32`.
const MAX_EXPONENT: u32 = 16;

/// How many times an operation is tried and how long to wait in between.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    jitter_factor: f64,
}

impl RetryPolicy {
    /// Create a policy.
    ///
    /// # Errors
    ///
    /// Returns a config error if `max_attempts` is zero or `base_delay`
    /// exceeds `max_delay`.
    pub fn new(
        max_attempts: u32,
        base_delay: Duration,
        max_delay: Duration,
    ) -> Result<Self, OutboxError> {
        if max_attempts == 0 {
            return Err(OutboxError::Config(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if base_delay > max_delay {
            return Err(OutboxError::Config(format!(
                "base delay ({base_delay:?}) exceeds max delay ({max_delay:?})"
            )));
        }

        Ok(Self {
            max_attempts,
            base_delay,
            max_delay,
            jitter_factor: 0.3,
        })
    }

    /// Set the jitter factor, clamped to `0.0..=1.0`.
    #[must_use]
    pub fn with_jitter_factor(mut self, factor: f64) -> Self {
        self.jitter_factor = factor.clamp(0.0, 1.0);
        self
    }

    /// Attempt budget.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Whether an operation that has been tried `attempts` times gets
    /// another go.
    #[must_use]
    pub const fn should_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }

    /// Delay before the next dispatch after `attempts` failures.
    ///
    /// `base * 2^(attempts - 1)`, capped at the max delay, with a random
    /// spread of `±jitter/2` around that value.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn delay_for(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(MAX_EXPONENT);
        let delay = self
            .base_delay
            .saturating_mul(1 << exponent)
            .min(self.max_delay);

        if self.jitter_factor <= 0.0 {
            return delay;
        }

        let millis = delay.as_millis() as f64;
        let range = millis * self.jitter_factor;
        let jitter = rand::thread_rng().gen_range(-range / 2.0..=range / 2.0);
        let jittered = (millis + jitter).max(0.0);

        Duration::from_millis(jittered as u64)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            jitter_factor: 0.3,
        }
    }
}
