use rand::Rng;
use std::time::Duration;

use crate::config::RetryConfig;

/// Decision returned by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Give up; the failure is final.
    NoRetry,
    /// Retry after the given delay.
    RetryAfter(Duration),
}

/// Exponential backoff with jitter and an optional attempt ceiling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Maximum consecutive failures before giving up. `None` retries forever.
    pub max_attempts: Option<u32>,
    /// Delay after the first failure.
    pub base_delay: Duration,
    /// Upper bound on backoff delay.
    pub max_delay: Duration,
    /// Symmetric random spread as a fraction of the delay (0.2 = +/-20%).
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: Some(12),
            base_delay: Duration::from_millis(1500),
            max_delay: Duration::from_secs(60),
            jitter: 0.2,
        }
    }
}

/// Out-of-range values (negative, NaN or infinite) fall back to the defaults.
impl From<&RetryConfig> for RetryPolicy {
    fn from(cfg: &RetryConfig) -> Self {
        let defaults = Self::default();
        Self {
            max_attempts: cfg.max_attempts,
            base_delay: Duration::try_from_secs_f64(cfg.base_delay_secs)
                .unwrap_or(defaults.base_delay),
            max_delay: Duration::from_secs(cfg.max_delay_secs),
            jitter: if cfg.jitter.is_nan() {
                defaults.jitter
            } else {
                cfg.jitter.clamp(0.0, 1.0)
            },
        }
    }
}

impl RetryPolicy {
    /// Retry forever with a constant delay and no jitter.
    pub fn fixed(delay: Duration) -> Self {
        Self {
            max_attempts: None,
            base_delay: delay,
            max_delay: delay,
            jitter: 0.0,
        }
    }

    /// Decide what to do after `failures` consecutive failures (1-based).
    pub fn decide(&self, failures: u32) -> RetryDecision {
        if let Some(max) = self.max_attempts {
            if failures >= max {
                return RetryDecision::NoRetry;
            }
        }
        // base * 2^(failures-1), capped.
        let exp = 1u32 << failures.saturating_sub(1).min(16);
        let raw = self.base_delay.saturating_mul(exp).min(self.max_delay);
        RetryDecision::RetryAfter(self.apply_jitter(raw))
    }

    fn apply_jitter(&self, delay: Duration) -> Duration {
        if self.jitter <= 0.0 || delay.is_zero() {
            return delay;
        }
        let spread = self.jitter.min(1.0);
        let factor = rand::thread_rng().gen_range((1.0 - spread)..=(1.0 + spread));
        Duration::try_from_secs_f64(delay.as_secs_f64() * factor)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }
}
