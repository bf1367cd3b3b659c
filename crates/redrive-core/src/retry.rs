//! Retry policy: decides backoff delays.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use crate::ports::JitterSource;

/// Exponent beyond which every sane policy is already at `max_delay`
/// (2^64 overflows any millisecond budget).
const MAX_EXPONENT: u32 = 64;

/// Retry policy for failed messages.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Delay after the first failure.
    pub base_delay: Duration,

    /// Upper bound before jitter.
    pub max_delay: Duration,

    /// Backoff multiplier for exponential backoff.
    pub multiplier: f64,

    /// Jitter added on top, as a fraction of the capped delay. 0 disables it.
    pub jitter_fraction: f64,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PolicyError {
    #[error("base_delay must be positive")]
    ZeroBaseDelay,
    #[error("max_delay ({max:?}) must be >= base_delay ({base:?})")]
    MaxBelowBase { base: Duration, max: Duration },
    #[error("multiplier must be a finite number >= 1, got {0}")]
    BadMultiplier(f64),
    #[error("jitter_fraction must be within [0, 1], got {0}")]
    BadJitter(f64),
}

impl Default for RetryPolicy {
    /// 1s base, 5min cap, x2, 10% jitter.
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1_000),
            max_delay: Duration::from_millis(300_000),
            multiplier: 2.0,
            jitter_fraction: 0.10,
        }
    }
}

impl RetryPolicy {
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.base_delay.is_zero() {
            return Err(PolicyError::ZeroBaseDelay);
        }
        if self.max_delay < self.base_delay {
            return Err(PolicyError::MaxBelowBase {
                base: self.base_delay,
                max: self.max_delay,
            });
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(PolicyError::BadMultiplier(self.multiplier));
        }
        if !(0.0..=1.0).contains(&self.jitter_fraction) {
            return Err(PolicyError::BadJitter(self.jitter_fraction));
        }
        Ok(())
    }

    /// Capped delay before jitter.
    ///
    /// `attempt` is 1-indexed; 0 is treated as 1.
    /// delay = min(base_delay * multiplier^(attempt - 1), max_delay)
    ///
    /// Example with base=1s, multiplier=2.0, max=300s:
    /// - attempt 1: 1s
    /// - attempt 2: 2s
    /// - attempt 9: 256s
    /// - attempt 10+: 300s
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(MAX_EXPONENT);
        let max_ms = self.max_delay.as_secs_f64() * 1_000.0;
        let raw_ms = self.base_delay.as_secs_f64() * 1_000.0 * self.multiplier.powi(exponent as i32);
        if !raw_ms.is_finite() || raw_ms >= max_ms {
            return self.max_delay;
        }
        Duration::from_secs_f64(raw_ms / 1_000.0)
    }

    /// Backoff delay plus `uniform[0, delay * jitter_fraction)`.
    pub fn jittered_delay(&self, attempt: u32, jitter: &dyn JitterSource) -> Duration {
        let delay = self.backoff_delay(attempt);
        if self.jitter_fraction <= 0.0 {
            return delay;
        }
        let extra = delay.as_secs_f64() * self.jitter_fraction * jitter.sample();
        delay + Duration::from_secs_f64(extra.max(0.0))
    }

    /// Instant of the next retry after failure number `attempt`.
    pub fn next_retry_time(
        &self,
        attempt: u32,
        now: DateTime<Utc>,
        jitter: &dyn JitterSource,
    ) -> DateTime<Utc> {
        now + to_time_delta(self.jittered_delay(attempt, jitter))
    }
}

/// Microsecond precision; i64 micros cover ~292k years so this never truncates
/// a validated policy.
pub(crate) fn to_time_delta(d: Duration) -> TimeDelta {
    TimeDelta::microseconds(d.as_micros().min(i64::MAX as u128) as i64)
}
