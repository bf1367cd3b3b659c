//! JitterSource port - retry 遅延に混ぜる乱数の抽象化
//!
//! 本番は `RandomJitter`、テストは `FixedJitter` で決定的にする。

use rand::Rng;

/// Supplies a uniform sample in `[0, 1)`.
pub trait JitterSource: Send + Sync {
    fn sample(&self) -> f64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RandomJitter;

impl JitterSource for RandomJitter {
    fn sample(&self) -> f64 {
        rand::thread_rng().gen_range(0.0..1.0)
    }
}

/// Always returns the same sample (clamped into `[0, 1)`).
#[derive(Debug, Clone, Copy)]
pub struct FixedJitter(f64);

impl FixedJitter {
    pub fn new(sample: f64) -> Self {
        let clamped = if sample.is_finite() {
            sample.clamp(0.0, 1.0 - f64::EPSILON)
        } else {
            0.0
        };
        Self(clamped)
    }

    pub fn zero() -> Self {
        Self(0.0)
    }
}

impl JitterSource for FixedJitter {
    fn sample(&self) -> f64 {
        self.0
    }
}
