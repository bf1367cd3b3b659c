//! DlqConfig - エンジン設定
//!
//! 読み込み順（後勝ち）:
//! 1. 既定値（`Default` 実装）
//! 2. TOML ファイル（任意、無くてもよい）
//! 3. 環境変数 `REDRIVE__*`（例: `REDRIVE__RETRY__MAX_RETRIES=5`）

use std::time::Duration;

use chrono::TimeDelta;
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::retry::{PolicyError, RetryPolicy, to_time_delta};

pub const ENV_PREFIX: &str = "REDRIVE";
pub const DEFAULT_CONFIG_PATH: &str = "config/redrive";

/// Longest duration any setting may span (100 years), so that `now + value`
/// stays inside chrono's range.
pub const MAX_HORIZON_SECS: u64 = 100 * 365 * 24 * 60 * 60;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config source: {0}")]
    Source(#[from] config::ConfigError),

    #[error("retry policy: {0}")]
    Policy(#[from] PolicyError),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Backoff and budget defaults.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Applied when enqueue does not pass `max_retries`.
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    pub jitter_fraction: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 300_000,
            multiplier: 2.0,
            jitter_fraction: 0.10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DlqConfig {
    pub retry: RetryConfig,

    /// Applied when enqueue does not pass `expires_at`. 7 days.
    pub default_expiration_secs: u64,

    /// Upper bound for every list query.
    pub list_limit_cap: usize,

    /// Candidates examined per `sweep_expired` call.
    pub sweep_batch_size: usize,

    /// Processor calls running longer than this count as failed attempts.
    pub processor_timeout_ms: Option<u64>,

    /// A PROCESSING claim older than this is considered abandoned.
    pub stale_claim_after_secs: u64,
}

impl Default for DlqConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            default_expiration_secs: 7 * 24 * 60 * 60,
            list_limit_cap: 1_000,
            sweep_batch_size: 1_000,
            processor_timeout_ms: None,
            stale_claim_after_secs: 600,
        }
    }
}

impl DlqConfig {
    /// Load from an optional TOML file and `REDRIVE__*` environment overrides.
    ///
    /// `path` is passed to `config::File::with_name`, so the extension may be
    /// omitted. A missing file is not an error.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let path = path.unwrap_or(DEFAULT_CONFIG_PATH);
        let loaded: Self = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?
            .try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.retry_policy().validate()?;
        for (name, secs) in [
            ("retry.max_delay_ms", self.retry.max_delay_ms / 1_000),
            ("default_expiration_secs", self.default_expiration_secs),
            (
                "processor_timeout_ms",
                self.processor_timeout_ms.unwrap_or(0) / 1_000,
            ),
            ("stale_claim_after_secs", self.stale_claim_after_secs),
        ] {
            if secs > MAX_HORIZON_SECS {
                return Err(ConfigError::Invalid(format!(
                    "{name} exceeds {MAX_HORIZON_SECS}s"
                )));
            }
        }
        if self.default_expiration_secs == 0 {
            return Err(ConfigError::Invalid(
                "default_expiration_secs must be positive".to_string(),
            ));
        }
        if self.list_limit_cap == 0 {
            return Err(ConfigError::Invalid(
                "list_limit_cap must be positive".to_string(),
            ));
        }
        if self.sweep_batch_size == 0 {
            return Err(ConfigError::Invalid(
                "sweep_batch_size must be positive".to_string(),
            ));
        }
        if self.processor_timeout_ms == Some(0) {
            return Err(ConfigError::Invalid(
                "processor_timeout_ms must be positive when set".to_string(),
            ));
        }
        if self.stale_claim_after_secs == 0 {
            return Err(ConfigError::Invalid(
                "stale_claim_after_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_millis(self.retry.base_delay_ms),
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
            multiplier: self.retry.multiplier,
            jitter_fraction: self.retry.jitter_fraction,
        }
    }

    pub fn default_expiration(&self) -> TimeDelta {
        to_time_delta(Duration::from_secs(self.default_expiration_secs))
    }

    pub fn processor_timeout(&self) -> Option<Duration> {
        self.processor_timeout_ms.map(Duration::from_millis)
    }

    pub fn stale_claim_after(&self) -> TimeDelta {
        to_time_delta(Duration::from_secs(self.stale_claim_after_secs))
    }

    /// Clamp a caller-supplied limit to `[1, list_limit_cap]`.
    pub fn cap_limit(&self, limit: usize) -> usize {
        limit.clamp(1, self.list_limit_cap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Write;

    #[test]
    fn defaults_match_documented_values() {
        let config = DlqConfig::default();
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry_policy(), RetryPolicy::default());
        assert_eq!(config.default_expiration(), TimeDelta::days(7));
        assert_eq!(config.list_limit_cap, 1_000);
        assert_eq!(config.processor_timeout(), None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = DlqConfig::load(Some("definitely/not/here")).unwrap();
        assert_eq!(config, DlqConfig::default());
    }

    #[test]
    fn toml_file_overrides_defaults() {
        let dir = std::env::temp_dir().join(format!("redrive-config-{}", ulid::Ulid::new()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("redrive.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "list_limit_cap = 50\nprocessor_timeout_ms = 2500\n\n[retry]\nmax_retries = 5\nbase_delay_ms = 200"
        )
        .unwrap();

        let config = DlqConfig::load(path.to_str()).unwrap();
        assert_eq!(config.list_limit_cap, 50);
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.base_delay_ms, 200);
        assert_eq!(config.retry.max_delay_ms, 300_000);
        assert_eq!(config.processor_timeout(), Some(Duration::from_millis(2_500)));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[rstest]
    #[case(0, 1)]
    #[case(10, 10)]
    #[case(5_000, 1_000)]
    fn limits_are_capped(#[case] requested: usize, #[case] expected: usize) {
        assert_eq!(DlqConfig::default().cap_limit(requested), expected);
    }

    #[rstest]
    #[case::expiration(DlqConfig { default_expiration_secs: 10_000_000_000_000, ..DlqConfig::default() })]
    #[case::max_delay(DlqConfig {
        retry: RetryConfig { max_delay_ms: u64::MAX, ..RetryConfig::default() },
        ..DlqConfig::default()
    })]
    #[case::stale_claim(DlqConfig { stale_claim_after_secs: u64::MAX, ..DlqConfig::default() })]
    #[case::timeout(DlqConfig { processor_timeout_ms: Some(u64::MAX), ..DlqConfig::default() })]
    fn durations_beyond_horizon_are_rejected(#[case] config: DlqConfig) {
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn horizon_itself_is_accepted() {
        let config = DlqConfig {
            default_expiration_secs: MAX_HORIZON_SECS,
            retry: RetryConfig {
                max_delay_ms: MAX_HORIZON_SECS * 1_000,
                ..RetryConfig::default()
            },
            ..DlqConfig::default()
        };
        assert!(config.validate().is_ok());
        let now = chrono::Utc::now();
        assert!(now.checked_add_signed(config.default_expiration()).is_some());
        let policy = config.retry_policy();
        let at = policy.next_retry_time(500, now, &crate::ports::FixedJitter::new(1.0));
        assert!(at > now);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let zero_cap = DlqConfig {
            list_limit_cap: 0,
            ..DlqConfig::default()
        };
        assert!(matches!(zero_cap.validate(), Err(ConfigError::Invalid(_))));

        let bad_policy = DlqConfig {
            retry: RetryConfig {
                max_delay_ms: 10,
                ..RetryConfig::default()
            },
            ..DlqConfig::default()
        };
        assert!(matches!(bad_policy.validate(), Err(ConfigError::Policy(_))));
    }
}
