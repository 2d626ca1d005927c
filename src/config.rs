use std::time::Duration;

use super::error::ConfigError;

/// A `CircuitBreaker`'s configuration.
///
/// The snapshot is captured when the breaker is built and never changes afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Absolute number of failures in the rolling window that trips the breaker.
    pub failure_threshold: u32,
    /// Failure percentage (0-100) in the rolling window that trips the breaker.
    pub failure_threshold_percent: f64,
    /// Minimum number of outcomes in the rolling window before a trip is considered.
    pub volume_threshold: u32,
    /// Successes required in the half open state to close the breaker.
    pub success_threshold: u32,
    /// How long the breaker stays open before probing.
    pub open_timeout: Duration,
    /// Upper bound for a single call. `None` disables the timeout race.
    pub response_timeout: Option<Duration>,
    /// Delay after closing from half open before the rolling window is cleared.
    pub reset_timeout: Duration,
    /// Time span covered by the rolling window.
    pub rolling_window: Duration,
    /// Number of buckets the rolling window is split into. Must be in range [2;10].
    pub window_buckets: u8,
    /// A disabled breaker invokes the operation directly.
    pub enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            failure_threshold: 5,
            failure_threshold_percent: 50.0,
            volume_threshold: 10,
            success_threshold: 2,
            open_timeout: Duration::from_secs(30),
            response_timeout: Some(Duration::from_secs(10)),
            reset_timeout: Duration::from_secs(60),
            rolling_window: Duration::from_secs(10),
            window_buckets: 10,
            enabled: true,
        }
    }
}

impl Config {
    /// Checks every field is within its allowed range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        at_least("failure_threshold", self.failure_threshold, 1)?;
        at_least("volume_threshold", self.volume_threshold, 1)?;
        at_least("success_threshold", self.success_threshold, 1)?;

        if !(0.0..=100.0).contains(&self.failure_threshold_percent) {
            return Err(ConfigError::OutOfRange {
                field: "failure_threshold_percent",
                min: 0.0,
                max: 100.0,
                value: self.failure_threshold_percent,
            });
        }

        if !(2..=10).contains(&self.window_buckets) {
            return Err(ConfigError::OutOfRange {
                field: "window_buckets",
                min: 2.0,
                max: 10.0,
                value: f64::from(self.window_buckets),
            });
        }

        let min_window = Duration::from_millis(u64::from(self.window_buckets));
        if self.rolling_window < min_window {
            return Err(ConfigError::TooSmall {
                field: "rolling_window_ms",
                min: min_window.as_millis() as f64,
                value: self.rolling_window.as_millis() as f64,
            });
        }

        if self.response_timeout == Some(Duration::ZERO) {
            return Err(ConfigError::TooSmall {
                field: "response_timeout_ms",
                min: 1.0,
                value: 0.0,
            });
        }

        Ok(())
    }
}

/// Partial configuration merged over a factory's defaults.
///
/// Every `None` field keeps the default's value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigOverrides {
    /// Overrides `Config::failure_threshold`.
    pub failure_threshold: Option<u32>,
    /// Overrides `Config::failure_threshold_percent`.
    pub failure_threshold_percent: Option<f64>,
    /// Overrides `Config::volume_threshold`.
    pub volume_threshold: Option<u32>,
    /// Overrides `Config::success_threshold`.
    pub success_threshold: Option<u32>,
    /// Overrides `Config::open_timeout`.
    pub open_timeout: Option<Duration>,
    /// Overrides `Config::response_timeout`; `Some(None)` disables the timeout.
    pub response_timeout: Option<Option<Duration>>,
    /// Overrides `Config::reset_timeout`.
    pub reset_timeout: Option<Duration>,
    /// Overrides `Config::rolling_window`.
    pub rolling_window: Option<Duration>,
    /// Overrides `Config::window_buckets`.
    pub window_buckets: Option<u8>,
    /// Overrides `Config::enabled`.
    pub enabled: Option<bool>,
}

impl ConfigOverrides {
    /// Produces a full configuration with these overrides applied over `base`.
    pub fn merge(&self, base: &Config) -> Config {
        Config {
            failure_threshold: self.failure_threshold.unwrap_or(base.failure_threshold),
            failure_threshold_percent: self
                .failure_threshold_percent
                .unwrap_or(base.failure_threshold_percent),
            volume_threshold: self.volume_threshold.unwrap_or(base.volume_threshold),
            success_threshold: self.success_threshold.unwrap_or(base.success_threshold),
            open_timeout: self.open_timeout.unwrap_or(base.open_timeout),
            response_timeout: self.response_timeout.unwrap_or(base.response_timeout),
            reset_timeout: self.reset_timeout.unwrap_or(base.reset_timeout),
            rolling_window: self.rolling_window.unwrap_or(base.rolling_window),
            window_buckets: self.window_buckets.unwrap_or(base.window_buckets),
            enabled: self.enabled.unwrap_or(base.enabled),
        }
    }
}

/// A `RetryPolicy`'s configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Retries after the first attempt; at most `max_retries + 1` attempts are made.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound for the computed backoff.
    pub max_delay: Duration,
    /// Growth factor between consecutive delays.
    pub multiplier: f64,
    /// Widens every delay by up to 30% at random.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Checks every field is within its allowed range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(ConfigError::TooSmall {
                field: "multiplier",
                min: 1.0,
                value: self.multiplier,
            });
        }
        if self.initial_delay > self.max_delay {
            return Err(ConfigError::Exceeds {
                field: "initial_delay",
                value: self.initial_delay,
                limit_field: "max_delay",
                limit: self.max_delay,
            });
        }
        Ok(())
    }
}

/// A `Bulkhead`'s configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkheadConfig {
    /// Maximum number of calls in flight.
    pub max_concurrent: usize,
    /// Maximum number of callers waiting for a slot. Zero disables queueing.
    pub max_queue_size: usize,
}

impl Default for BulkheadConfig {
    fn default() -> Self {
        BulkheadConfig {
            max_concurrent: 10,
            max_queue_size: 10,
        }
    }
}

impl BulkheadConfig {
    /// Checks every field is within its allowed range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent == 0 {
            return Err(ConfigError::TooSmall {
                field: "max_concurrent",
                min: 1.0,
                value: 0.0,
            });
        }
        Ok(())
    }
}

fn at_least(field: &'static str, value: u32, min: u32) -> Result<(), ConfigError> {
    if value < min {
        return Err(ConfigError::TooSmall {
            field,
            min: f64::from(min),
            value: f64::from(value),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(Ok(()), Config::default().validate());
        assert_eq!(Ok(()), RetryConfig::default().validate());
        assert_eq!(Ok(()), BulkheadConfig::default().validate());
    }

    #[test]
    fn rejects_zero_thresholds() {
        let config = Config {
            volume_threshold: 0,
            ..Default::default()
        };
        match config.validate() {
            Err(ConfigError::TooSmall { field, .. }) => assert_eq!("volume_threshold", field),
            x => unreachable!("{:?}", x),
        }
    }

    #[test]
    fn rejects_percent_out_of_range() {
        let config = Config {
            failure_threshold_percent: 101.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_bucket_count_out_of_range() {
        for buckets in [0u8, 1, 11] {
            let config = Config {
                window_buckets: buckets,
                ..Default::default()
            };
            assert!(config.validate().is_err(), "buckets={}", buckets);
        }
    }

    #[test]
    fn overrides_merge_over_base() {
        let base = Config::default();
        let overrides = ConfigOverrides {
            failure_threshold: Some(1),
            response_timeout: Some(None),
            ..Default::default()
        };

        let merged = overrides.merge(&base);
        assert_eq!(1, merged.failure_threshold);
        assert_eq!(None, merged.response_timeout);
        assert_eq!(base.open_timeout, merged.open_timeout);
        assert_eq!(base.volume_threshold, merged.volume_threshold);
    }

    #[test]
    fn retry_rejects_shrinking_multiplier() {
        let config = RetryConfig {
            multiplier: 0.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = RetryConfig {
            initial_delay: Duration::from_secs(20),
            max_delay: Duration::from_secs(1),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn bulkhead_requires_a_slot() {
        let config = BulkheadConfig {
            max_concurrent: 0,
            max_queue_size: 5,
        };
        assert!(config.validate().is_err());
    }
}
