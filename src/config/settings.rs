//! Engine settings loaded from `config.toml`.
//!
//! Every section and field has a default, so a missing file or a partial file
//! yields a working configuration. The path can be overridden with `CONFIG_PATH`.

use crate::{
    entities::money::AMOUNT_SCALE,
    errors::{Error, Result},
};
use chrono::Duration as TermDuration;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::{path::Path, time::Duration};

/// Root of the configuration file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Product terms for newly purchased slots
    pub mining: MiningConfig,
    /// Settlement sweep scheduling and pacing
    pub sweeper: SweeperConfig,
    /// Read-through cache tuning
    pub cache: CacheConfig,
}

/// Product terms applied when a slot is purchased
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MiningConfig {
    /// Length of a slot's term in days
    pub term_days: i64,
    /// Yield over the full term as a fraction
    pub weekly_rate: Decimal,
    /// Smallest principal accepted for a purchase
    pub minimum_investment: Decimal,
    /// Fraction of the principal credited to the referrer on purchase
    pub referral_rate: Decimal,
    /// Whether settlement also returns the principal to the principal wallet
    pub return_principal: bool,
}

impl Default for MiningConfig {
    fn default() -> Self {
        Self {
            term_days: 7,
            weekly_rate: Decimal::new(30, 2),
            minimum_investment: Decimal::new(10, 0),
            referral_rate: Decimal::new(5, 2),
            return_principal: false,
        }
    }
}

impl MiningConfig {
    /// Term as a duration
    #[must_use]
    pub fn term(&self) -> TermDuration {
        TermDuration::days(self.term_days)
    }
}

/// Settlement sweep scheduling and pacing
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SweeperConfig {
    /// Seconds between scheduled sweeps
    pub interval_secs: u64,
    /// Due slots loaded per batch
    pub batch_size: u64,
    /// User groups settled concurrently within a batch
    pub worker_concurrency: usize,
    /// Pause between batches in milliseconds
    pub batch_pause_ms: u64,
    /// After this many seconds no new batch is started
    pub max_sweep_duration_secs: u64,
    /// Attempts per user group before deferring to the next sweep
    pub retry_attempts: usize,
    /// Fixed delay between attempts in milliseconds
    pub retry_delay_ms: u64,
    /// Upper bound on a single post-settlement notification
    pub notify_timeout_ms: u64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            batch_size: 100,
            worker_concurrency: 4,
            batch_pause_ms: 100,
            max_sweep_duration_secs: 50,
            retry_attempts: 3,
            retry_delay_ms: 200,
            notify_timeout_ms: 2_000,
        }
    }
}

impl SweeperConfig {
    /// Time between scheduled sweeps
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Pause inserted between batches
    #[must_use]
    pub const fn batch_pause(&self) -> Duration {
        Duration::from_millis(self.batch_pause_ms)
    }

    /// Wall-clock cap for one sweep
    #[must_use]
    pub const fn max_sweep_duration(&self) -> Duration {
        Duration::from_secs(self.max_sweep_duration_secs)
    }

    /// Delay between retry attempts
    #[must_use]
    pub const fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Upper bound on a single notification call
    #[must_use]
    pub const fn notify_timeout(&self) -> Duration {
        Duration::from_millis(self.notify_timeout_ms)
    }
}

/// Read-through cache tuning
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Seconds a computed state snapshot stays fresh
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_secs: 5 }
    }
}

impl CacheConfig {
    /// Snapshot time-to-live
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl EngineConfig {
    /// Rejects values that would make the engine misbehave at runtime.
    pub fn validate(&self) -> Result<()> {
        if self.mining.term_days <= 0 {
            return Err(Error::Config {
                message: format!("mining.term_days must be positive, got {}", self.mining.term_days),
            });
        }
        if self.mining.weekly_rate.is_sign_negative() || self.mining.referral_rate.is_sign_negative()
        {
            return Err(Error::Config {
                message: "mining rates cannot be negative".to_string(),
            });
        }
        if self.mining.weekly_rate.normalize().scale() > AMOUNT_SCALE {
            return Err(Error::Config {
                message: format!(
                    "mining.weekly_rate has more than {AMOUNT_SCALE} decimal places: {}",
                    self.mining.weekly_rate
                ),
            });
        }
        if self.mining.minimum_investment <= Decimal::ZERO {
            return Err(Error::Config {
                message: "mining.minimum_investment must be positive".to_string(),
            });
        }
        if self.sweeper.interval_secs == 0 {
            return Err(Error::Config {
                message: "sweeper.interval_secs must be at least 1".to_string(),
            });
        }
        if self.sweeper.batch_size == 0 || self.sweeper.worker_concurrency == 0 {
            return Err(Error::Config {
                message: "sweeper.batch_size and sweeper.worker_concurrency must be at least 1"
                    .to_string(),
            });
        }
        Ok(())
    }
}

/// Loads and validates the engine configuration from a TOML file.
///
/// # Errors
/// Returns an error if the file cannot be read, the TOML is invalid, or a value
/// fails validation.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<EngineConfig> {
    let path_ref = path.as_ref();
    tracing::debug!("Loading engine configuration from {:?}", path_ref);
    let contents = std::fs::read_to_string(path_ref).map_err(|e| Error::Config {
        message: format!("Failed to read config file {path_ref:?}: {e}"),
    })?;

    let config: EngineConfig = toml::from_str(&contents).map_err(|e| Error::Config {
        message: format!("Failed to parse config file {path_ref:?}: {e}"),
    })?;
    config.validate()?;
    Ok(config)
}

/// Loads the configuration from `CONFIG_PATH` (default `./config.toml`),
/// falling back to defaults when the file does not exist.
pub fn load_default_config() -> Result<EngineConfig> {
    let path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
    if Path::new(&path).exists() {
        load_config(&path)
    } else {
        tracing::info!("No config file at {}, using defaults", path);
        Ok(EngineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_partial_config() {
        let toml_str = r#"
            [mining]
            weekly_rate = "0.25"
            return_principal = true

            [sweeper]
            batch_size = 50
            worker_concurrency = 2
        "#;

        let config: EngineConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.mining.weekly_rate, dec!(0.25));
        assert!(config.mining.return_principal);
        assert_eq!(config.mining.term_days, 7);
        assert_eq!(config.sweeper.batch_size, 50);
        assert_eq!(config.sweeper.worker_concurrency, 2);
        assert_eq!(config.sweeper.retry_attempts, 3);
        assert_eq!(config.cache.ttl_secs, 5);
        config.validate().unwrap();
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: EngineConfig = toml::from_str("").unwrap();
        assert_eq!(config.mining.weekly_rate, dec!(0.30));
        assert_eq!(config.mining.minimum_investment, dec!(10));
        assert_eq!(config.mining.term(), TermDuration::days(7));
        assert_eq!(config.sweeper.interval(), Duration::from_secs(60));
    }

    #[test]
    fn test_validate_rejects_zero_batch() {
        let mut config = EngineConfig::default();
        config.sweeper.batch_size = 0;
        assert!(matches!(config.validate(), Err(Error::Config { .. })));

        let mut config = EngineConfig::default();
        config.mining.term_days = 0;
        assert!(matches!(config.validate(), Err(Error::Config { .. })));
    }

    #[test]
    fn test_validate_rejects_unstorable_rate() {
        let mut config = EngineConfig::default();
        config.mining.weekly_rate = dec!(0.123456);
        assert!(matches!(config.validate(), Err(Error::Config { .. })));

        config.mining.weekly_rate = dec!(0.1250);
        config.validate().unwrap();
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = load_config("/definitely/not/here/config.toml");
        assert!(matches!(result, Err(Error::Config { .. })));
    }
}
