//! Drizzle job configuration.

use crate::error::{DrizzleError, DrizzleResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Drizzle job configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrizzleConfig {
    /// Subsidy at or below this is dust and never drizzled.
    #[serde(default = "default_dust_threshold")]
    pub dust_threshold: f64,

    /// Maximum markets or answers processed concurrently.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Maximum answers of one market injected per cycle.
    #[serde(default = "default_max_answers_per_market")]
    pub max_answers_per_market: usize,

    /// Markets with fewer unique bettors than this use the thin coefficient.
    #[serde(default = "default_thin_market_bettor_threshold")]
    pub thin_market_bettor_threshold: u32,

    /// Draw coefficient for markets below the bettor threshold.
    #[serde(default = "default_thin_market_coefficient")]
    pub thin_market_coefficient: f64,

    /// Draw coefficient for markets at or above the bettor threshold.
    #[serde(default = "default_established_market_coefficient")]
    pub established_market_coefficient: f64,

    /// Draw coefficient for per-answer subsidy.
    #[serde(default = "default_answer_coefficient")]
    pub answer_coefficient: f64,

    /// Subsidy at or below this is drained in full.
    #[serde(default = "default_full_drain_threshold")]
    pub full_drain_threshold: f64,

    /// Seconds between cycles. Default: 420 (7 minutes).
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// After this many seconds a cycle stops starting new drizzles.
    #[serde(default = "default_cycle_timeout_secs")]
    pub cycle_timeout_secs: u64,

    /// Seed for the draw generator. Unset = seeded from OS entropy.
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_dust_threshold() -> f64 {
    1e-7
}

fn default_max_concurrency() -> usize {
    10
}

fn default_max_answers_per_market() -> usize {
    50_000
}

fn default_thin_market_bettor_threshold() -> u32 {
    50
}

fn default_thin_market_coefficient() -> f64 {
    0.3
}

fn default_established_market_coefficient() -> f64 {
    0.6
}

fn default_answer_coefficient() -> f64 {
    0.4
}

fn default_full_drain_threshold() -> f64 {
    1.0
}

fn default_interval_secs() -> u64 {
    420
}

fn default_cycle_timeout_secs() -> u64 {
    540
}

impl Default for DrizzleConfig {
    fn default() -> Self {
        Self {
            dust_threshold: default_dust_threshold(),
            max_concurrency: default_max_concurrency(),
            max_answers_per_market: default_max_answers_per_market(),
            thin_market_bettor_threshold: default_thin_market_bettor_threshold(),
            thin_market_coefficient: default_thin_market_coefficient(),
            established_market_coefficient: default_established_market_coefficient(),
            answer_coefficient: default_answer_coefficient(),
            full_drain_threshold: default_full_drain_threshold(),
            interval_secs: default_interval_secs(),
            cycle_timeout_secs: default_cycle_timeout_secs(),
            seed: None,
        }
    }
}

impl DrizzleConfig {
    /// Reject values that would stall or corrupt a cycle.
    pub fn validate(&self) -> DrizzleResult<()> {
        if !self.dust_threshold.is_finite() || self.dust_threshold <= 0.0 {
            return Err(invalid(format!(
                "dust_threshold must be positive, got {}",
                self.dust_threshold
            )));
        }
        if self.max_concurrency == 0 {
            return Err(invalid("max_concurrency must be at least 1".to_string()));
        }
        if self.max_answers_per_market == 0 {
            return Err(invalid(
                "max_answers_per_market must be at least 1".to_string(),
            ));
        }
        for (name, value) in [
            ("thin_market_coefficient", self.thin_market_coefficient),
            (
                "established_market_coefficient",
                self.established_market_coefficient,
            ),
            ("answer_coefficient", self.answer_coefficient),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(invalid(format!("{name} must be in (0, 1], got {value}")));
            }
        }
        if !self.full_drain_threshold.is_finite() || self.full_drain_threshold < 0.0 {
            return Err(invalid(format!(
                "full_drain_threshold must be non-negative, got {}",
                self.full_drain_threshold
            )));
        }
        if self.interval_secs == 0 || self.cycle_timeout_secs == 0 {
            return Err(invalid(
                "interval_secs and cycle_timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Draw coefficient for a market with `unique_bettor_count` bettors.
    pub fn market_coefficient(&self, unique_bettor_count: u32) -> f64 {
        if unique_bettor_count < self.thin_market_bettor_threshold {
            self.thin_market_coefficient
        } else {
            self.established_market_coefficient
        }
    }

    /// Amount to drizzle out of `subsidy` given a draw in (0, 1).
    ///
    /// Small balances are drained in full so residues do not linger.
    pub fn drizzle_amount(&self, subsidy: f64, draw: f64, coefficient: f64) -> f64 {
        if subsidy <= self.full_drain_threshold {
            subsidy
        } else {
            draw * coefficient * subsidy
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn cycle_timeout(&self) -> Duration {
        Duration::from_secs(self.cycle_timeout_secs)
    }
}

fn invalid(message: String) -> DrizzleError {
    DrizzleError::InvalidConfig(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DrizzleConfig::default();
        assert_eq!(config.dust_threshold, 1e-7);
        assert_eq!(config.max_concurrency, 10);
        assert_eq!(config.max_answers_per_market, 50_000);
        assert_eq!(config.thin_market_bettor_threshold, 50);
        assert_eq!(config.answer_coefficient, 0.4);
        assert_eq!(config.interval(), Duration::from_secs(420));
        assert!(config.seed.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: DrizzleConfig = toml::from_str(
            r#"
            max_concurrency = 4
            seed = 7
            "#,
        )
        .unwrap();
        assert_eq!(config.max_concurrency, 4);
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.established_market_coefficient, 0.6);
        assert_eq!(config.cycle_timeout_secs, 540);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = DrizzleConfig {
            max_concurrency: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        config.max_concurrency = 10;
        config.answer_coefficient = 1.5;
        assert!(config.validate().is_err());

        config.answer_coefficient = 0.4;
        config.dust_threshold = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_market_coefficient_by_bettor_count() {
        let config = DrizzleConfig::default();
        assert_eq!(config.market_coefficient(0), 0.3);
        assert_eq!(config.market_coefficient(49), 0.3);
        assert_eq!(config.market_coefficient(50), 0.6);
        assert_eq!(config.market_coefficient(1_000), 0.6);
    }

    #[test]
    fn test_drizzle_amount() {
        let config = DrizzleConfig::default();
        // Dust-sized balances drain entirely regardless of the draw.
        assert_eq!(config.drizzle_amount(0.75, 0.01, 0.3), 0.75);
        assert_eq!(config.drizzle_amount(1.0, 0.01, 0.3), 1.0);
        // Larger balances lose a randomized fraction.
        let amount = config.drizzle_amount(200.0, 0.5, 0.6);
        assert!((amount - 60.0).abs() < 1e-12);
        assert!(config.drizzle_amount(200.0, 0.999, 0.6) < 200.0 * 0.6);
    }
}
