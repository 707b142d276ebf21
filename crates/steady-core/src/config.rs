//! Threshold configuration
//!
//! Configuration is immutable once loaded and is passed explicitly into the
//! analyzers and the insight formatter.
//!
//! ## Configuration Resolution
//!
//! Config is loaded with a two-layer resolution:
//! 1. Check for override in data dir (~/.local/share/steady/config/steady.toml)
//! 2. Fall back to embedded defaults (compiled into binary)
//!
//! Override files may be partial: every missing key keeps its default. The
//! merged result is validated before it is returned, so a bad threshold set
//! fails at load time rather than while formatting insights.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::classify::ClassifierConfig;
use crate::error::{Error, Result};

/// Embedded default config (compiled into binary)
const DEFAULT_CONFIG: &str = include_str!("../../../config/steady.toml");

/// Thresholds used by the analyzers and the insight formatter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    pub volatility_high: f64,
    pub volatility_moderate: f64,
    pub gig_worker_threshold: f64,
    pub emergency_fund_months_high: u32,
    pub emergency_fund_months_moderate: u32,
    pub emergency_fund_months_default: u32,
    pub good_month_multiplier: f64,
    pub lean_month_multiplier: f64,
    pub flexible_spending_reduction: f64,
    pub surplus_savings_multiplier: f64,
    pub flexibility_high_threshold: f64,
    pub flexibility_low_threshold: f64,
    /// Share of the elasticity score driven by the discretionary ratio
    pub elasticity_discretionary_weight: f64,
    pub quick_win_min_monthly_savings: f64,
    pub impulse_moderate_threshold: f64,
    pub impulse_high_threshold: f64,
    /// Transactions needed (with enough months) for high confidence
    pub data_quality_high_transactions: u64,
    /// Months of coverage needed (with enough transactions) for high confidence
    pub data_quality_high_months: u32,
    /// Minimum span between first and last payment before income is reported
    pub min_income_window_days: u32,
    /// Number of payment gaps kept for frequency analysis
    pub payment_history_window: usize,
    pub decay_half_life_months: f64,
    /// Most recent months covered by the cash-flow block
    pub cash_flow_window_months: u32,
    /// Net-flow percentile at or below which a month is lean
    pub lean_period_percentile: f64,
    /// Lean-month share above which a longer buffer is recommended
    pub frequent_lean_ratio: f64,
    /// Months of expenses the smoothing plan saves toward
    pub smoothing_buffer_months: u32,
    /// A good month's surplus must exceed this share of average income
    pub good_month_surplus_ratio: f64,
    pub max_smoothing_save_rate: f64,
    /// Save rate used when no good month has a surplus to size it from
    pub default_smoothing_save_rate: f64,
    /// Compare-and-swap attempts per ingest call before giving up
    pub max_write_retries: u32,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            volatility_high: 0.4,
            volatility_moderate: 0.3,
            gig_worker_threshold: 0.3,
            emergency_fund_months_high: 6,
            emergency_fund_months_moderate: 3,
            emergency_fund_months_default: 3,
            good_month_multiplier: 1.2,
            lean_month_multiplier: 0.8,
            flexible_spending_reduction: 0.3,
            surplus_savings_multiplier: 0.8,
            flexibility_high_threshold: 0.6,
            flexibility_low_threshold: 0.2,
            elasticity_discretionary_weight: 0.7,
            quick_win_min_monthly_savings: 50.0,
            impulse_moderate_threshold: 0.3,
            impulse_high_threshold: 0.7,
            data_quality_high_transactions: 100,
            data_quality_high_months: 3,
            min_income_window_days: 28,
            payment_history_window: 20,
            decay_half_life_months: 6.0,
            cash_flow_window_months: 6,
            lean_period_percentile: 0.25,
            frequent_lean_ratio: 0.3,
            smoothing_buffer_months: 3,
            good_month_surplus_ratio: 0.1,
            max_smoothing_save_rate: 0.5,
            default_smoothing_save_rate: 0.3,
            max_write_retries: 5,
        }
    }
}

fn check(ok: bool, msg: &str) -> Result<()> {
    if ok {
        Ok(())
    } else {
        Err(Error::InvalidConfig(msg.to_string()))
    }
}

fn is_ratio(v: f64) -> bool {
    v.is_finite() && (0.0..=1.0).contains(&v)
}

impl Configuration {
    /// Check that the threshold set is internally consistent
    pub fn validate(&self) -> Result<()> {
        check(
            self.volatility_moderate.is_finite() && self.volatility_moderate >= 0.0,
            "volatility_moderate must be >= 0",
        )?;
        check(
            self.volatility_high > self.volatility_moderate,
            "volatility_high must be greater than volatility_moderate",
        )?;
        check(
            self.gig_worker_threshold.is_finite() && self.gig_worker_threshold >= 0.0,
            "gig_worker_threshold must be >= 0",
        )?;
        check(
            self.emergency_fund_months_moderate >= 1 && self.emergency_fund_months_default >= 1,
            "emergency fund months must be at least 1",
        )?;
        check(
            self.emergency_fund_months_high > self.emergency_fund_months_moderate,
            "emergency_fund_months_high must be greater than emergency_fund_months_moderate",
        )?;
        check(
            self.good_month_multiplier.is_finite() && self.good_month_multiplier > 1.0,
            "good_month_multiplier must be greater than 1",
        )?;
        check(
            self.lean_month_multiplier > 0.0 && self.lean_month_multiplier < 1.0,
            "lean_month_multiplier must be between 0 and 1",
        )?;
        check(
            self.flexible_spending_reduction > 0.0 && self.flexible_spending_reduction < 1.0,
            "flexible_spending_reduction must be between 0 and 1",
        )?;
        check(
            self.surplus_savings_multiplier > 0.0 && self.surplus_savings_multiplier <= 1.0,
            "surplus_savings_multiplier must be in (0, 1]",
        )?;
        check(
            is_ratio(self.flexibility_low_threshold) && is_ratio(self.flexibility_high_threshold),
            "flexibility thresholds must be within [0, 1]",
        )?;
        check(
            self.flexibility_low_threshold < self.flexibility_high_threshold,
            "flexibility_low_threshold must be less than flexibility_high_threshold",
        )?;
        check(
            is_ratio(self.elasticity_discretionary_weight),
            "elasticity_discretionary_weight must be within [0, 1]",
        )?;
        check(
            self.quick_win_min_monthly_savings.is_finite()
                && self.quick_win_min_monthly_savings >= 0.0,
            "quick_win_min_monthly_savings must be >= 0",
        )?;
        check(
            is_ratio(self.impulse_moderate_threshold) && is_ratio(self.impulse_high_threshold),
            "impulse thresholds must be within [0, 1]",
        )?;
        check(
            self.impulse_moderate_threshold < self.impulse_high_threshold,
            "impulse_moderate_threshold must be less than impulse_high_threshold",
        )?;
        check(
            self.payment_history_window >= 1,
            "payment_history_window must be at least 1",
        )?;
        check(
            self.decay_half_life_months.is_finite() && self.decay_half_life_months > 0.0,
            "decay_half_life_months must be > 0",
        )?;
        check(
            self.cash_flow_window_months >= 1 && self.smoothing_buffer_months >= 1,
            "cash_flow_window_months and smoothing_buffer_months must be at least 1",
        )?;
        check(
            self.lean_period_percentile.is_finite()
                && (0.0..1.0).contains(&self.lean_period_percentile),
            "lean_period_percentile must be within [0, 1)",
        )?;
        check(
            is_ratio(self.frequent_lean_ratio) && is_ratio(self.good_month_surplus_ratio),
            "frequent_lean_ratio and good_month_surplus_ratio must be within [0, 1]",
        )?;
        check(
            self.max_smoothing_save_rate > 0.0 && self.max_smoothing_save_rate <= 1.0,
            "max_smoothing_save_rate must be in (0, 1]",
        )?;
        check(
            self.default_smoothing_save_rate > 0.0
                && self.default_smoothing_save_rate <= self.max_smoothing_save_rate,
            "default_smoothing_save_rate must be in (0, max_smoothing_save_rate]",
        )?;
        check(
            self.max_write_retries >= 1,
            "max_write_retries must be at least 1",
        )?;
        Ok(())
    }

    /// Emergency fund months for a volatility tier
    pub fn emergency_fund_months(&self, level: crate::income::VolatilityLevel) -> u32 {
        use crate::income::VolatilityLevel;
        match level {
            VolatilityLevel::High => self.emergency_fund_months_high,
            VolatilityLevel::Moderate => self.emergency_fund_months_moderate,
            VolatilityLevel::Stable => self.emergency_fund_months_default,
        }
    }
}

/// Full configuration file: thresholds plus classifier policy
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SteadyConfig {
    pub thresholds: Configuration,
    pub classifier: ClassifierConfig,
}

impl SteadyConfig {
    /// Load configuration (explicit path, then default override, then embedded)
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let content = match path {
            Some(p) => fs::read_to_string(p).map_err(|e| {
                Error::InvalidConfig(format!("Failed to read {}: {}", p.display(), e))
            })?,
            None => match default_config_path() {
                Some(default_path) if default_path.exists() => {
                    debug!(path = %default_path.display(), "Loading config override");
                    fs::read_to_string(&default_path)?
                }
                _ => DEFAULT_CONFIG.to_string(),
            },
        };
        Self::from_toml_str(&content)
    }

    /// Embedded defaults
    pub fn embedded() -> Result<Self> {
        Self::from_toml_str(DEFAULT_CONFIG)
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: SteadyConfig = toml::from_str(content)?;
        config.thresholds.validate()?;
        config.classifier.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| Error::InvalidConfig(format!("Failed to serialize config: {}", e)))
    }
}

/// Default config override path
pub fn default_config_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("steady").join("config").join("steady.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        Configuration::default().validate().unwrap();
    }

    #[test]
    fn test_embedded_matches_defaults() {
        let config = SteadyConfig::embedded().unwrap();
        assert_eq!(config.thresholds, Configuration::default());
        assert!(config
            .classifier
            .discretionary_categories
            .iter()
            .any(|c| c == "DINING"));
    }

    #[test]
    fn test_partial_override_keeps_defaults() {
        let config = SteadyConfig::from_toml_str(
            r#"
            [thresholds]
            volatility_high = 0.5
            "#,
        )
        .unwrap();
        assert_eq!(config.thresholds.volatility_high, 0.5);
        assert_eq!(config.thresholds.volatility_moderate, 0.3);
        assert_eq!(config.thresholds.emergency_fund_months_high, 6);
    }

    #[test]
    fn test_emergency_months_must_be_ordered() {
        let result = SteadyConfig::from_toml_str(
            r#"
            [thresholds]
            emergency_fund_months_high = 3
            emergency_fund_months_moderate = 3
            "#,
        );
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_lean_percentile_must_be_below_one() {
        let config = Configuration {
            lean_period_percentile: 1.0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("lean_period_percentile"));
    }

    #[test]
    fn test_volatility_bands_must_be_ordered() {
        let config = Configuration {
            volatility_high: 0.2,
            volatility_moderate: 0.3,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("volatility_high"));
    }

    #[test]
    fn test_flexibility_bands_must_be_ordered() {
        let config = Configuration {
            flexibility_low_threshold: 0.7,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_wrong_type_is_parse_error() {
        let result = SteadyConfig::from_toml_str("[thresholds]\nvolatility_high = \"high\"");
        assert!(matches!(result, Err(Error::Toml(_))));
    }

    #[test]
    fn test_load_explicit_missing_path_fails() {
        let result = SteadyConfig::load(Some(Path::new("/nonexistent/steady.toml")));
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_round_trip_through_toml() {
        let config = SteadyConfig::embedded().unwrap();
        let text = config.to_toml_string().unwrap();
        let reparsed = SteadyConfig::from_toml_str(&text).unwrap();
        assert_eq!(config, reparsed);
    }
}
